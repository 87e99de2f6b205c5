use tracing::{debug, info, warn};

use crate::{AppResult, db::Confession};

use super::Inner;

/// Length of the trending and recent projections.
pub const PROJECTION_LEN: usize = 10;

/// Derives `(trending, recent)` from the full collection: most liked first, and newest
/// first, each cut to [`PROJECTION_LEN`]. Both sorts are stable.
pub fn project(confessions: &[Confession]) -> (Vec<Confession>, Vec<Confession>) {
    let mut trending = confessions.to_vec();
    trending.sort_by(|a, b| b.likes.cmp(&a.likes));
    trending.truncate(PROJECTION_LEN);

    let mut recent = confessions.to_vec();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(PROJECTION_LEN);

    (trending, recent)
}

impl Inner {
    /// Replaces the whole collection with a fresh fetch. On failure the previous
    /// collection stays and the error is recorded.
    pub(super) async fn refresh(&self) -> AppResult<()> {
        let viewer = self.viewer();
        self.update(|state| {
            state.loading = true;
            state.error = None;
        });

        let fetched = self.store.list_confessions().await;
        if self.viewer() != viewer {
            debug!("viewer changed while refreshing, dropping result");
            return Ok(());
        }

        match fetched {
            Ok(confessions) => {
                info!("fetched {} confessions", confessions.len());
                self.update(|state| {
                    state.confessions = confessions;
                    state.reproject();
                });
                self.check_eligibility().await;
                self.update(|state| state.loading = false);
                Ok(())
            }
            Err(err) => {
                warn!("error fetching confessions: {err}");
                let message = err.to_string();
                self.update(|state| {
                    state.error = Some(message);
                    state.loading = false;
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use time::{Duration, macros::datetime};
    use uuid::Uuid;

    use super::*;

    fn confession(n: u128, likes: u32, minutes_ago: i64) -> Confession {
        Confession {
            id: Uuid::from_u128(n),
            created_at: datetime!(2024-06-01 12:00 UTC) - Duration::minutes(minutes_ago),
            user_id: Uuid::nil(),
            content: format!("confession {n}"),
            location_name: None,
            latitude: None,
            longitude: None,
            likes,
            is_anonymous: true,
        }
    }

    fn ids(confessions: &[Confession]) -> Vec<u128> {
        confessions.iter().map(|c| c.id.as_u128()).collect()
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(10)]
    #[case(25)]
    fn projections_are_bounded_and_ordered(#[case] len: u128) {
        let confessions: Vec<Confession> = (0..len)
            .map(|n| confession(n, ((n * 7) % 5) as u32, ((n * 13) % 11) as i64))
            .collect();

        let (trending, recent) = project(&confessions);

        assert_eq!(trending.len(), confessions.len().min(PROJECTION_LEN));
        assert_eq!(recent.len(), confessions.len().min(PROJECTION_LEN));
        assert!(trending.windows(2).all(|w| w[0].likes >= w[1].likes));
        assert!(recent.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn trending_keeps_fetch_order_among_ties() {
        let confessions = vec![confession(1, 2, 0), confession(2, 5, 1), confession(3, 2, 2)];
        let (trending, _) = project(&confessions);
        assert_eq!(ids(&trending), vec![2, 1, 3]);
    }

    #[test]
    fn recent_sorts_even_unordered_input() {
        let confessions = vec![confession(1, 0, 30), confession(2, 0, 5), confession(3, 0, 60)];
        let (_, recent) = project(&confessions);
        assert_eq!(ids(&recent), vec![2, 1, 3]);
    }

    #[test]
    fn trending_draws_from_whole_collection() {
        let mut confessions: Vec<Confession> = (0..12).map(|n| confession(n, 1, n as i64)).collect();
        confessions[11].likes = 40;
        let (trending, recent) = project(&confessions);
        assert_eq!(trending[0].id, Uuid::from_u128(11));
        assert!(!ids(&recent).contains(&11));
    }
}
