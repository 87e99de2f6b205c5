use chrono::NaiveDate;
use mockable::Clock;
use tracing::{debug, warn};

use crate::{AppResult, db::Identity};

use super::Inner;

/// `yyyy-MM-dd`, the form stored in `profiles.last_confession_date`.
pub fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The day the one-post-per-day rule counts in: the device's local calendar.
pub fn today(clock: &dyn Clock) -> String {
    date_string(clock.local().date_naive())
}

impl Inner {
    /// Re-reads the viewer's profile and stores whether they may post today.
    /// Anything that prevents an answer counts as "not today".
    pub(super) async fn check_eligibility(&self) -> bool {
        let Some(viewer) = self.viewer() else {
            self.update(|state| state.can_post_today = false);
            return false;
        };

        let eligible = match self.eligible(&viewer).await {
            Ok(eligible) => eligible,
            Err(err) => {
                warn!("error checking post eligibility: {err}");
                false
            }
        };

        if self.viewer().as_ref() != Some(&viewer) {
            debug!("viewer changed while checking eligibility, dropping result");
            return false;
        }
        self.update(|state| state.can_post_today = eligible);
        eligible
    }

    async fn eligible(&self, viewer: &Identity) -> AppResult<bool> {
        let profile = self.store.get_profile(viewer.id).await?;
        Ok(profile.last_confession_date.as_deref() != Some(today(self.clock.as_ref()).as_str()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};
    use mockable::MockClock;

    use super::*;

    #[test]
    fn dates_are_zero_padded() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(date_string(day(2024, 1, 2)), "2024-01-02");
        assert_eq!(date_string(day(2031, 11, 30)), "2031-11-30");
    }

    #[test]
    fn today_reads_the_local_calendar() {
        let mut clock = MockClock::new();
        clock.expect_local().return_const(Local.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap());
        assert_eq!(today(&clock), "2024-03-09");
    }
}
