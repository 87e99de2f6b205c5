use tracing::{info, warn};

use crate::{
    AppResult, MAX_CONFESSION_LEN, Rejected,
    db::NewConfession,
    location::Location,
};

use super::{Inner, today};

impl Inner {
    /// Posts a confession for the viewer, then refetches the whole feed.
    /// The daily limit is checked against local state only; the backend does not
    /// enforce it.
    pub(super) async fn create_confession(&self, content: &str, location: Option<Location>) -> AppResult<()> {
        self.update(|state| state.error = None);

        let submission = match self.submission(content, location) {
            Ok(submission) => submission,
            Err(err) => return Err(self.fail("posting confession", err.into())),
        };
        let today = today(self.clock.as_ref());

        if let Err(err) = self.store.insert_confession(&submission).await {
            return Err(self.fail("posting confession", err));
        }
        info!("u/{} posted a confession", submission.user_id);

        if let Err(err) = self.store.set_last_confession_date(submission.user_id, &today).await {
            warn!("error stamping last confession date: {err}");
        }
        self.update(|state| state.can_post_today = false);

        // A failed refetch is recorded in the feed; the confession itself went through.
        let _ = self.refresh().await;
        Ok(())
    }

    fn submission(&self, content: &str, location: Option<Location>) -> Result<NewConfession, Rejected> {
        let Some(viewer) = self.viewer() else {
            return Err(Rejected::NotAuthenticated("post a confession"));
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(Rejected::EmptyContent("confession"));
        }
        if content.chars().count() > MAX_CONFESSION_LEN {
            return Err(Rejected::TooLong { max: MAX_CONFESSION_LEN });
        }

        if !self.state.borrow().can_post_today {
            return Err(Rejected::NotEligible);
        }

        let (location_name, latitude, longitude) = match location {
            Some(Location { name, latitude, longitude }) => (Some(name), Some(latitude), Some(longitude)),
            None => (None, None, None),
        };

        Ok(NewConfession {
            user_id: viewer.id,
            content: content.to_owned(),
            location_name,
            latitude,
            longitude,
            is_anonymous: true,
        })
    }
}
