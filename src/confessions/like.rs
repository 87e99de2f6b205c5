use tracing::debug;
use uuid::Uuid;

use crate::AppResult;

use super::Inner;

impl Inner {
    /// Counts the like locally straight away, then sends it. If sending fails the
    /// local count is taken back down. Taps are not coalesced: each one is its own
    /// round trip.
    pub(super) async fn like_confession(&self, id: Uuid) -> AppResult<()> {
        let mut held = false;
        self.update(|state| {
            state.error = None;
            held = state.adjust_likes(id, |likes| likes.saturating_add(1));
        });

        match self.store.increment_likes(id).await {
            Ok(stored) => {
                debug!(%id, stored, "like recorded");
                Ok(())
            }
            Err(err) => {
                if held {
                    self.update(|state| {
                        state.adjust_likes(id, |likes| likes.saturating_sub(1));
                    });
                }
                Err(self.fail("liking confession", err))
            }
        }
    }
}
