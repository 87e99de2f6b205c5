//! The confession feed: one authoritative collection, the projections derived from
//! it, and the operations allowed to change it.

mod eligibility;
mod feed;
mod like;
mod new;
mod thread;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mockable::Clock;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::AbortHandle,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    AppError, AppResult,
    auth::{IdentityEvent, SessionStore},
    db::{Confession, Identity},
    location::Location,
    remote::DataStore,
};

pub use eligibility::{date_string, today};
pub use feed::{PROJECTION_LEN, project};
pub use thread::{ConfessionThread, ThreadState};

#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    /// Every confession, newest first, as last fetched plus local like adjustments.
    pub confessions: Vec<Confession>,
    pub trending: Vec<Confession>,
    pub recent: Vec<Confession>,
    pub loading: bool,
    pub error: Option<String>,
    pub can_post_today: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            confessions: Vec::new(),
            trending: Vec::new(),
            recent: Vec::new(),
            loading: true,
            error: None,
            can_post_today: false,
        }
    }
}

impl FeedState {
    fn reproject(&mut self) {
        (self.trending, self.recent) = project(&self.confessions);
    }

    /// Rewrites one confession's like count and rebuilds both projections.
    /// Returns whether the confession was held locally.
    fn adjust_likes(&mut self, id: Uuid, adjust: impl FnOnce(u32) -> u32) -> bool {
        let Some(confession) = self.confessions.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        confession.likes = adjust(confession.likes);
        self.reproject();
        true
    }
}

pub(crate) struct Inner {
    store: Arc<dyn DataStore>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<FeedState>,
    viewer: watch::Sender<Option<Identity>>,
    closed: AtomicBool,
}

impl Inner {
    fn viewer(&self) -> Option<Identity> {
        self.viewer.borrow().clone()
    }

    /// Applies `change` unless the feed has been closed. Late results are dropped.
    fn update(&self, change: impl FnOnce(&mut FeedState)) -> bool {
        if self.closed.load(Ordering::Acquire) {
            debug!("feed closed, dropping late result");
            return false;
        }
        self.state.send_modify(change);
        true
    }

    fn fail(&self, action: &str, err: AppError) -> AppError {
        warn!("error {action}: {err}");
        let message = err.to_string();
        self.update(|state| state.error = Some(message));
        err
    }

    async fn on_identity(&self, event: IdentityEvent) {
        match event {
            IdentityEvent::SignedIn(identity) => {
                self.viewer.send_replace(Some(identity));
                // Failures are already recorded in the feed state.
                let _ = self.refresh().await;
            }
            IdentityEvent::SignedOut => {
                self.viewer.send_replace(None);
                self.update(|state| {
                    *state = FeedState { loading: false, ..FeedState::default() };
                });
            }
        }
    }
}

/// Owns the confession collection. Consumers read through [`FeedSync::state`] or
/// [`FeedSync::watch`] and change it only through the operations below.
pub struct FeedSync {
    inner: Arc<Inner>,
    listener: Option<AbortHandle>,
}

impl FeedSync {
    /// A feed that is told about identity changes through [`FeedSync::set_viewer`].
    pub fn new(store: Arc<dyn DataStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                state: watch::Sender::new(FeedState::default()),
                viewer: watch::Sender::new(None),
                closed: AtomicBool::new(false),
            }),
            listener: None,
        }
    }

    /// A feed that follows `session`: it refreshes on every sign-in and empties on
    /// sign-out. Must be called from within a tokio runtime.
    pub fn attach(store: Arc<dyn DataStore>, clock: Arc<dyn Clock>, session: &SessionStore) -> Self {
        let mut feed = Self::new(store, clock);
        let mut events = session.subscribe();
        let current = session.identity();
        let inner = Arc::downgrade(&feed.inner);

        let listener = tokio::spawn(async move {
            if let Some(identity) = current {
                let Some(inner) = inner.upgrade() else { return };
                inner.on_identity(IdentityEvent::SignedIn(identity)).await;
            }

            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("feed missed {skipped} identity events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = inner.upgrade() else { break };
                inner.on_identity(event).await;
            }
        });
        feed.listener = Some(listener.abort_handle());
        feed
    }

    pub async fn set_viewer(&self, identity: Option<Identity>) {
        let event = match identity {
            Some(identity) => IdentityEvent::SignedIn(identity),
            None => IdentityEvent::SignedOut,
        };
        self.inner.on_identity(event).await;
    }

    pub fn state(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    pub async fn refresh(&self) -> AppResult<()> {
        self.inner.refresh().await
    }

    pub async fn check_eligibility(&self) -> bool {
        self.inner.check_eligibility().await
    }

    pub async fn create_confession(&self, content: &str, location: Option<Location>) -> AppResult<()> {
        self.inner.create_confession(content, location).await
    }

    pub async fn like_confession(&self, id: Uuid) -> AppResult<()> {
        self.inner.like_confession(id).await
    }

    /// Stops following the session; anything still in flight is discarded on arrival.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}

impl Drop for FeedSync {
    fn drop(&mut self) {
        self.close();
    }
}
