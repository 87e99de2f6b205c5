use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    AppError, AppResult, Rejected,
    db::{Comment, Confession, Identity, NewComment},
    remote::DataStore,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadState {
    pub confession: Option<Confession>,
    /// Oldest first.
    pub comments: Vec<Comment>,
    pub loading: bool,
    pub error: Option<String>,
}

/// A single confession opened on its own, with the comments under it.
pub struct ConfessionThread {
    store: Arc<dyn DataStore>,
    state: watch::Sender<ThreadState>,
    /// Bumped by every `load`; only the latest one may write its result.
    loads: AtomicU64,
}

impl ConfessionThread {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            state: watch::Sender::new(ThreadState::default()),
            loads: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ThreadState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ThreadState> {
        self.state.subscribe()
    }

    /// Fetches the confession and its comments. Comments that fail to load leave an
    /// empty list behind rather than failing the thread. A load overtaken by a later
    /// one is dropped on arrival.
    pub async fn load(&self, id: Uuid) -> AppResult<()> {
        let ticket = self.loads.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let confession = self.store.get_confession(id).await;
        let comments = match &confession {
            Ok(_) => self.store.list_comments(id).await.unwrap_or_else(|err| {
                warn!("error fetching comments: {err}");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        if self.loads.load(Ordering::Acquire) != ticket {
            debug!(%id, "thread reopened while loading, dropping result");
            return Ok(());
        }
        let confession = match confession {
            Ok(confession) => confession,
            Err(err) => return Err(self.fail("loading confession", err)),
        };

        self.state.send_modify(|state| {
            state.confession = Some(confession);
            state.comments = comments;
            state.loading = false;
        });
        Ok(())
    }

    /// Optimistic like on the opened confession, undone if the backend refuses it.
    pub async fn like(&self) -> AppResult<()> {
        let mut target = None;
        self.state.send_modify(|state| {
            if let Some(confession) = state.confession.as_mut() {
                confession.likes = confession.likes.saturating_add(1);
                target = Some(confession.id);
            }
        });
        let Some(id) = target else {
            return Err("no confession loaded".into());
        };

        match self.store.increment_likes(id).await {
            Ok(stored) => {
                debug!(%id, stored, "like recorded");
                Ok(())
            }
            Err(err) => {
                self.state.send_modify(|state| {
                    if let Some(confession) = state.confession.as_mut().filter(|c| c.id == id) {
                        confession.likes = confession.likes.saturating_sub(1);
                    }
                });
                Err(self.fail("liking confession", err))
            }
        }
    }

    /// Posts an anonymous comment and appends the stored row.
    pub async fn submit_comment(&self, author: Option<&Identity>, text: &str) -> AppResult<Comment> {
        self.state.send_modify(|state| state.error = None);

        let content = text.trim();
        let Some(author) = author else {
            return Err(self.fail("posting comment", Rejected::NotAuthenticated("comment").into()));
        };
        if content.is_empty() {
            return Err(self.fail("posting comment", Rejected::EmptyContent("comment").into()));
        }
        let opened = self.state.borrow().confession.as_ref().map(|c| c.id);
        let Some(confession_id) = opened else {
            return Err(self.fail("posting comment", "no confession loaded".into()));
        };

        let comment = NewComment {
            confession_id,
            user_id: author.id,
            content: content.to_owned(),
            is_anonymous: true,
        };
        let stored = match self.store.insert_comment(&comment).await {
            Ok(stored) => stored,
            Err(err) => return Err(self.fail("posting comment", err)),
        };

        self.state.send_modify(|state| state.comments.push(stored.clone()));
        Ok(stored)
    }

    fn fail(&self, action: &str, err: AppError) -> AppError {
        warn!("error {action}: {err}");
        let message = err.to_string();
        self.state.send_modify(|state| {
            state.loading = false;
            state.error = Some(message);
        });
        err
    }
}
