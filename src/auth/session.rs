use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::{
    AppError, AppResult, Rejected,
    db::Identity,
    remote::{DataStore, IdentityProvider},
};

use super::IdentityEvent;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { identity: None, loading: true, error: None }
    }
}

/// Who is signed in. Every change of identity goes out on [`SessionStore::subscribe`].
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DataStore>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<IdentityEvent>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn DataStore>) -> Self {
        Self {
            provider,
            store,
            state: watch::Sender::new(SessionState::default()),
            events: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    /// Picks up a session the provider already holds.
    pub async fn restore(&self) -> AppResult<()> {
        match self.provider.current_identity().await {
            Ok(identity) => {
                self.set_identity(identity);
                Ok(())
            }
            Err(err) => Err(self.fail("restoring session", err)),
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> AppResult<()> {
        self.begin(email, password)?;

        let identity = match self.provider.sign_up(email, password).await {
            Ok(identity) => identity,
            Err(err) => return Err(self.fail("signing up", err)),
        };

        let Some(identity) = identity else {
            info!("signed up {email}, awaiting confirmation");
            self.state.send_modify(|state| state.loading = false);
            return Ok(());
        };

        // The account exists either way; a missing profile only costs posting rights.
        let profile = self.store.insert_profile(identity.id).await;

        info!("signed up u/{}", identity.id);
        self.set_identity(Some(identity));
        profile.map_err(|err| self.fail("creating profile", err))
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<()> {
        self.begin(email, password)?;

        match self.provider.sign_in_with_password(email, password).await {
            Ok(identity) => {
                info!("welcome u/{}", identity.id);
                self.set_identity(Some(identity));
                Ok(())
            }
            Err(err) => Err(self.fail("signing in", err)),
        }
    }

    pub async fn deauthenticate(&self) -> AppResult<()> {
        self.state.send_modify(|state| state.error = None);

        match self.provider.sign_out().await {
            Ok(()) => {
                info!("signed out");
                self.set_identity(None);
                Ok(())
            }
            Err(err) => Err(self.fail("signing out", err)),
        }
    }

    fn begin(&self, email: &str, password: &str) -> AppResult<()> {
        self.state.send_modify(|state| state.error = None);
        if email.trim().is_empty() || password.is_empty() {
            return Err(self.fail("checking credentials", Rejected::MissingCredentials.into()));
        }
        Ok(())
    }

    fn set_identity(&self, identity: Option<Identity>) {
        self.state.send_modify(|state| {
            state.loading = false;
            state.identity = identity.clone();
        });

        let event = match identity {
            Some(identity) => IdentityEvent::SignedIn(identity),
            None => IdentityEvent::SignedOut,
        };
        // Err only means nobody is listening yet.
        let _ = self.events.send(event);
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
