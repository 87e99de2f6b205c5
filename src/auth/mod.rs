mod session;

use crate::db::Identity;

pub use session::{SessionState, SessionStore};

/// Published by [`SessionStore`] whenever the signed-in identity changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(Identity),
    SignedOut,
}

impl IdentityEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityEvent::SignedIn(identity) => Some(identity),
            IdentityEvent::SignedOut => None,
        }
    }
}
