//! Contracts for the managed backend, and the adapters that speak them.
//!
//! The identity provider and the table store are separate traits so a store can be
//! handed only what it needs. Both are held as `Arc<dyn …>` and injected.

mod memory;
mod rest;
mod supabase;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    AppResult,
    db::{Comment, Confession, Identity, NewComment, NewConfession, Profile},
};

pub(crate) use rest::check;
pub use memory::{MemoryBackend, Operation};
pub use supabase::SupabaseClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Profiles,
    Confessions,
    Comments,
}

impl Table {
    pub fn name(&self) -> &'static str {
        use Table::*;
        match self {
            Profiles => "profiles",
            Confessions => "confessions",
            Comments => "comments",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account. Returns the identity when the provider opened a session
    /// straight away, `None` when the account still awaits confirmation.
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Option<Identity>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Identity>;

    async fn sign_out(&self) -> AppResult<()>;

    /// The identity behind the currently held session, if any.
    async fn current_identity(&self) -> AppResult<Option<Identity>>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// All confessions, newest first.
    async fn list_confessions(&self) -> AppResult<Vec<Confession>>;

    async fn get_confession(&self, id: Uuid) -> AppResult<Confession>;

    async fn insert_confession(&self, confession: &NewConfession) -> AppResult<()>;

    /// Adds one like and returns the stored count. Not guaranteed atomic: an adapter
    /// may read the count and write it back incremented, losing concurrent likes.
    async fn increment_likes(&self, id: Uuid) -> AppResult<u32>;

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Profile>;

    async fn insert_profile(&self, user_id: Uuid) -> AppResult<()>;

    async fn set_last_confession_date(&self, user_id: Uuid, date: &str) -> AppResult<()>;

    /// Comments under one confession, oldest first.
    async fn list_comments(&self, confession_id: Uuid) -> AppResult<Vec<Comment>>;

    async fn insert_comment(&self, comment: &NewComment) -> AppResult<Comment>;
}
