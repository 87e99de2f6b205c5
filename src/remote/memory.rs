use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    AppResult,
    db::{Comment, Confession, Identity, NewComment, NewConfession, Profile},
};

use super::{DataStore, IdentityProvider};

/// Every remote call `MemoryBackend` can be told to fail, and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    CurrentIdentity,
    ListConfessions,
    GetConfession,
    InsertConfession,
    IncrementLikes,
    GetProfile,
    InsertProfile,
    UpdateProfile,
    ListComments,
    InsertComment,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, (Identity, String)>,
    session: Option<Identity>,
    profiles: HashMap<Uuid, Profile>,
    confessions: Vec<Confession>,
    comments: Vec<Comment>,
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

impl Tables {
    fn call(&mut self, op: Operation) -> AppResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(format!("{op:?} failed: service unavailable").into());
        }
        Ok(())
    }
}

/// In-process stand-in for the hosted backend, with the same observable contract.
/// Likes are incremented atomically here, unlike the hosted adapter.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail until [`MemoryBackend::heal`].
    pub async fn fail(&self, op: Operation) {
        self.tables.lock().await.failing.insert(op);
    }

    pub async fn heal(&self, op: Operation) {
        self.tables.lock().await.failing.remove(&op);
    }

    /// How many times `op` has been attempted, failed attempts included.
    pub async fn calls(&self, op: Operation) -> usize {
        self.tables.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Registers an account with a profile, without opening a session.
    pub async fn seed_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity { id: Uuid::now_v7(), email: Some(email.to_owned()) };
        let mut tables = self.tables.lock().await;
        tables.accounts.insert(email.to_owned(), (identity.clone(), password.to_owned()));
        tables.profiles.insert(identity.id, Profile { id: identity.id, last_confession_date: None });
        identity
    }

    pub async fn seed_profile(&self, profile: Profile) {
        self.tables.lock().await.profiles.insert(profile.id, profile);
    }

    pub async fn seed_confession(&self, confession: Confession) {
        self.tables.lock().await.confessions.push(confession);
    }

    pub async fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.tables.lock().await.profiles.get(&user_id).cloned()
    }

    pub async fn confession(&self, id: Uuid) -> Option<Confession> {
        self.tables.lock().await.confessions.iter().find(|c| c.id == id).cloned()
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Option<Identity>> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::SignUp)?;
        if tables.accounts.contains_key(email) {
            return Err("User already registered".into());
        }
        let identity = Identity { id: Uuid::now_v7(), email: Some(email.to_owned()) };
        tables.accounts.insert(email.to_owned(), (identity.clone(), password.to_owned()));
        tables.session = Some(identity.clone());
        Ok(Some(identity))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Identity> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::SignIn)?;
        let identity = match tables.accounts.get(email) {
            Some((identity, stored)) if stored == password => identity.clone(),
            _ => return Err("Invalid login credentials".into()),
        };
        tables.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::SignOut)?;
        tables.session = None;
        Ok(())
    }

    async fn current_identity(&self) -> AppResult<Option<Identity>> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::CurrentIdentity)?;
        Ok(tables.session.clone())
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn list_confessions(&self) -> AppResult<Vec<Confession>> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::ListConfessions)?;
        let mut confessions = tables.confessions.clone();
        confessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(confessions)
    }

    async fn get_confession(&self, id: Uuid) -> AppResult<Confession> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::GetConfession)?;
        tables.confessions.iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| format!("confession {id} not found").into())
    }

    async fn insert_confession(&self, confession: &NewConfession) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::InsertConfession)?;
        let NewConfession { user_id, content, location_name, latitude, longitude, is_anonymous } = confession.clone();
        tables.confessions.push(Confession {
            id: Uuid::now_v7(),
            created_at: OffsetDateTime::now_utc(),
            user_id,
            content,
            location_name,
            latitude,
            longitude,
            likes: 0,
            is_anonymous,
        });
        Ok(())
    }

    async fn increment_likes(&self, id: Uuid) -> AppResult<u32> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::IncrementLikes)?;
        let confession = tables.confessions.iter_mut()
            .find(|c| c.id == id)
            .ok_or(format!("confession {id} not found"))?;
        confession.likes = confession.likes.saturating_add(1);
        Ok(confession.likes)
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::GetProfile)?;
        tables.profiles.get(&user_id)
            .cloned()
            .ok_or_else(|| format!("profile {user_id} not found").into())
    }

    async fn insert_profile(&self, user_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::InsertProfile)?;
        if tables.profiles.contains_key(&user_id) {
            return Err(format!("profile {user_id} already exists").into());
        }
        tables.profiles.insert(user_id, Profile { id: user_id, last_confession_date: None });
        Ok(())
    }

    async fn set_last_confession_date(&self, user_id: Uuid, date: &str) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::UpdateProfile)?;
        let profile = tables.profiles.get_mut(&user_id)
            .ok_or(format!("profile {user_id} not found"))?;
        profile.last_confession_date = Some(date.to_owned());
        Ok(())
    }

    async fn list_comments(&self, confession_id: Uuid) -> AppResult<Vec<Comment>> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::ListComments)?;
        let mut comments: Vec<Comment> = tables.comments.iter()
            .filter(|c| c.confession_id == confession_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: &NewComment) -> AppResult<Comment> {
        let mut tables = self.tables.lock().await;
        tables.call(Operation::InsertComment)?;
        if !tables.confessions.iter().any(|c| c.id == comment.confession_id) {
            return Err(format!("confession {} not found", comment.confession_id).into());
        }
        let NewComment { confession_id, user_id, content, is_anonymous } = comment.clone();
        let stored = Comment {
            id: Uuid::now_v7(),
            created_at: OffsetDateTime::now_utc(),
            confession_id,
            user_id,
            content,
            is_anonymous,
        };
        tables.comments.push(stored.clone());
        Ok(stored)
    }
}
