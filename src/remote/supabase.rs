use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::{
    AppResult, GetField,
    config::Config,
    db::{Comment, Confession, Identity, NewComment, NewConfession, Profile},
};

use super::{
    DataStore, IdentityProvider, Table,
    rest::{Request, check},
};

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LikesRow {
    likes: u32,
}

/// Hosted backend: GoTrue for identity, PostgREST for tables. Both halves share the
/// session's access token so row-level policies see the signed-in user.
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl SupabaseClient {
    pub fn new(supabase_url: &str, anon_key: &str) -> AppResult<Self> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&format!("{}/", supabase_url.trim_end_matches('/')))?,
            anon_key: anon_key.to_owned(),
            access_token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(&config.supabase_url, &config.supabase_anon_key)
    }

    async fn table(&self, table: Table) -> AppResult<Request> {
        let token = self.access_token.read().await;
        let bearer = token.as_deref().unwrap_or(&self.anon_key);
        Request::new(self.http.clone(), &self.base_url, table, &self.anon_key, bearer)
    }

    fn auth_url(&self, path: &str) -> AppResult<Url> {
        Ok(self.base_url.join(&format!("auth/v1/{path}"))?)
    }

    /// Keeps the session's token, if the body carries one, and returns its user.
    async fn adopt_session(&self, body: &Value) -> AppResult<Option<Identity>> {
        let Ok(access_token) = body.get_str_field("access_token") else {
            return Ok(None);
        };
        let user = serde_json::from_value(body.get_obj_field("user")?.clone())?;
        *self.access_token.write().await = Some(access_token);
        Ok(Some(user))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Option<Identity>> {
        let response = self.http.post(self.auth_url("signup")?)
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        self.adopt_session(&body).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Identity> {
        let mut url = self.auth_url("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self.http.post(url)
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        self.adopt_session(&body).await?
            .ok_or_else(|| format!("expected a session in {body}").into())
    }

    async fn sign_out(&self) -> AppResult<()> {
        // The token stays until the logout is confirmed; a failed sign-out leaves the
        // session usable.
        let Some(token) = self.access_token.read().await.clone() else {
            return Ok(());
        };
        let response = self.http.post(self.auth_url("logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await?;
        check(response).await?;

        let mut held = self.access_token.write().await;
        if held.as_deref() == Some(token.as_str()) {
            *held = None;
        }
        Ok(())
    }

    async fn current_identity(&self) -> AppResult<Option<Identity>> {
        let Some(token) = self.access_token.read().await.clone() else {
            return Ok(None);
        };
        let response = self.http.get(self.auth_url("user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Some(check(response).await?.json().await?))
    }
}

#[async_trait]
impl DataStore for SupabaseClient {
    async fn list_confessions(&self) -> AppResult<Vec<Confession>> {
        self.table(Table::Confessions).await?
            .select("*")
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn get_confession(&self, id: Uuid) -> AppResult<Confession> {
        self.table(Table::Confessions).await?
            .select("*")
            .eq("id", id)
            .single()
            .fetch()
            .await
    }

    async fn insert_confession(&self, confession: &NewConfession) -> AppResult<()> {
        self.table(Table::Confessions).await?
            .insert(std::slice::from_ref(confession))
            .await
    }

    // PostgREST has no increment; this is a read followed by a write, so two clients
    // liking at once can both write the same count.
    async fn increment_likes(&self, id: Uuid) -> AppResult<u32> {
        let LikesRow { likes } = self.table(Table::Confessions).await?
            .select("likes")
            .eq("id", id)
            .single()
            .fetch()
            .await?;
        let likes = likes.saturating_add(1);
        debug!(%id, likes, "writing incremented like count");

        self.table(Table::Confessions).await?
            .eq("id", id)
            .update(&json!({ "likes": likes }))
            .await?;
        Ok(likes)
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Profile> {
        self.table(Table::Profiles).await?
            .select("id,last_confession_date")
            .eq("id", user_id)
            .single()
            .fetch()
            .await
    }

    async fn insert_profile(&self, user_id: Uuid) -> AppResult<()> {
        self.table(Table::Profiles).await?
            .insert(&[json!({ "id": user_id })])
            .await
    }

    async fn set_last_confession_date(&self, user_id: Uuid, date: &str) -> AppResult<()> {
        self.table(Table::Profiles).await?
            .eq("id", user_id)
            .update(&json!({ "last_confession_date": date }))
            .await
    }

    async fn list_comments(&self, confession_id: Uuid) -> AppResult<Vec<Comment>> {
        self.table(Table::Comments).await?
            .select("*")
            .eq("confession_id", confession_id)
            .order("created_at", true)
            .fetch()
            .await
    }

    async fn insert_comment(&self, comment: &NewComment) -> AppResult<Comment> {
        self.table(Table::Comments).await?
            .select("*")
            .single()
            .insert_returning(std::slice::from_ref(comment))
            .await
    }
}
