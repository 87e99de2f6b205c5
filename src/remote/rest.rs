use reqwest::{Client, Method, RequestBuilder, Response, header::ACCEPT};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{AppResult, GetField};

use super::Table;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// One PostgREST call against a table, built up filter by filter.
pub(crate) struct Request {
    http: Client,
    endpoint: Url,
    apikey: String,
    bearer: String,
    params: Vec<(String, String)>,
    single: bool,
}

impl Request {
    pub(crate) fn new(http: Client, base_url: &Url, table: Table, apikey: &str, bearer: &str) -> AppResult<Self> {
        Ok(Self {
            http,
            endpoint: base_url.join(&format!("rest/v1/{table}"))?,
            apikey: apikey.to_owned(),
            bearer: bearer.to_owned(),
            params: Vec::new(),
            single: false,
        })
    }

    pub(crate) fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_owned(), columns.to_owned()));
        self
    }

    pub(crate) fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params.push((column.to_owned(), format!("eq.{}", value.to_string())));
        self
    }

    pub(crate) fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params.push(("order".to_owned(), format!("{column}.{direction}")));
        self
    }

    /// Expect exactly one row; zero or several rows become an error.
    pub(crate) fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub(crate) fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.params);
        }
        url
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(self) -> AppResult<T> {
        let response = self.builder(Method::GET).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub(crate) async fn insert<B: Serialize + ?Sized>(self, rows: &B) -> AppResult<()> {
        let response = self.builder(Method::POST)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub(crate) async fn insert_returning<B: Serialize + ?Sized, T: DeserializeOwned>(self, rows: &B) -> AppResult<T> {
        let response = self.builder(Method::POST)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub(crate) async fn update<B: Serialize + ?Sized>(self, patch: &B) -> AppResult<()> {
        let response = self.builder(Method::PATCH)
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn builder(&self, method: Method) -> RequestBuilder {
        let builder = self.http.request(method, self.url())
            .header("apikey", &self.apikey)
            .bearer_auth(&self.bearer);
        if self.single {
            builder.header(ACCEPT, SINGLE_OBJECT)
        } else {
            builder
        }
    }
}

/// Turns a non-success response into an error carrying the provider's own message.
pub(crate) async fn check(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    Err(error_message(&body).unwrap_or_else(|| format!("request failed with status {status}")).into())
}

pub(crate) fn error_message(body: &Value) -> Option<String> {
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|field| body.get_str_field(field).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(table: Table) -> Request {
        let base = Url::parse("https://project.supabase.co/").unwrap();
        Request::new(Client::new(), &base, table, "anon", "anon").unwrap()
    }

    #[test]
    fn builds_filtered_ordered_query() {
        let url = request(Table::Comments)
            .select("*")
            .eq("confession_id", "abc")
            .order("created_at", true)
            .url();

        assert_eq!(url.path(), "/rest/v1/comments");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![
            ("select".to_owned(), "*".to_owned()),
            ("confession_id".to_owned(), "eq.abc".to_owned()),
            ("order".to_owned(), "created_at.asc".to_owned()),
        ]);
    }

    #[test]
    fn bare_table_has_no_query() {
        let url = request(Table::Profiles).url();
        assert_eq!(url.as_str(), "https://project.supabase.co/rest/v1/profiles");
    }

    #[test]
    fn error_message_prefers_provider_text() {
        assert_eq!(
            error_message(&json!({ "message": "JWT expired", "code": "PGRST301" })).as_deref(),
            Some("JWT expired"),
        );
        assert_eq!(
            error_message(&json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })).as_deref(),
            Some("Invalid login credentials"),
        );
        assert_eq!(error_message(&Value::Null), None);
    }
}
