//! Official search API strategy
//!
//! Queries the recent-search endpoint with application credentials and runs
//! the extractor over each returned post's text. Failures are classified
//! into rate-limit, auth and not-found cases, each reported with its own
//! hint; the strategy always degrades to an empty result instead of
//! propagating a raw API fault to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::collect::orchestrator::CandidateGate;
use crate::collect::{encode_query, CollectStrategy};
use crate::error::Result;
use crate::extract::extract_invite_links;

const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// Search API failure classification
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request quota exhausted
    #[error("Rate limited by the search API")]
    RateLimited,

    /// Credentials rejected
    #[error("Search API rejected the credentials")]
    Unauthorized,

    /// Endpoint or query target missing
    #[error("Search endpoint reported not found")]
    NotFound,

    /// Any other non-success status
    #[error("Unexpected API status: {0}")]
    Status(u16),

    /// Transport-level failure
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("Malformed API response: {0}")]
    Malformed(String),
}

/// The four credential strings the API surface accepts.
///
/// The consumer pair drives the app-only bearer flow used here; the user
/// token pair is carried for endpoints that need user context.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// Collection backend over the official search API.
pub struct ApiSearchStrategy {
    credentials: ApiCredentials,
    client: Client,
    base_url: String,
    max_results: u32,
}

impl ApiSearchStrategy {
    pub fn new(credentials: ApiCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            credentials,
            client,
            base_url: DEFAULT_API_BASE.to_string(),
            max_results: 100,
        })
    }

    /// Override the API host for testing with a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Exchange the consumer key pair for an app-only bearer token.
    async fn bearer_token(&self) -> std::result::Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/oauth2/token", self.base_url))
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        classify_status(response.status())?;

        let body: serde_json::Value = response.json().await?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Malformed("token response has no access_token".to_string()))
    }

    /// Fetch the text of recent posts matching the keyword.
    async fn recent_posts(
        &self,
        token: &str,
        keyword: &str,
    ) -> std::result::Result<Vec<String>, ApiError> {
        let max_results = self.max_results.to_string();
        let response = self
            .client
            .get(format!("{}/2/tweets/search/recent", self.base_url))
            .bearer_auth(token)
            .query(&[("query", keyword), ("max_results", max_results.as_str())])
            .send()
            .await?;

        classify_status(response.status())?;

        let body: serde_json::Value = response.json().await?;
        let texts = body
            .get("data")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(texts)
    }

    async fn search(&self, keyword: &str) -> std::result::Result<Vec<String>, ApiError> {
        let token = self.bearer_token().await?;
        self.recent_posts(&token, keyword).await
    }
}

fn classify_status(status: StatusCode) -> std::result::Result<(), ApiError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        429 => Err(ApiError::RateLimited),
        401 | 403 => Err(ApiError::Unauthorized),
        404 => Err(ApiError::NotFound),
        other => Err(ApiError::Status(other)),
    }
}

#[async_trait]
impl CollectStrategy for ApiSearchStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn run(&self, keyword: &str, gate: &mut CandidateGate) -> Result<()> {
        gate.log("[api] querying recent search");
        let source = format!("https://x.com/search?q={}", encode_query(keyword));

        let posts = match self.search(keyword).await {
            Ok(posts) => posts,
            Err(e) => {
                // Each class gets its own hint and the run stays usable
                match &e {
                    ApiError::RateLimited => {
                        gate.log("[api] rate limited; wait before retrying this keyword")
                    }
                    ApiError::Unauthorized => {
                        gate.log("[api] authentication failed; check the API credentials")
                    }
                    ApiError::NotFound => gate.log("[api] search returned no result resource"),
                    other => gate.log(&format!("[api] search failed: {other}")),
                }
                tracing::warn!(error = %e, "api search degraded to empty result");
                return Ok(());
            }
        };

        gate.log(&format!("[api] inspecting {} recent posts", posts.len()));
        for text in &posts {
            for link in extract_invite_links(text) {
                gate.offer(&link, &source)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use crate::storage::LinkStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn credentials() -> ApiCredentials {
        ApiCredentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            access_token: "token".to_string(),
            access_token_secret: "token-secret".to_string(),
        }
    }

    fn temp_gate(dir: &TempDir) -> (CandidateGate, LinkStore, Arc<MemorySink>) {
        let store = LinkStore::open(dir.path().join("links.db")).unwrap();
        let sink = Arc::new(MemorySink::new());
        let gate = CandidateGate::new(store.clone(), "kw", sink.clone());
        (gate, store, sink)
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(ApiError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(ApiError::Status(502))
        ));
    }

    #[tokio::test]
    async fn test_api_search_extracts_links() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"token_type":"bearer","access_token":"abc123"}"#)
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/2/tweets/search/recent".to_string()))
            .match_header("authorization", "Bearer abc123")
            .with_status(200)
            .with_body(
                r#"{"data":[{"id":"1","text":"airdrop t.me/apidrop"},{"id":"2","text":"again t.me/apidrop"}]}"#,
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let (mut gate, store, _sink) = temp_gate(&dir);

        let strategy = ApiSearchStrategy::new(credentials())
            .unwrap()
            .with_base_url(server.url());
        strategy.run("kw", &mut gate).await.unwrap();

        assert!(store.exists("https://t.me/apidrop").unwrap());
        assert_eq!(gate.saved_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_degrades_with_hint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(429)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let (mut gate, store, sink) = temp_gate(&dir);

        let strategy = ApiSearchStrategy::new(credentials())
            .unwrap()
            .with_base_url(server.url());
        strategy.run("kw", &mut gate).await.unwrap();

        assert_eq!(gate.saved_count(), 0);
        assert!(store.search(None, None).unwrap().is_empty());
        assert!(sink.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_unauthorized_degrades_with_hint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(401)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let (mut gate, _store, sink) = temp_gate(&dir);

        let strategy = ApiSearchStrategy::new(credentials())
            .unwrap()
            .with_base_url(server.url());
        strategy.run("kw", &mut gate).await.unwrap();

        assert!(sink.contains("check the API credentials"));
    }

    #[tokio::test]
    async fn test_empty_data_yields_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"abc123"}"#)
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/2/tweets/search/recent".to_string()))
            .with_status(200)
            .with_body(r#"{"meta":{"result_count":0}}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let (mut gate, _store, _sink) = temp_gate(&dir);

        let strategy = ApiSearchStrategy::new(credentials())
            .unwrap()
            .with_base_url(server.url());
        strategy.run("kw", &mut gate).await.unwrap();

        assert_eq!(gate.saved_count(), 0);
    }
}
