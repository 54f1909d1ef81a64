// Search capability — paged hashtag queries against an authenticated session.
//
// The SearchBackend trait is the boundary the rest of the engine sees; the
// HTTP implementation pages through the platform search endpoint with the
// session's cookies. The mock backends in the integration tests implement
// the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::auth::Session;

/// Search failure taxonomy.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The bound session can no longer serve queries (rate limit or revoked
    /// session). Carries the account so the caller can rotate it out.
    #[error("no session capacity left on @{username}")]
    CapacityExhausted { username: String },
    /// Network or platform hiccup — the query may succeed later.
    #[error("search request failed: {0}")]
    Transient(String),
}

/// One post-like record from the search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
}

/// Search capability interface. Implementations issue one query against one
/// session and return up to `limit` records.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        session: &Session,
        query: &str,
        limit: u32,
    ) -> Result<Vec<TweetRecord>, SearchError>;
}

/// Records per page requested from the search endpoint (platform max is 100).
const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    tweets: Vec<TweetRecord>,
    next_cursor: Option<String>,
}

/// HTTP search backend — a thin reqwest wrapper over the platform search
/// endpoint, authenticated with the session's cookie pair.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchBackend {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("brushfire/0.1 (campaign-monitor)")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        session: &Session,
        query: &str,
        limit: u32,
    ) -> Result<Vec<TweetRecord>, SearchError> {
        let url = format!("{}/2/search/tweets", self.base_url);
        let mut tweets: Vec<TweetRecord> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page_size = SEARCH_PAGE_SIZE.min(limit - tweets.len() as u32).to_string();
            let mut params: Vec<(&str, &str)> = vec![("q", query), ("count", &page_size)];
            if let Some(ref c) = cursor {
                params.push(("cursor", c));
            }

            debug!(query = query, collected = tweets.len(), "Search page request");

            let response = self
                .client
                .get(&url)
                .query(&params)
                .header(
                    "cookie",
                    format!(
                        "auth_token={}; ct0={}",
                        session.tokens.auth_token, session.tokens.csrf_token
                    ),
                )
                .header("x-csrf-token", &session.tokens.csrf_token)
                .send()
                .await
                .map_err(|e| SearchError::Transient(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::UNAUTHORIZED
            {
                // Rate-limited or session revoked — either way this account
                // can't serve the queue right now.
                return Err(SearchError::CapacityExhausted {
                    username: session.username.clone(),
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SearchError::Transient(format!("{status}: {body}")));
            }

            let page: SearchPage = response
                .json()
                .await
                .map_err(|e| SearchError::Transient(format!("unparseable search page: {e}")))?;

            tweets.extend(page.tweets);

            if tweets.len() as u32 >= limit || page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }

        tweets.truncate(limit as usize);
        Ok(tweets)
    }
}
