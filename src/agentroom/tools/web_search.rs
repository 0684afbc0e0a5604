//! # Web Search Tool
//!
//! Sends one query to the Serper Google search API and hands back the raw JSON body.
//!
//! ```rust,no_run
//! use agentroom::tools::WebSearch;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let search = WebSearch::new(std::env::var("SERPER_API_KEY")?);
//! let body = search.search("rust websocket relay").await?;
//! println!("{}", body);
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::agentroom::tools::{build_http_client, RetryPolicy, DEFAULT_TOOL_TIMEOUT};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";

#[derive(Debug)]
pub enum SearchError {
    /// No Serper key configured; no request was made.
    MissingApiKey,
    /// The request never produced a response (after retries).
    Transport(reqwest::Error),
    /// The provider answered with a non-success status.
    Status { status: u16, body: String },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::MissingApiKey => write!(f, "search API key is not configured"),
            SearchError::Transport(e) => write!(f, "search request failed: {}", e),
            SearchError::Status { status, .. } => {
                write!(f, "search provider returned HTTP {}", status)
            }
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SearchError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

pub struct WebSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl WebSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(DEFAULT_TOOL_TIMEOUT),
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the tool at another Serper compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POST `{"q": query}` and return the response body unchanged on a 2xx status.
    pub async fn search(&self, query: &str) -> Result<String, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::MissingApiKey);
        }
        log::info!("searching for '{}'", query);

        let payload = serde_json::json!({ "q": query });
        let response = self
            .retry
            .execute("search", || {
                self.client
                    .post(&self.endpoint)
                    .header("X-API-KEY", &self.api_key)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&payload)
                    .send()
            })
            .await
            .map_err(SearchError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(SearchError::Transport)?;
        if status.is_success() {
            Ok(body)
        } else {
            log::error!("search provider returned HTTP {}", status.as_u16());
            Err(SearchError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
