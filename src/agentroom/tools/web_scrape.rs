//! # Scrape and Summarize Tool
//!
//! Renders a page through the Browserless `/content` endpoint, extracts its visible text and,
//! when the text is too long to hand back to an agent, condenses it with a map-reduce summary
//! conditioned on the caller's objective.
//!
//! ```text
//! url ──POST /content──▶ HTML ──▶ visible text ──(> 10,000 chars)──▶ chunks
//!                                      │                               │ summarize each
//!                                      ▼                               ▼
//!                                  returned as-is              combine ──▶ summary
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentroom::clients::openai::{OpenAIClient, DEFAULT_SUMMARY_MODEL};
//! use agentroom::tools::{LlmSummarizer, WebScraper};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let llm = Arc::new(OpenAIClient::new_with_model_string(
//!     &std::env::var("OPENAI_API_KEY")?,
//!     DEFAULT_SUMMARY_MODEL,
//! ));
//! let scraper = WebScraper::new(
//!     std::env::var("BROWSERLESS_API_KEY")?,
//!     Arc::new(LlmSummarizer::new(llm)),
//! );
//! let text = scraper
//!     .scrape_and_summarize("pricing of managed Postgres", "https://example.com/pricing")
//!     .await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use crate::agentroom::client_wrapper::{ClientWrapper, Message, Role};
use crate::agentroom::tools::text::{extract_visible_text, split_text};
use crate::agentroom::tools::{build_http_client, RetryPolicy, DEFAULT_TOOL_TIMEOUT};

pub const DEFAULT_SCRAPE_ENDPOINT: &str = "https://chrome.browserless.io/content";

/// Pages whose visible text is longer than this many characters get summarized.
pub const SUMMARY_THRESHOLD: usize = 10_000;
pub const CHUNK_SIZE: usize = 10_000;
pub const CHUNK_OVERLAP: usize = 500;

/// The prompt used for both the per-chunk and the combining summary.
pub fn summary_prompt(objective: &str, text: &str) -> String {
    format!(
        "Write a summary of the following text for {}:\n\"{}\"\nSUMMARY:",
        objective, text
    )
}

#[derive(Debug)]
pub enum ScrapeError {
    /// No Browserless token configured; no request was made.
    MissingApiKey,
    /// The render request never produced a readable response (after retries).
    Transport(reqwest::Error),
    /// The render provider answered with a non-success status.
    Status { status: u16, url: String },
    /// The page was fetched but condensing it failed.
    Summarization(String),
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeError::MissingApiKey => write!(f, "scrape API key is not configured"),
            ScrapeError::Transport(e) => write!(f, "scrape request failed: {}", e),
            ScrapeError::Status { status, url } => {
                write!(f, "HTTP request for {} failed with status code {}", url, status)
            }
            ScrapeError::Summarization(msg) => write!(f, "summarization failed: {}", msg),
        }
    }
}

impl Error for ScrapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScrapeError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Condenses text with respect to an objective.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        objective: &str,
        text: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// [`Summarizer`] backed by a chat model, one request per call.
pub struct LlmSummarizer {
    client: Arc<dyn ClientWrapper>,
}

impl LlmSummarizer {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        objective: &str,
        text: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let prompt = summary_prompt(objective, text);
        let reply = self
            .client
            .send_message(&[Message::new(Role::User, prompt)])
            .await?;
        Ok(reply.content.trim().to_string())
    }
}

/// Most chunk summaries requested from the model at once.
pub const MAX_CONCURRENT_SUMMARIES: usize = 4;

/// Rounds of re-summarizing partial summaries before the final combine.
const MAX_COLLAPSE_ROUNDS: usize = 4;

/// Summarize every chunk of `text`, then summarize the joined chunk summaries.
///
/// At most [`MAX_CONCURRENT_SUMMARIES`] requests are in flight. While the joined partial
/// summaries are longer than `chunk_size` they are grouped into `chunk_size` pieces and
/// summarized again, so the final combine never sees more than one chunk of text unless the
/// summaries stop shrinking.
pub async fn map_reduce_summary(
    summarizer: &dyn Summarizer,
    objective: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let chunks = split_text(text, chunk_size, overlap);
    log::debug!("summarizing {} chunks for '{}'", chunks.len(), objective);

    let mut partials = summarize_all(summarizer, objective, chunks).await?;

    for round in 0..MAX_COLLAPSE_ROUNDS {
        if partials.len() < 2 || joined_len(&partials) <= chunk_size {
            break;
        }
        let groups = group_partials(&partials, chunk_size);
        if groups.len() >= partials.len() {
            log::warn!("partial summaries no longer shrink, combining them as they are");
            break;
        }
        log::debug!(
            "collapse round {}: {} partial summaries into {} groups",
            round + 1,
            partials.len(),
            groups.len()
        );
        partials = summarize_all(summarizer, objective, groups).await?;
    }

    summarizer.summarize(objective, &partials.join("\n\n")).await
}

async fn summarize_all(
    summarizer: &dyn Summarizer,
    objective: &str,
    texts: Vec<String>,
) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
    stream::iter(texts)
        .map(|text| async move { summarizer.summarize(objective, &text).await })
        .buffered(MAX_CONCURRENT_SUMMARIES)
        .try_collect()
        .await
}

fn joined_len(partials: &[String]) -> usize {
    let separators = partials.len().saturating_sub(1) * 2;
    partials.iter().map(|p| p.chars().count()).sum::<usize>() + separators
}

/// Greedily pack consecutive partial summaries into groups of at most `limit` characters.
fn group_partials(partials: &[String], limit: usize) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();
    for partial in partials {
        let extra = partial.chars().count() + if current.is_empty() { 0 } else { 2 };
        if !current.is_empty() && current.chars().count() + extra > limit {
            groups.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(partial);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

pub struct WebScraper {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
    summarizer: Arc<dyn Summarizer>,
    summary_threshold: usize,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WebScraper {
    pub fn new(api_key: impl Into<String>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            client: build_http_client(DEFAULT_TOOL_TIMEOUT),
            endpoint: DEFAULT_SCRAPE_ENDPOINT.to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            summarizer,
            summary_threshold: SUMMARY_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }

    /// Point the tool at another Browserless compatible `/content` endpoint.
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

    /// Override the summarization threshold, chunk size and chunk overlap (in characters).
    pub fn with_chunking(mut self, threshold: usize, chunk_size: usize, overlap: usize) -> Self {
        self.summary_threshold = threshold;
        self.chunk_size = chunk_size;
        self.chunk_overlap = overlap;
        self
    }

    /// Fetch `url` through the render provider and return its visible text, condensed for
    /// `objective` when longer than the summary threshold.
    pub async fn scrape_and_summarize(
        &self,
        objective: &str,
        url: &str,
    ) -> Result<String, ScrapeError> {
        if self.api_key.is_empty() {
            return Err(ScrapeError::MissingApiKey);
        }
        log::info!("scraping website {}", url);

        let request_url = format!(
            "{}?token={}",
            self.endpoint,
            urlencoding::encode(&self.api_key)
        );
        let payload = serde_json::json!({ "url": url });
        let response = self
            .retry
            .execute("scrape", || {
                self.client
                    .post(&request_url)
                    .header(CACHE_CONTROL, "no-cache")
                    .header(CONTENT_TYPE, "application/json")
                    .json(&payload)
                    .send()
            })
            .await
            .map_err(ScrapeError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            log::error!("HTTP request failed with status code {}", status.as_u16());
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response.text().await.map_err(ScrapeError::Transport)?;
        let text = extract_visible_text(&html);
        let length = text.chars().count();
        log::debug!("extracted {} characters from {}", length, url);

        if length <= self.summary_threshold {
            return Ok(text);
        }

        map_reduce_summary(
            self.summarizer.as_ref(),
            objective,
            &text,
            self.chunk_size,
            self.chunk_overlap,
        )
        .await
        .map_err(|e| ScrapeError::Summarization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(
            &self,
            _objective: &str,
            text: &str,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.chars().take(20).collect())
        }
    }

    #[test]
    fn test_summary_prompt_shape() {
        assert_eq!(
            summary_prompt("rust", "body"),
            "Write a summary of the following text for rust:\n\"body\"\nSUMMARY:"
        );
    }

    #[tokio::test]
    async fn test_map_reduce_runs_one_call_per_chunk_plus_combine() {
        let summarizer = CountingSummarizer {
            calls: AtomicUsize::new(0),
        };
        let text = (0..6)
            .map(|i| format!("paragraph {} {}", i, "x".repeat(80)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, 200, 20).len();

        let summary = map_reduce_summary(&summarizer, "goal", &text, 200, 20)
            .await
            .unwrap();

        assert!(chunks > 1);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), chunks + 1);
        assert!(summary.chars().count() <= 20);
    }

    /// Returns a fixed-width summary after a short delay and records the widest input and the
    /// peak number of overlapping calls.
    struct SlowSummarizer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        inputs: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Summarizer for SlowSummarizer {
        async fn summarize(
            &self,
            _objective: &str,
            text: &str,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(text.chars().count());
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("s".repeat(30))
        }
    }

    #[tokio::test]
    async fn test_map_reduce_bounds_concurrency_and_collapses_long_partials() {
        let summarizer = SlowSummarizer {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            inputs: std::sync::Mutex::new(Vec::new()),
        };
        let text = (0..20)
            .map(|i| format!("{:02} {}", i, "y".repeat(90)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, 100, 0).len();
        assert_eq!(chunks, 20);

        let summary = map_reduce_summary(&summarizer, "goal", &text, 100, 0)
            .await
            .unwrap();

        assert_eq!(summary, "s".repeat(30));
        assert!(summarizer.peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_SUMMARIES);
        // 20 chunks, then 20 partials packed three per group (7), then 7 packed into 3,
        // then the final combine of 3 partials (94 chars).
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 20 + 7 + 3 + 1);
        assert!(summarizer.inputs.lock().unwrap().iter().all(|&len| len <= 100));
    }

    #[test]
    fn test_group_partials_packs_up_to_the_limit() {
        let partials: Vec<String> = (0..5).map(|_| "p".repeat(30)).collect();
        let groups = group_partials(&partials, 100);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].chars().count(), 94);
        assert_eq!(groups[1].chars().count(), 62);
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let scraper = WebScraper::new(
            "",
            Arc::new(CountingSummarizer {
                calls: AtomicUsize::new(0),
            }),
        );
        let err = scraper
            .scrape_and_summarize("goal", "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingApiKey));
    }
}
