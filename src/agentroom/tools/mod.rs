//! Built-in research tools.
//!
//! - [`WebSearch`]: Google results through the Serper API
//! - [`WebScraper`]: render a page through Browserless, extract its visible text and condense
//!   long pages with an objective-conditioned map-reduce summary
//!
//! Both are exposed to agents through
//! [`WebResearchProtocol`](crate::tool_protocols::WebResearchProtocol).

use std::time::Duration;

pub mod retry;
pub mod text;
pub mod web_scrape;
pub mod web_search;

pub use retry::RetryPolicy;
pub use web_scrape::{LlmSummarizer, ScrapeError, Summarizer, WebScraper};
pub use web_search::{SearchError, WebSearch};

/// Default request timeout for both providers.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a reqwest client with the given request timeout.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            log::warn!(
                "could not build HTTP client with a {:?} timeout ({}), using defaults",
                timeout,
                e
            );
            reqwest::Client::new()
        }
    }
}
