//! [`ToolProtocol`] implementations shipped with the crate.
//!
//! [`WebResearchProtocol`] exposes the two research tools to agents:
//!
//! | tool            | parameters                 | backed by                                  |
//! |-----------------|----------------------------|--------------------------------------------|
//! | `google_search` | `search_keyword`           | [`WebSearch::search`]                      |
//! | `web_scraping`  | `objective`, `url`         | [`WebScraper::scrape_and_summarize`]       |
//!
//! Provider failures never escape as errors: they come back as a failed [`ToolResult`] so the
//! agent can read the reason and carry on.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agentroom::tool_protocol::{
    required_str, Tool, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol,
    ToolRegistry, ToolResult,
};
use crate::agentroom::tools::{WebScraper, WebSearch};

pub const GOOGLE_SEARCH_TOOL: &str = "google_search";
pub const WEB_SCRAPING_TOOL: &str = "web_scraping";

pub struct WebResearchProtocol {
    search: Option<Arc<WebSearch>>,
    scraper: Option<Arc<WebScraper>>,
}

impl WebResearchProtocol {
    pub fn new(search: Arc<WebSearch>, scraper: Arc<WebScraper>) -> Self {
        Self {
            search: Some(search),
            scraper: Some(scraper),
        }
    }

    pub fn search_only(search: Arc<WebSearch>) -> Self {
        Self {
            search: Some(search),
            scraper: None,
        }
    }

    fn advertised(&self) -> Vec<ToolMetadata> {
        let mut tools = Vec::new();
        if self.search.is_some() {
            tools.push(Self::search_metadata());
        }
        if self.scraper.is_some() {
            tools.push(Self::scrape_metadata());
        }
        tools
    }

    /// A registry serving every tool this protocol exposes.
    pub fn into_registry(self: Arc<Self>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for metadata in self.advertised() {
            let protocol: Arc<dyn ToolProtocol> = Arc::clone(&self) as Arc<dyn ToolProtocol>;
            registry.add_tool(Tool::from_metadata(metadata, protocol));
        }
        registry
    }

    fn search_metadata() -> ToolMetadata {
        ToolMetadata::new(
            GOOGLE_SEARCH_TOOL,
            "Search Google for recent results and return the raw result list as JSON.",
        )
        .with_parameter(
            ToolParameter::new("search_keyword", ToolParameterType::String)
                .with_description("The query to search for")
                .required(),
        )
    }

    fn scrape_metadata() -> ToolMetadata {
        ToolMetadata::new(
            WEB_SCRAPING_TOOL,
            "Scrape a website and return its text, summarized for the objective when long. \
             Do not make up any url, only use urls found in search results.",
        )
        .with_parameter(
            ToolParameter::new("objective", ToolParameterType::String)
                .with_description("What you want to learn from the page")
                .required(),
        )
        .with_parameter(
            ToolParameter::new("url", ToolParameterType::String)
                .with_description("The page to scrape")
                .required(),
        )
    }
}

#[async_trait]
impl ToolProtocol for WebResearchProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match (tool_name, &self.search, &self.scraper) {
            (GOOGLE_SEARCH_TOOL, Some(search), _) => {
                let query = match required_str(&parameters, "search_keyword") {
                    Ok(q) => q,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                Ok(match search.search(query).await {
                    Ok(body) => ToolResult::success(serde_json::Value::String(body))
                        .with_metadata("query", serde_json::json!(query)),
                    Err(e) => ToolResult::failure(e.to_string()),
                })
            }
            (WEB_SCRAPING_TOOL, _, Some(scraper)) => {
                let (objective, url) = match (
                    required_str(&parameters, "objective"),
                    required_str(&parameters, "url"),
                ) {
                    (Ok(objective), Ok(url)) => (objective, url),
                    (Err(e), _) | (_, Err(e)) => return Ok(ToolResult::failure(e.to_string())),
                };
                Ok(match scraper.scrape_and_summarize(objective, url).await {
                    Ok(text) => ToolResult::success(serde_json::Value::String(text))
                        .with_metadata("url", serde_json::json!(url)),
                    Err(e) => ToolResult::failure(e.to_string()),
                })
            }
            _ => Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(self.advertised())
    }

    fn protocol_name(&self) -> &str {
        "web-research"
    }
}
