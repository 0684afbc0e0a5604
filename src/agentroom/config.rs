//! Runtime configuration for the agent room.
//!
//! [`AgentRoomConfig`] is a plain struct: build it by hand, start from
//! [`Default`], or read it from the environment with [`AgentRoomConfig::from_env`].
//!
//! | variable                               | default                | notes            |
//! |----------------------------------------|------------------------|------------------|
//! | `OPENAI_API_KEY`                       |                        | required         |
//! | `SERPER_API_KEY`                       | empty                  | search tool      |
//! | `BROWSERLESS_API_KEY`                  | empty                  | scrape tool      |
//! | `AGENTROOM_BIND`                       | `127.0.0.1:8000`       |                  |
//! | `AGENTROOM_MODEL`                      | `gpt-4-1106-preview`   | agents, selector |
//! | `AGENTROOM_MAX_ROUND`                  | `10`                   |                  |
//! | `AGENTROOM_HUMAN_INPUT_TIMEOUT_SECS`   | `300`                  | `0` disables     |
//! | `AGENTROOM_TOOL_TIMEOUT_SECS`          | `30`                   |                  |
//!
//! ```rust
//! use agentroom::config::AgentRoomConfig;
//!
//! let config = AgentRoomConfig {
//!     openai_api_key: "sk-test".into(),
//!     max_round: 6,
//!     ..AgentRoomConfig::default()
//! };
//! assert_eq!(config.bind_address, "127.0.0.1:8000");
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::agentroom::clients::openai::{DEFAULT_CHAT_MODEL, DEFAULT_SUMMARY_MODEL};
use crate::agentroom::group_chat::DEFAULT_MAX_ROUND;
use crate::agentroom::tools::web_scrape::{
    CHUNK_OVERLAP, CHUNK_SIZE, DEFAULT_SCRAPE_ENDPOINT, SUMMARY_THRESHOLD,
};
use crate::agentroom::tools::web_search::DEFAULT_SEARCH_ENDPOINT;
use crate::agentroom::tools::DEFAULT_TOOL_TIMEOUT;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const DEFAULT_HUMAN_INPUT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "environment variable {} is not set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "environment variable {} has invalid value '{}'", key, value)
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AgentRoomConfig {
    pub openai_api_key: String,
    /// OpenAI compatible endpoint to use instead of api.openai.com.
    pub openai_base_url: Option<String>,
    pub serper_api_key: String,
    pub browserless_api_key: String,
    pub bind_address: String,
    /// Model used by the agents and the speaker selector.
    pub model: String,
    /// Model used to condense long scraped pages.
    pub summary_model: String,
    pub max_round: usize,
    /// `None` waits for the human until the connection closes.
    pub human_input_timeout: Option<Duration>,
    pub tool_timeout: Duration,
    /// Reset the transcript and agent memories at the start of every conversation.
    pub clear_history: bool,
    pub search_endpoint: String,
    pub scrape_endpoint: String,
    pub summary_threshold: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for AgentRoomConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: None,
            serper_api_key: String::new(),
            browserless_api_key: String::new(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            max_round: DEFAULT_MAX_ROUND,
            human_input_timeout: Some(DEFAULT_HUMAN_INPUT_TIMEOUT),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            clear_history: true,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            scrape_endpoint: DEFAULT_SCRAPE_ENDPOINT.to_string(),
            summary_threshold: SUMMARY_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

impl AgentRoomConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an explicit variable map; unknown keys are ignored.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        config.openai_base_url = lookup("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup("SERPER_API_KEY") {
            config.serper_api_key = key;
        }
        if let Some(key) = lookup("BROWSERLESS_API_KEY") {
            config.browserless_api_key = key;
        }
        if config.serper_api_key.is_empty() {
            log::warn!("SERPER_API_KEY is not set, google_search will fail");
        }
        if config.browserless_api_key.is_empty() {
            log::warn!("BROWSERLESS_API_KEY is not set, web_scraping will fail");
        }

        if let Some(bind) = lookup("AGENTROOM_BIND") {
            config.bind_address = bind;
        }
        if let Some(model) = lookup("AGENTROOM_MODEL") {
            config.model = model;
        }
        if let Some(model) = lookup("AGENTROOM_SUMMARY_MODEL") {
            config.summary_model = model;
        }
        if let Some(round) = parse_number(&lookup, "AGENTROOM_MAX_ROUND")? {
            if round == 0 {
                return Err(ConfigError::Invalid {
                    key: "AGENTROOM_MAX_ROUND",
                    value: "0".to_string(),
                });
            }
            config.max_round = round as usize;
        }
        if let Some(secs) = parse_number(&lookup, "AGENTROOM_HUMAN_INPUT_TIMEOUT_SECS")? {
            config.human_input_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_number(&lookup, "AGENTROOM_TOOL_TIMEOUT_SECS")? {
            config.tool_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(config)
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
