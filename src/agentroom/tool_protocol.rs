//! Tools as agents see them.
//!
//! An [`Agent`](crate::agentroom::agent::Agent) holds a [`ToolRegistry`]. The registry maps a
//! tool name to its [`ToolMetadata`] and to the [`ToolProtocol`] that runs it, so one protocol
//! can serve several tools.
//!
//! ```text
//! Agent → ToolRegistry → Tool → ToolProtocol (trait) → [WebResearchProtocol | user-defined]
//! ```
//!
//! ```rust
//! use agentroom::tool_protocol::{ToolParameter, ToolParameterType};
//!
//! let param = ToolParameter::new("search_keyword", ToolParameterType::String)
//!     .with_description("What to look up")
//!     .required();
//! assert!(param.required);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Outcome of one tool call, rendered back to the agent as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    /// Set when `success` is false.
    pub error: Option<String>,
    /// Call details such as the query or url that was used.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    /// Shown to the agent next to the parameter name in its tool listing.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Name, description and parameters advertised for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// Runs the tools it advertises.
///
/// Failures a model can act on (a bad url, an upstream error) should come back as
/// `Ok(ToolResult::failure(..))`. `Err` is for calls the protocol cannot route at all.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Short identifier used in logs, e.g. "web-research".
    fn protocol_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    NotFound(String),
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// Pull a required string parameter out of a tool call payload.
pub fn required_str<'a>(parameters: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    parameters
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing string parameter '{}'", name)))
}

/// A tool bound to the protocol that executes it.
pub struct Tool {
    metadata: ToolMetadata,
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    pub fn from_metadata(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tool by name.
    pub fn add_tool(&mut self, tool: Tool) {
        log::debug!(
            "registering tool '{}' served by '{}'",
            tool.metadata.name,
            tool.protocol.protocol_name()
        );
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    /// Registered tools sorted by name so prompts are stable.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        let mut tools: Vec<&ToolMetadata> = self.tools.values().map(|t| &t.metadata).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        tool.execute(parameters).await
    }
}
