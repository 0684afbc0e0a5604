//! Agent System
//!
//! An [`Agent`] is an LLM-powered participant with identity, expertise, optional tool access
//! and event observability. Each agent owns an [`LLMSession`], so its view of a group chat is
//! whatever the chat manager has routed into that session.
//!
//! # Tool Loop
//!
//! [`Agent::send`] appends a description of the registered tools to the outgoing message. If
//! the model answers with a fragment of the form
//! `{"tool_call": {"name": "...", "parameters": {...}}}`, the tool is executed and its result
//! is fed back as the next user turn. The loop runs for up to 5 tool calls.
//!
//! ```rust,no_run
//! use agentroom::Agent;
//! use agentroom::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! let agent = Agent::new(
//!     "researcher",
//!     "researcher",
//!     Arc::new(OpenAIClient::new_with_model_string("key", "gpt-4-1106-preview")),
//! )
//! .with_expertise("Finding and verifying facts on the web")
//! .with_instructions("Always cite the urls you used.");
//! ```

use crate::agentroom::client_wrapper::{ClientWrapper, Role, TokenUsage};
use crate::agentroom::event::{AgentEvent, EventHandler};
use crate::agentroom::llm_session::LLMSession;
use crate::agentroom::tool_protocol::ToolRegistry;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_TOOL_ITERATIONS: usize = 5;
const DEFAULT_MAX_TOKENS: usize = 128_000;

#[derive(Debug, Clone)]
struct ToolCall {
    name: String,
    parameters: serde_json::Value,
}

/// Final text of a [`send`](Agent::send) plus usage summed over every LLM round trip.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: String,
    pub tokens_used: Option<TokenUsage>,
    pub tool_calls_made: usize,
}

pub struct Agent {
    /// Stable identifier.
    pub id: String,
    /// Display name; also the sender name of every message this agent contributes.
    pub name: String,
    /// Free-form description of the agent's strengths, embedded into its system prompt.
    pub expertise: Option<String>,

    instructions: String,
    session: LLMSession,
    tool_registry: Arc<RwLock<ToolRegistry>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Agent {
    /// Create an agent with an empty tool registry and a 128k token budget.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        let mut agent = Agent {
            id: id.into(),
            name: name.into(),
            expertise: None,
            instructions: String::new(),
            session: LLMSession::new(client, String::new(), DEFAULT_MAX_TOKENS),
            tool_registry: Arc::new(RwLock::new(ToolRegistry::new())),
            event_handler: None,
        };
        agent.refresh_system_prompt();
        agent
    }

    pub fn with_expertise(mut self, expertise: impl Into<String>) -> Self {
        self.expertise = Some(expertise.into());
        self.refresh_system_prompt();
        self
    }

    /// Base instructions placed after the identity lines of the system prompt.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self.refresh_system_prompt();
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tool_registry = Arc::new(RwLock::new(registry));
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set or replace the event handler on a live agent; used by the chat manager to
    /// propagate its own handler.
    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_agent_event(&event).await;
        }
    }

    pub fn session_history_len(&self) -> usize {
        self.session.get_conversation_history().len()
    }

    /// Forget everything said so far; identity and tools are kept.
    pub fn clear_history(&mut self) {
        self.session.clear_history();
    }

    pub fn system_prompt(&self) -> &str {
        self.session.system_prompt()
    }

    pub async fn list_tools(&self) -> Vec<String> {
        let registry = self.tool_registry.read().await;
        registry.list_tools().iter().map(|m| m.name.clone()).collect()
    }

    /// Send a message through the agent's own session and run the tool loop.
    ///
    /// Emits, in order: `SendStarted`, then `LLMCallStarted`/`LLMCallCompleted` per round
    /// trip with `ToolCallDetected`/`ToolExecutionCompleted` in between, optionally
    /// `ToolMaxIterationsReached`, and finally `SendCompleted`.
    pub async fn send(
        &mut self,
        user_message: &str,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>> {
        self.emit(AgentEvent::SendStarted {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            message_preview: user_message.chars().take(120).collect(),
        })
        .await;

        let mut message_with_tools = user_message.to_string();
        {
            let registry = self.tool_registry.read().await;
            let tools = registry.list_tools();
            if !tools.is_empty() {
                message_with_tools.push_str("\n\nYou have access to the following tools:\n");
                for tool_metadata in tools {
                    message_with_tools.push_str(&format!(
                        "- {}: {}\n",
                        tool_metadata.name, tool_metadata.description
                    ));
                    if !tool_metadata.parameters.is_empty() {
                        message_with_tools.push_str("  Parameters:\n");
                        for param in &tool_metadata.parameters {
                            message_with_tools.push_str(&format!(
                                "    - {} ({:?}): {}\n",
                                param.name,
                                param.param_type,
                                param.description.as_deref().unwrap_or("No description")
                            ));
                        }
                    }
                }
                message_with_tools.push_str(
                    "\nTo use a tool, respond with a JSON object in the following format:\n\
                     {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                     After tool execution, I'll provide the result and you can continue.\n",
                );
            }
        }

        let mut usage = TokenUsage::default();
        let mut tool_iteration = 0;
        let mut current_response = self.call_llm(message_with_tools, 1, &mut usage).await?;

        while let Some(tool_call) = parse_tool_call(&current_response) {
            if tool_iteration >= MAX_TOOL_ITERATIONS {
                self.emit(AgentEvent::ToolMaxIterationsReached {
                    agent_id: self.id.clone(),
                    agent_name: self.name.clone(),
                })
                .await;
                current_response = format!(
                    "{}\n\n[Warning: Maximum tool iterations reached]",
                    current_response
                );
                break;
            }
            tool_iteration += 1;

            self.emit(AgentEvent::ToolCallDetected {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                tool_name: tool_call.name.clone(),
                parameters: tool_call.parameters.clone(),
                iteration: tool_iteration,
            })
            .await;

            let tool_result = {
                let registry = self.tool_registry.read().await;
                registry
                    .execute_tool(&tool_call.name, tool_call.parameters)
                    .await
            };

            let (tool_result_message, error) = match tool_result {
                Ok(result) if result.success => (
                    format!(
                        "Tool '{}' executed successfully. Result: {}",
                        tool_call.name,
                        render_output(&result.output)
                    ),
                    None,
                ),
                Ok(result) => {
                    let err = result
                        .error
                        .unwrap_or_else(|| "Unknown error".to_string());
                    (
                        format!("Tool '{}' failed. Error: {}", tool_call.name, err),
                        Some(err),
                    )
                }
                Err(e) => (format!("Tool execution error: {}", e), Some(e.to_string())),
            };

            self.emit(AgentEvent::ToolExecutionCompleted {
                agent_id: self.id.clone(),
                agent_name: self.name.clone(),
                tool_name: tool_call.name.clone(),
                success: error.is_none(),
                error,
                iteration: tool_iteration,
            })
            .await;

            current_response = self
                .call_llm(tool_result_message, tool_iteration + 1, &mut usage)
                .await?;
        }

        let tokens_used = if usage.total_tokens > 0 {
            Some(usage)
        } else {
            None
        };
        self.emit(AgentEvent::SendCompleted {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            tokens_used: tokens_used.clone(),
            tool_calls_made: tool_iteration,
            response_length: current_response.len(),
        })
        .await;

        Ok(AgentResponse {
            content: current_response,
            tokens_used,
            tool_calls_made: tool_iteration,
        })
    }

    async fn call_llm(
        &mut self,
        content: String,
        iteration: usize,
        usage: &mut TokenUsage,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.emit(AgentEvent::LLMCallStarted {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            iteration,
        })
        .await;

        let response = self.session.send_message(Role::User, content).await?;

        if let Some(last) = self.session.client().get_last_usage().await {
            usage.input_tokens += last.input_tokens;
            usage.output_tokens += last.output_tokens;
            usage.total_tokens += last.total_tokens;
        }

        self.emit(AgentEvent::LLMCallCompleted {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            iteration,
            tokens_used: if usage.total_tokens > 0 {
                Some(usage.clone())
            } else {
                None
            },
            response_length: response.content.len(),
        })
        .await;

        Ok(response.content.to_string())
    }

    fn refresh_system_prompt(&mut self) {
        let prompt = self.augment_system_prompt(&self.instructions);
        self.session.set_system_prompt(prompt);
    }

    /// Identity line, then expertise, then the agent's own instructions.
    fn augment_system_prompt(&self, base_prompt: &str) -> String {
        let mut prompt = format!("You are {}.\n", self.name);

        if let Some(expertise) = &self.expertise {
            prompt.push_str(&format!("Your expertise: {}\n", expertise));
        }

        if !base_prompt.is_empty() {
            prompt.push('\n');
            prompt.push_str(base_prompt);
        }

        prompt
    }
}

fn render_output(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Find the first `{"tool_call": {...}}` fragment in a response, matching braces so that
/// surrounding prose is ignored.
fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start_idx = response.find("{\"tool_call\"")?;
    let mut depth = 0usize;
    let mut end_idx = None;
    for (offset, ch) in response[start_idx..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end_idx = Some(start_idx + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let parsed: serde_json::Value = serde_json::from_str(&response[start_idx..end_idx?]).ok()?;
    let tool_call_obj = parsed.get("tool_call")?;
    let name = tool_call_obj.get("name")?.as_str()?;
    let parameters = tool_call_obj.get("parameters")?;
    Some(ToolCall {
        name: name.to_string(),
        parameters: parameters.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentroom::client_wrapper::Message;
    use crate::agentroom::tool_protocol::{Tool, ToolMetadata, ToolProtocol, ToolResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoClient;

    #[async_trait]
    impl ClientWrapper for EchoClient {
        async fn send_message(
            &self,
            messages: &[Message],
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            let last = messages.last().map(|m| m.content.to_string()).unwrap_or_default();
            Ok(Message::new(Role::Assistant, last))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    /// Asks for a search once, then answers with whatever the tool returned.
    struct SearchingClient {
        turns: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClientWrapper for SearchingClient {
        async fn send_message(
            &self,
            messages: &[Message],
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            let last = messages.last().map(|m| m.content.to_string()).unwrap_or_default();
            let mut turns = self.turns.lock().unwrap();
            turns.push(last.clone());
            let reply = if turns.len() == 1 {
                r#"Let me check. {"tool_call": {"name": "google_search", "parameters": {"search_keyword": "tokio"}}}"#.to_string()
            } else {
                format!("Found it: {}", last)
            };
            Ok(Message::new(Role::Assistant, reply))
        }

        fn model_name(&self) -> &str {
            "searching"
        }
    }

    struct CannedSearch;

    #[async_trait]
    impl ToolProtocol for CannedSearch {
        async fn execute(
            &self,
            _tool_name: &str,
            parameters: serde_json::Value,
        ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
            Ok(ToolResult::success(serde_json::json!(format!(
                "results for {}",
                parameters["search_keyword"].as_str().unwrap_or_default()
            ))))
        }

        async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
            Ok(vec![ToolMetadata::new("google_search", "search the web")])
        }

        fn protocol_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_system_prompt_layout() {
        let agent = Agent::new("researcher", "researcher", Arc::new(EchoClient))
            .with_expertise("Finding facts on the web")
            .with_instructions("Cite every url.");

        assert_eq!(agent.expertise.as_deref(), Some("Finding facts on the web"));
        let prompt = agent.system_prompt();
        assert!(prompt.starts_with("You are researcher.\n"));
        assert!(prompt.contains("Your expertise: Finding facts on the web"));
        assert!(prompt.ends_with("Cite every url."));
    }

    #[test]
    fn test_parse_tool_call_inside_prose() {
        let response = "Sure, let me look. {\"tool_call\": {\"name\": \"google_search\", \
                        \"parameters\": {\"search_keyword\": \"rust {async}\"}}} then more text";
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.name, "google_search");
        assert_eq!(call.parameters["search_keyword"], "rust {async}");
    }

    #[test]
    fn test_parse_tool_call_rejects_malformed() {
        assert!(parse_tool_call("no tools here").is_none());
        assert!(parse_tool_call("{\"tool_call\": {\"name\": 3}}").is_none());
        assert!(parse_tool_call("{\"tool_call\": {\"name\": \"x\"").is_none());
    }

    #[tokio::test]
    async fn test_send_without_tools_is_single_round_trip() {
        let mut agent = Agent::new("a", "a", Arc::new(EchoClient));
        let response = agent.send("hello").await.unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(response.tool_calls_made, 0);
        assert_eq!(agent.session_history_len(), 2);

        agent.clear_history();
        assert_eq!(agent.session_history_len(), 0);
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back_to_the_model() {
        let protocol: Arc<dyn ToolProtocol> = Arc::new(CannedSearch);
        let mut registry = ToolRegistry::new();
        for metadata in protocol.list_tools().await.unwrap() {
            registry.add_tool(Tool::from_metadata(metadata, Arc::clone(&protocol)));
        }
        let client = Arc::new(SearchingClient {
            turns: Mutex::new(Vec::new()),
        });
        let mut agent = Agent::new("researcher", "researcher", client.clone()).with_tools(registry);
        assert_eq!(agent.list_tools().await, vec!["google_search".to_string()]);

        let response = agent.send("what is tokio?").await.unwrap();

        assert_eq!(response.tool_calls_made, 1);
        assert_eq!(
            response.content,
            "Found it: Tool 'google_search' executed successfully. Result: results for tokio"
        );
        let turns = client.turns.lock().unwrap();
        assert!(turns[0].starts_with("what is tokio?\n\nYou have access to the following tools:"));
        assert!(turns[0].contains("- google_search: search the web"));
    }
}
