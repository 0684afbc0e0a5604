//! Agent and group chat event system.
//!
//! Implement [`EventHandler`] to receive real-time notifications about:
//!
//! - **LLM round-trips**: when each agent sends to and receives from its LLM
//! - **Tool operations**: tool call detection, execution outcomes, iteration limits
//! - **Conversation lifecycle**: start, speaker selection, appended messages, human input
//!   requests and termination
//!
//! Both trait methods default to no-ops, so you only override what you care about. A
//! handler registered on a [`GroupChatManager`](crate::group_chat::GroupChatManager) is
//! propagated to every agent in its roster.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentroom::event::{AgentEvent, ChatEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_agent_event(&self, event: &AgentEvent) {
//!         if let AgentEvent::ToolCallDetected { agent_name, tool_name, .. } = event {
//!             println!("{} is calling {}", agent_name, tool_name);
//!         }
//!     }
//!     async fn on_chat_event(&self, event: &ChatEvent) {
//!         println!("chat: {:?}", event);
//!     }
//! }
//! ```

use crate::agentroom::client_wrapper::TokenUsage;
use async_trait::async_trait;

/// Events emitted by an [`Agent`](crate::Agent) during [`send`](crate::Agent::send).
///
/// ```text
/// SendStarted
///   └─ LLMCallStarted { iteration: 1 }
///   └─ LLMCallCompleted { iteration: 1 }
///   └─ (if tool call detected in response)
///       ├─ ToolCallDetected
///       ├─ ToolExecutionCompleted
///       ├─ LLMCallStarted { iteration: 2 }
///       └─ LLMCallCompleted { iteration: 2 }
/// SendCompleted
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    SendStarted {
        agent_id: String,
        agent_name: String,
        /// First 120 characters of the outgoing message.
        message_preview: String,
    },
    LLMCallStarted {
        agent_id: String,
        agent_name: String,
        /// 1-based LLM call counter within one `send()`.
        iteration: usize,
    },
    LLMCallCompleted {
        agent_id: String,
        agent_name: String,
        iteration: usize,
        /// Usage accumulated so far in this `send()`, when the client reports it.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },
    ToolCallDetected {
        agent_id: String,
        agent_name: String,
        tool_name: String,
        parameters: serde_json::Value,
        iteration: usize,
    },
    ToolExecutionCompleted {
        agent_id: String,
        agent_name: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        iteration: usize,
    },
    /// The tool loop hit its cap and the last response was returned as-is.
    ToolMaxIterationsReached { agent_id: String, agent_name: String },
    SendCompleted {
        agent_id: String,
        agent_name: String,
        tokens_used: Option<TokenUsage>,
        tool_calls_made: usize,
        response_length: usize,
    },
}

/// Events emitted by a [`GroupChatManager`](crate::group_chat::GroupChatManager).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Emitted once per `initiate_chat`, after the history policy was applied.
    ConversationStarted {
        chat_name: String,
        initiator: String,
        participant_count: usize,
        history_cleared: bool,
    },
    SpeakerSelected {
        chat_name: String,
        round: usize,
        speaker: String,
    },
    MessageAppended {
        chat_name: String,
        sender: String,
        content_length: usize,
    },
    /// A human participant was selected and its input provider is being asked.
    HumanInputRequested {
        chat_name: String,
        participant: String,
    },
    ConversationTerminated {
        chat_name: String,
        /// Display form of [`TerminationReason`](crate::group_chat::TerminationReason).
        reason: String,
        messages: usize,
    },
}

/// Receiver of agent and chat events. Handlers are shared as `Arc<dyn EventHandler>`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    async fn on_chat_event(&self, _event: &ChatEvent) {}
}

/// Forwards every event to the `log` facade. Lifecycle at `info`, the rest at `debug`.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_agent_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolExecutionCompleted {
                agent_name,
                tool_name,
                success: false,
                error,
                ..
            } => {
                log::warn!(
                    "{} tool '{}' failed: {}",
                    agent_name,
                    tool_name,
                    error.as_deref().unwrap_or("unknown error")
                );
            }
            AgentEvent::ToolMaxIterationsReached { agent_name, .. } => {
                log::warn!("{} reached the tool iteration limit", agent_name);
            }
            other => log::debug!("{:?}", other),
        }
    }

    async fn on_chat_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::ConversationStarted {
                chat_name,
                initiator,
                participant_count,
                ..
            } => log::info!(
                "[{}] conversation started by {} with {} participants",
                chat_name,
                initiator,
                participant_count
            ),
            ChatEvent::ConversationTerminated {
                chat_name,
                reason,
                messages,
            } => log::info!(
                "[{}] conversation ended ({}) after {} messages",
                chat_name,
                reason,
                messages
            ),
            other => log::debug!("{:?}", other),
        }
    }
}
