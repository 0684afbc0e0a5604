//! # agentroom
//!
//! agentroom puts one person in a websocket chat room with a team of LLM agents that research
//! a question together. The crate provides layered abstractions for:
//!
//! * **Agents with Tools**: [`Agent`] wraps an [`LLMSession`] with identity, expertise and a
//!   [`tool_protocol::ToolRegistry`]; the bundled [`tool_protocols::WebResearchProtocol`]
//!   gives agents `google_search` and `web_scraping`.
//! * **Group Chat**: [`group_chat::GroupChatManager`] runs a conversation among agents and a
//!   human seat, with pluggable speaker selection (round robin or LLM-driven), a termination
//!   predicate, a `max_round` bound and a per-conversation history policy.
//! * **Real-time Relay**: [`relay::Relay`] forwards every transcript record to the browser as
//!   `"<sender>: <content>"` and turns human turns into a `"system: <prompt>"` frame followed by
//!   a blocking, cancellable receive on the connection's [`session::ChatSession`].
//! * **Server**: [`server::router`] serves the chat page and the `/ws` endpoint, one session and
//!   one room per connection.
//!
//! ## Data flow
//!
//! ```text
//! browser ──ws text──▶ ChatSession ──▶ GroupChatManager::initiate_chat
//!    ▲                     ▲                │ next_speaker / agent.send (tools)
//!    │                     │                ▼
//!    └──"name: content"── Relay ◀── on_dispatch(record) / get_human_input(prompt)
//! ```
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use agentroom::config::AgentRoomConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     agentroom::init_logger();
//!
//!     let config = AgentRoomConfig::from_env()?;
//!     agentroom::server::serve(config).await
//! }
//! ```
//!
//! Headless use works too: a [`group_chat::GroupChatManager`] without a relay runs entirely in
//! process, with human seats answered by any [`group_chat::HumanInputProvider`].

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// ```rust
/// agentroom::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agentroom` module.
pub mod agentroom;

// Re-exporting key items for easier external access.
pub use agentroom::agent::Agent;
pub use agentroom::client_wrapper;
pub use agentroom::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use agentroom::clients;
pub use agentroom::config;
pub use agentroom::config::AgentRoomConfig;
pub use agentroom::event;
pub use agentroom::event::{AgentEvent, ChatEvent, EventHandler};
pub use agentroom::group_chat;
pub use agentroom::group_chat::{ChatMessage, GroupChatManager};
pub use agentroom::llm_session::LLMSession;
pub use agentroom::relay;
pub use agentroom::server;
pub use agentroom::session;
pub use agentroom::team;
pub use agentroom::tool_protocol;
pub use agentroom::tool_protocols;
pub use agentroom::tools;
pub use agentroom::transport;
