// src/agentroom/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod group_chat;
pub mod llm_session;
pub mod relay;
pub mod server;
pub mod session;
pub mod team;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;
pub mod transport;

// Let's explicitly export LLMSession so we don't have to access it via agentroom::llm_session::LLMSession
// and instead as agentroom::LLMSession
pub use llm_session::LLMSession;
