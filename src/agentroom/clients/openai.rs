//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat API,
//! capturing both the assistant response and token usage for cost tracking.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentroom::clients::openai::OpenAIClient;
//! use agentroom::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let secret_key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_string(&secret_key, "gpt-4-1106-preview");
//!
//!     let resp = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are an assistant."),
//!             Message::new(Role::User, "Hello!"),
//!         ])
//!         .await?;
//!     println!("Assistant: {}", resp.content);
//!
//!     if let Some(usage) = client.get_last_usage().await {
//!         println!("Tokens: {}", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use tokio::sync::Mutex;

use crate::agentroom::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::agentroom::clients::common::{get_shared_http_client, send_and_track};

/// Model used by the research team unless configured otherwise.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4-1106-preview";

/// Model used to condense scraped pages.
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-3.5-turbo-16k-0613";

/// Client wrapper for OpenAI's Chat Completions API.
pub struct OpenAIClient {
    /// Underlying SDK client pointing at the REST endpoint.
    client: openai_rust::Client,
    /// Model name that will be injected into each request.
    model: String,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client(
                secret_key,
                get_shared_http_client().clone(),
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Construct a client targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                base_url,
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let formatted_messages = messages
            .iter()
            .map(|msg| chat::Message {
                role: msg.role.to_string(),
                content: msg.content.to_string(),
            })
            .collect();

        let content = send_and_track(
            &self.client,
            &self.model,
            formatted_messages,
            Some("/v1/chat/completions".to_string()),
            &self.token_usage,
        )
        .await?;

        Ok(Message {
            role: Role::Assistant,
            content: Arc::from(content.as_str()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
