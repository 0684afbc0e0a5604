//! The `llm_session` module manages a conversational session with an LLM,
//! handling message history, context pruning and token accounting.
//!
//! **Key features:**
//! - **Automatic context trimming**: never exceed your `max_tokens` window.
//! - **Token tracking**: records `input_tokens` & `output_tokens` reported per call.
//! - **Injection**: messages can be added to the history without calling the LLM.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentroom::client_wrapper::Role;
//! use agentroom::clients::openai::OpenAIClient;
//! use agentroom::LLMSession;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = OpenAIClient::new_with_model_string("YOUR_OPENAI_KEY", "gpt-4-1106-preview");
//! let mut session = LLMSession::new(Arc::new(client), "You are a researcher.".into(), 8_192);
//!
//! let reply = session.send_message(Role::User, "What is a websocket?".into()).await?;
//! println!("Assistant: {}", reply.content);
//! println!("Total tokens: {}", session.token_usage().total_tokens);
//! # Ok(())
//! # }
//! ```

use crate::agentroom::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use std::error::Error;
use std::sync::Arc;

/// A conversation session with an LLM, including:
///
/// - `client`: your `ClientWrapper` (e.g. `OpenAIClient`).
/// - `system_prompt`: the context-steering system message.
/// - `conversation_history`: all user & assistant messages (excluding system prompt).
/// - `max_tokens`: your configured context window size.
pub struct LLMSession {
    client: Arc<dyn ClientWrapper>,
    system_prompt: Message,
    conversation_history: Vec<Message>,
    max_tokens: usize,
    total_input_tokens: usize,
    total_output_tokens: usize,
    total_token_count: usize,
}

impl LLMSession {
    /// Creates a new `LLMSession` with the given client and system prompt.
    pub fn new(client: Arc<dyn ClientWrapper>, system_prompt: String, max_tokens: usize) -> Self {
        LLMSession {
            client,
            system_prompt: Message::new(Role::System, system_prompt),
            conversation_history: Vec::new(),
            max_tokens,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_token_count: 0,
        }
    }

    /// Sends a message, receives the assistant's reply, and automatically:
    /// 1. Adds the message to history and prepends the system prompt for the request
    /// 2. Pulls real token usage via `client.get_last_usage()`
    /// 3. Prunes oldest messages if the reported total exceeds `max_tokens`
    /// 4. Appends the reply to history
    pub async fn send_message(
        &mut self,
        role: Role,
        content: String,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.conversation_history.push(Message::new(role, content));

        let mut request = Vec::with_capacity(self.conversation_history.len() + 1);
        request.push(self.system_prompt.clone());
        request.extend(self.conversation_history.iter().cloned());

        let response = self.client.send_message(&request).await?;

        if let Some(usage) = self.client.get_last_usage().await {
            self.total_input_tokens = usage.input_tokens;
            self.total_output_tokens = usage.output_tokens;
            self.total_token_count = usage.total_tokens;

            if self.total_token_count > self.max_tokens {
                let excess = self.total_token_count - self.max_tokens;
                self.trim_history(excess);
            }
        }

        self.conversation_history.push(response.clone());
        Ok(response)
    }

    /// Append a message to the history without calling the LLM.
    pub fn inject_message(&mut self, role: Role, content: String) {
        self.conversation_history.push(Message::new(role, content));
    }

    /// Sets a new system prompt for the session.
    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Message::new(Role::System, prompt);
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt.content
    }

    /// Drop the whole history and reset token counters; the system prompt stays.
    pub fn clear_history(&mut self) {
        self.conversation_history.clear();
        self.total_input_tokens = 0;
        self.total_output_tokens = 0;
        self.total_token_count = 0;
    }

    pub fn get_conversation_history(&self) -> &[Message] {
        &self.conversation_history
    }

    /// Returns the current token usage statistics
    pub fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            total_tokens: self.total_token_count,
        }
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    /// Remove the oldest messages until at least `excess` estimated tokens are gone.
    /// The newest message is always kept.
    fn trim_history(&mut self, mut excess: usize) {
        while excess > 0 && self.conversation_history.len() > 1 {
            let msg = self.conversation_history.remove(0);
            excess = excess.saturating_sub(estimate_message_token_count(&msg));
        }
    }
}

/// Estimates the number of tokens in a string.
/// Uses an approximate formula: one token per 4 characters.
fn estimate_token_count(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Estimates the number of tokens in a Message, including role annotations.
fn estimate_message_token_count(message: &Message) -> usize {
    1 + estimate_token_count(&message.content)
}
