//! Bridges a [`GroupChatManager`](crate::agentroom::group_chat::GroupChatManager) to a
//! [`ChatSession`].
//!
//! The [`Relay`] is registered on the manager by composition: as a [`DispatchHook`] it pushes
//! every transcript record to the client as `"<sender>: <content>"`, and as a
//! [`HumanInputProvider`] it turns a human turn into a `"system: <prompt>"` frame followed by a
//! blocking receive. Without an attached session both roles are inert, which keeps the manager
//! usable headless.

use std::error::Error;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::agentroom::group_chat::{ChatError, Dispatch, DispatchHook, HumanInputProvider};
use crate::agentroom::session::{ChatSession, RelayState};
use crate::agentroom::transport::TransportError;

pub use crate::agentroom::session::RelayError;

/// Prefix of every human-input prompt frame.
pub const SYSTEM_PREFIX: &str = "system: ";

/// Render a transcript record as one outbound frame.
pub fn format_frame(sender_name: &str, content: &str) -> String {
    format!("{}: {}", sender_name, content)
}

/// Bridges a [`GroupChatManager`](crate::agentroom::group_chat::GroupChatManager) to one
/// connected client.
///
/// As a [`DispatchHook`] it forwards every transcript record to the client as a
/// `sender: content` frame. As a [`HumanInputProvider`] it sends a `system: ` prompt and
/// returns the client's next frame verbatim. The session can be swapped with
/// [`Relay::attach`] when the client reconnects.
pub struct Relay {
    session: RwLock<Option<Arc<ChatSession>>>,
    input_timeout: Option<Duration>,
}

impl Relay {
    pub fn new(session: Arc<ChatSession>) -> Self {
        Self {
            session: RwLock::new(Some(session)),
            input_timeout: None,
        }
    }

    /// A relay with no session; dispatches are dropped and human input fails with `NoSession`.
    pub fn detached() -> Self {
        Self {
            session: RwLock::new(None),
            input_timeout: None,
        }
    }

    /// Give up waiting for human input after `timeout`. `None` waits until the connection
    /// closes.
    pub fn with_input_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.input_timeout = timeout;
        self
    }

    pub fn attach(&self, session: Arc<ChatSession>) {
        *self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(session);
    }

    pub fn detach(&self) -> Option<Arc<ChatSession>> {
        self.session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn session(&self) -> Option<Arc<ChatSession>> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl DispatchHook for Relay {
    async fn on_dispatch(&self, dispatch: &Dispatch) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Dispatch::Record(message) = dispatch else {
            return Ok(());
        };
        let Some(session) = self.session() else {
            return Ok(());
        };
        match session.state() {
            RelayState::Terminated => return Ok(()),
            RelayState::Closed => return Err(Box::new(RelayError::ConnectionClosed)),
            _ => {}
        }
        if message.sender_name.trim().is_empty() {
            log::warn!(
                "session {}: not forwarding a record without a sender name",
                session.id()
            );
            return Ok(());
        }

        session
            .send(format_frame(&message.sender_name, &message.content))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HumanInputProvider for Relay {
    async fn get_human_input(&self, prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let session = self.session().ok_or(RelayError::NoSession)?;
        match session.state() {
            RelayState::Terminated => return Err(Box::new(RelayError::Terminated)),
            RelayState::Closed => return Err(Box::new(RelayError::ConnectionClosed)),
            _ => {}
        }

        let reply = session
            .request_input(format!("{}{}", SYSTEM_PREFIX, prompt), self.input_timeout)
            .await;
        match reply {
            Ok(text) => Ok(text),
            Err(e) => {
                log::info!("session {}: human input failed: {}", session.id(), e);
                Err(Box::new(e))
            }
        }
    }
}

/// Whether a conversation failed because the client went away.
pub fn is_disconnect(err: &ChatError) -> bool {
    let source = match err {
        ChatError::HumanInput(e) | ChatError::Dispatch(e) => e.as_ref(),
        _ => return false,
    };
    matches!(
        source.downcast_ref::<RelayError>(),
        Some(RelayError::ConnectionClosed)
    ) || matches!(
        source.downcast_ref::<TransportError>(),
        Some(TransportError::ConnectionClosed)
    )
}
