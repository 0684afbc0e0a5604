//! Per-connection chat sessions and the registry that owns them.
//!
//! A [`ChatSession`] wraps one [`Transport`] with the relay's state machine and guarantees
//! that at most one receive is in flight at any time:
//!
//! ```text
//! Idle ──client text──▶ ConversationActive ──human selected──▶ AwaitingHumanInput
//!  ▲                        │      ▲                               │        │
//!  │                        │      └────────── client text ────────┘        │
//!  └── history policy ── Terminated ◀── condition / max_round    disconnect ─┴─▶ Closed
//! ```

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agentroom::transport::{Transport, TransportError};

/// Where a session is in its conversation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    ConversationActive,
    AwaitingHumanInput,
    Terminated,
    /// The connection is gone; no further sends or receives happen on this session.
    Closed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Idle => "idle",
            RelayState::ConversationActive => "conversation_active",
            RelayState::AwaitingHumanInput => "awaiting_human_input",
            RelayState::Terminated => "terminated",
            RelayState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while relaying frames between the room and the connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The client went away, or the session was closed locally.
    ConnectionClosed,
    /// The transport failed for a reason other than a clean close.
    Connection(String),
    /// Another receive is already waiting on this session.
    ReceiveInFlight,
    /// The client did not answer a prompt within the configured limit.
    HumanInputTimeout(Duration),
    /// Human input was requested while no session is attached.
    NoSession,
    /// The conversation already ended.
    Terminated,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::ConnectionClosed => write!(f, "connection closed"),
            RelayError::Connection(msg) => write!(f, "connection error: {}", msg),
            RelayError::ReceiveInFlight => {
                write!(f, "a receive is already outstanding on this session")
            }
            RelayError::HumanInputTimeout(limit) => {
                write!(f, "no human input within {:?}", limit)
            }
            RelayError::NoSession => write!(f, "no session attached"),
            RelayError::Terminated => write!(f, "conversation already terminated"),
        }
    }
}

impl Error for RelayError {}

impl From<TransportError> for RelayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => RelayError::ConnectionClosed,
            TransportError::Connection(msg) => RelayError::Connection(msg),
        }
    }
}

/// One connected client.
///
/// Owns the transport for that connection, tracks the [`RelayState`] of the conversation
/// running on it, and allows a single outstanding receive. The session notices a disconnect
/// through the transport's closed token, so waiters wake up even if no frame ever arrives.
pub struct ChatSession {
    id: Uuid,
    transport: Arc<dyn Transport>,
    state: Mutex<RelayState>,
    cancel: CancellationToken,
    receive_guard: tokio::sync::Mutex<()>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let cancel = transport.closed_token();
        Self {
            id: Uuid::new_v4(),
            transport,
            state: Mutex::new(RelayState::Idle),
            cancel,
            receive_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RelayState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next`. A closed session stays closed.
    pub fn set_state(&self, next: RelayState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state == RelayState::Closed || *state == next {
            return;
        }
        log::debug!("session {}: {} -> {}", self.id, *state, next);
        *state = next;
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection is gone.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    fn mark_closed(&self) {
        self.set_state(RelayState::Closed);
        self.cancel.cancel();
    }

    /// Write one frame.
    pub async fn send(&self, text: String) -> Result<(), RelayError> {
        if self.is_closed() {
            self.mark_closed();
            return Err(RelayError::ConnectionClosed);
        }
        match self.transport.send_text(text).await {
            Ok(()) => Ok(()),
            Err(TransportError::ConnectionClosed) => {
                self.mark_closed();
                Err(RelayError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the next client frame. Fails with `ReceiveInFlight` instead of queueing
    /// behind a receive that is already outstanding.
    pub async fn receive(&self, timeout: Option<Duration>) -> Result<String, RelayError> {
        let _guard = self
            .receive_guard
            .try_lock()
            .map_err(|_| RelayError::ReceiveInFlight)?;
        self.receive_unguarded(timeout).await
    }

    /// Send `prompt_frame`, then wait for the reply. The receive slot is claimed before the
    /// prompt goes out, so two prompts can never both be waiting for an answer.
    ///
    /// The session is `AwaitingHumanInput` only while the slot is held and returns to
    /// `ConversationActive` afterwards, whether or not a reply arrived. A closed session stays
    /// closed. A caller rejected with `ReceiveInFlight` leaves the state untouched.
    pub async fn request_input(
        &self,
        prompt_frame: String,
        timeout: Option<Duration>,
    ) -> Result<String, RelayError> {
        let _guard = self
            .receive_guard
            .try_lock()
            .map_err(|_| RelayError::ReceiveInFlight)?;
        self.set_state(RelayState::AwaitingHumanInput);
        let result = match self.send(prompt_frame).await {
            Ok(()) => self.receive_unguarded(timeout).await,
            Err(e) => Err(e),
        };
        self.set_state(RelayState::ConversationActive);
        result
    }

    async fn receive_unguarded(&self, timeout: Option<Duration>) -> Result<String, RelayError> {
        let receive = self.transport.receive_text();
        let result = match timeout {
            Some(limit) => tokio::select! {
                biased;
                received = tokio::time::timeout(limit, receive) => match received {
                    Ok(frame) => frame.map_err(RelayError::from),
                    Err(_) => Err(RelayError::HumanInputTimeout(limit)),
                },
                _ = self.cancel.cancelled() => Err(RelayError::ConnectionClosed),
            },
            None => tokio::select! {
                biased;
                frame = receive => frame.map_err(RelayError::from),
                _ = self.cancel.cancelled() => Err(RelayError::ConnectionClosed),
            },
        };
        if result == Err(RelayError::ConnectionClosed) {
            self.mark_closed();
        }
        result
    }

    /// Close the underlying transport and wake everything waiting on it.
    pub async fn close(&self) {
        self.mark_closed();
        self.transport.close().await;
    }
}

/// Live sessions keyed by connection identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<ChatSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a freshly accepted connection and register it.
    pub fn open(&self, transport: Arc<dyn Transport>) -> Arc<ChatSession> {
        let session = Arc::new(ChatSession::new(transport));
        self.sessions.insert(session.id(), Arc::clone(&session));
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<ChatSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<ChatSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
