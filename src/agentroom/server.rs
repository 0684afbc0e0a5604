//! HTTP and websocket front end.
//!
//! - `GET /` serves a single self-contained chat page.
//! - `GET /ws` upgrades to a websocket. Each connection gets its own [`ChatSession`], its own
//!   [`Relay`] and a fresh [`GroupChatManager`] from the [`RoomFactory`]; nothing is shared
//!   between connections except the [`SessionRegistry`].
//!
//! Every client frame received while the session is idle starts one conversation. When the
//! socket closes mid-conversation the conversation future is dropped, the session is closed and
//! removed from the registry.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::agentroom::config::AgentRoomConfig;
use crate::agentroom::group_chat::{ChatError, GroupChatManager};
use crate::agentroom::relay::{is_disconnect, Relay, SYSTEM_PREFIX};
use crate::agentroom::session::{ChatSession, RelayState, SessionRegistry};
use crate::agentroom::team::{build_research_room, USER_PROXY};
use crate::agentroom::transport::{Transport, WebSocketTransport};

/// Builds one independent room per connection.
pub type RoomFactory = Arc<dyn Fn() -> Result<GroupChatManager, ChatError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Participant credited with the client's opening message.
    pub initiator: String,
    pub clear_history: bool,
    pub human_input_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            initiator: USER_PROXY.to_string(),
            clear_history: true,
            human_input_timeout: None,
        }
    }
}

impl From<&AgentRoomConfig> for RelayOptions {
    fn from(config: &AgentRoomConfig) -> Self {
        Self {
            initiator: USER_PROXY.to_string(),
            clear_history: config.clear_history,
            human_input_timeout: config.human_input_timeout,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    factory: RoomFactory,
    options: RelayOptions,
}

impl AppState {
    pub fn new(factory: RoomFactory, options: RelayOptions) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            factory,
            options,
        }
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| log::error!("websocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(socket));
            serve_session(transport, &state).await;
        })
}

/// Drive one connection until it closes: wait for client text, run a conversation, repeat.
///
/// Never returns an error; every failure is logged and either ends the connection or sends the
/// client a `system:` notice and goes back to idle.
pub async fn serve_session(transport: Arc<dyn Transport>, state: &AppState) {
    let session = state.sessions.open(transport);
    log::info!(
        "session {} connected ({} active)",
        session.id(),
        state.sessions.len()
    );

    match (state.factory)() {
        Ok(manager) => run_conversations(&session, manager, state).await,
        Err(e) => {
            log::error!("session {}: could not build the chat room: {}", session.id(), e);
            let _ = session
                .send(format!("{}could not start the chat room: {}", SYSTEM_PREFIX, e))
                .await;
        }
    }

    session.close().await;
    state.sessions.remove(&session.id());
    log::info!(
        "session {} closed ({} active)",
        session.id(),
        state.sessions.len()
    );
}

async fn run_conversations(
    session: &Arc<ChatSession>,
    mut manager: GroupChatManager,
    state: &AppState,
) {
    let options = &state.options;
    let relay = Arc::new(
        Relay::new(Arc::clone(session)).with_input_timeout(options.human_input_timeout),
    );
    manager.attach_relay(relay);

    loop {
        session.set_state(RelayState::Idle);
        let request = match session.receive(None).await {
            Ok(text) => text,
            Err(e) => {
                log::debug!("session {}: receive while idle ended: {}", session.id(), e);
                break;
            }
        };
        if request.trim().is_empty() {
            continue;
        }

        session.set_state(RelayState::ConversationActive);
        let result = tokio::select! {
            _ = session.closed() => None,
            outcome = manager.initiate_chat(&options.initiator, &request, options.clear_history) => Some(outcome),
        };
        session.set_state(RelayState::Terminated);

        match result {
            None => {
                log::info!("session {}: client left mid-conversation", session.id());
                break;
            }
            Some(Ok(outcome)) => {
                log::info!(
                    "session {}: conversation ended after {} messages ({})",
                    session.id(),
                    outcome.messages.len(),
                    outcome.termination
                );
            }
            Some(Err(e)) if is_disconnect(&e) || session.is_closed() => {
                log::info!("session {}: conversation aborted: {}", session.id(), e);
                break;
            }
            Some(Err(e)) => {
                log::error!("session {}: conversation failed: {}", session.id(), e);
                let notice = format!("{}conversation ended: {}", SYSTEM_PREFIX, e);
                if session.send(notice).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Bind `config.bind_address` and serve the research room until ctrl-c.
pub async fn serve(config: AgentRoomConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let options = RelayOptions::from(&config);
    let room_config = config.clone();
    let factory: RoomFactory = Arc::new(move || build_research_room(&room_config));
    let state = AppState::new(factory, options);

    let listener = TcpListener::bind(&config.bind_address).await?;
    log::info!("agentroom listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>agentroom</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; display: flex; flex-direction: column; height: 100vh; }
  #messages { flex: 1; overflow-y: auto; padding: 1rem; }
  .message { margin: 0 0 .75rem; white-space: pre-wrap; }
  .sender { font-weight: 600; margin-right: .5rem; }
  .system { color: #8a5a00; }
  form { display: flex; gap: .5rem; padding: 1rem; border-top: 1px solid #ddd; }
  input { flex: 1; padding: .5rem; }
</style>
</head>
<body>
<div id="messages"></div>
<form id="form">
  <input id="text" autocomplete="off" placeholder="Ask the research team...">
  <button>Send</button>
</form>
<script>
  const messages = document.getElementById("messages");
  const proto = location.protocol === "https:" ? "wss://" : "ws://";
  const ws = new WebSocket(proto + location.host + "/ws");

  function append(text) {
    const div = document.createElement("div");
    div.className = "message";
    const split = text.indexOf(": ");
    if (split > 0) {
      const sender = document.createElement("span");
      sender.className = "sender";
      sender.textContent = text.slice(0, split);
      if (sender.textContent === "system") div.classList.add("system");
      div.appendChild(sender);
      div.appendChild(document.createTextNode(text.slice(split + 2)));
    } else {
      div.textContent = text;
    }
    messages.appendChild(div);
    messages.scrollTop = messages.scrollHeight;
  }

  ws.onmessage = (event) => append(event.data);
  ws.onclose = () => append("system: connection closed");
  document.getElementById("form").addEventListener("submit", (event) => {
    event.preventDefault();
    const input = document.getElementById("text");
    if (input.value.length === 0) return;
    ws.send(input.value);
    input.value = "";
  });
</script>
</body>
</html>
"#;
