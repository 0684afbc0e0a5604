mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use agentroom::client_wrapper::{ClientWrapper, Message, Role};
use agentroom::group_chat::{ChatError, GroupChatManager};
use agentroom::server::{router, serve_session, AppState, RelayOptions, RoomFactory};
use agentroom::transport::{MemoryPeer, MemoryTransport};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use common::{agent, prompt_frame, room_with_human};

const WAIT: Duration = Duration::from_secs(2);

async fn next_frame(peer: &mut MemoryPeer) -> String {
    tokio::time::timeout(WAIT, peer.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
}

fn options(timeout: Option<Duration>) -> RelayOptions {
    RelayOptions {
        initiator: "user_proxy".to_string(),
        clear_history: true,
        human_input_timeout: timeout,
    }
}

fn director_room() -> RoomFactory {
    Arc::new(|| -> Result<GroupChatManager, ChatError> { Ok(room_with_human(&["director"], 10)) })
}

fn spawn_session(state: &AppState) -> (tokio::task::JoinHandle<()>, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let state = state.clone();
    let task = tokio::spawn(async move { serve_session(Arc::new(transport), &state).await });
    (task, peer)
}

struct SlowClient;

#[async_trait]
impl ClientWrapper for SlowClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Message::new(Role::Assistant, "finally"))
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn test_session_runs_conversations_until_disconnect() {
    let state = AppState::new(director_room(), options(None));
    let (task, mut client) = spawn_session(&state);

    assert!(client.send("hello"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: hello");
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(next_frame(&mut client).await, "director: reply from director");
    assert_eq!(next_frame(&mut client).await, prompt_frame("room"));

    // exit ends this conversation; the session goes back to idle and takes a new request
    assert!(client.send("exit"));
    assert!(client.send("again"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: again");
    assert_eq!(next_frame(&mut client).await, "director: reply from director");
    assert_eq!(next_frame(&mut client).await, prompt_frame("room"));

    client.disconnect();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_human_input_timeout_returns_to_idle() {
    let state = AppState::new(director_room(), options(Some(Duration::from_millis(50))));
    let (task, mut client) = spawn_session(&state);

    assert!(client.send("hello"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: hello");
    assert_eq!(next_frame(&mut client).await, "director: reply from director");
    assert_eq!(next_frame(&mut client).await, prompt_frame("room"));

    let notice = next_frame(&mut client).await;
    assert_eq!(
        notice,
        "system: conversation ended: human input failed: no human input within 50ms"
    );

    assert!(client.send("second try"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: second try");

    client.disconnect();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disconnect_cancels_a_running_conversation() {
    let factory: RoomFactory = Arc::new(|| -> Result<GroupChatManager, ChatError> {
        let mut room = room_with_human(&[], 10);
        room.add_participant(agent("director", Arc::new(SlowClient)))?;
        Ok(room)
    });
    let state = AppState::new(factory, options(None));
    let (task, mut client) = spawn_session(&state);

    assert!(client.send("hello"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: hello");
    client.disconnect();

    // the slow agent call is dropped instead of awaited
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_factory_failure_is_reported_to_the_client() {
    let factory: RoomFactory = Arc::new(|| -> Result<GroupChatManager, ChatError> { Err(ChatError::NoParticipants) });
    let state = AppState::new(factory, options(None));
    let (task, mut client) = spawn_session(&state);

    assert_eq!(
        next_frame(&mut client).await,
        "system: could not start the chat room: group chat has no participants"
    );
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(client.is_closed());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_blank_requests_are_ignored() {
    let state = AppState::new(director_room(), options(None));
    let (task, mut client) = spawn_session(&state);

    assert!(client.send("   "));
    assert!(client.send("real question"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: real question");

    client.disconnect();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_index_serves_chat_page() {
    let app = router(AppState::new(director_room(), options(None)));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("new WebSocket"));
}

#[tokio::test]
async fn test_plain_get_on_ws_is_rejected() {
    let app = router(AppState::new(director_room(), options(None)));

    let response = app
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(!response.status().is_success());
}

async fn next_text<S>(ws: &mut S) -> String
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = frame {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn test_websocket_end_to_end() {
    let state = AppState::new(director_room(), options(None));
    let sessions = Arc::clone(&state.sessions);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    ws.send(WsMessage::Text("plan a trip".into())).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "user_proxy: plan a trip");
    assert_eq!(next_text(&mut ws).await, "director: reply from director");
    assert_eq!(next_text(&mut ws).await, prompt_frame("room"));
    assert_eq!(sessions.len(), 1);

    ws.send(WsMessage::Text("exit".into())).await.unwrap();
    ws.close(None).await.unwrap();

    tokio::time::timeout(WAIT, async {
        while !sessions.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
