mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentroom::group_chat::{ChatMessage, Dispatch, DispatchHook, HumanInputProvider, TerminationReason};
use agentroom::relay::{Relay, RelayError};
use agentroom::session::{ChatSession, RelayState, SessionRegistry};
use agentroom::transport::{MemoryPeer, MemoryTransport, Transport, TransportError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use common::{prompt_frame, room_with_human};

const WAIT: Duration = Duration::from_secs(2);

async fn next_frame(peer: &mut MemoryPeer) -> String {
    tokio::time::timeout(WAIT, peer.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
}

fn session_pair() -> (Arc<ChatSession>, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    (Arc::new(ChatSession::new(Arc::new(transport))), peer)
}

#[tokio::test]
async fn test_agent_messages_are_forwarded_in_order_before_the_prompt() {
    let (session, mut client) = session_pair();
    let mut room = room_with_human(&["director", "researcher", "research_manager"], 10);
    room.attach_relay(Arc::new(Relay::new(Arc::clone(&session))));

    let chat = tokio::spawn(async move { room.initiate_chat("user_proxy", "find rust jobs", true).await });

    assert_eq!(next_frame(&mut client).await, "user_proxy: find rust jobs");
    assert_eq!(next_frame(&mut client).await, "director: reply from director");
    assert_eq!(next_frame(&mut client).await, "researcher: reply from researcher");
    assert_eq!(
        next_frame(&mut client).await,
        "research_manager: reply from research_manager"
    );
    assert_eq!(next_frame(&mut client).await, prompt_frame("room"));

    assert!(client.send("exit"));
    let outcome = chat.await.unwrap().unwrap();
    assert_eq!(outcome.termination, TerminationReason::HumanExit);
    assert_eq!(outcome.messages.len(), 4);
}

#[tokio::test]
async fn test_prompt_is_one_system_frame_and_reply_is_verbatim() {
    let (session, mut client) = session_pair();
    let relay = Arc::new(Relay::new(Arc::clone(&session)));

    let asking = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.get_human_input("Anything else?").await.map_err(|e| e.to_string()) })
    };

    assert_eq!(next_frame(&mut client).await, "system: Anything else?");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.state(), RelayState::AwaitingHumanInput);

    let reply = "  keep going: but cite sources  ";
    assert!(client.send(reply));
    assert_eq!(asking.await.unwrap().unwrap(), reply);
    assert_eq!(session.state(), RelayState::ConversationActive);

    // nothing else was written
    assert!(tokio::time::timeout(Duration::from_millis(50), client.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_human_reply_joins_the_transcript_unchanged() {
    let (session, mut client) = session_pair();
    let mut room = room_with_human(&["director"], 3);
    room.attach_relay(Arc::new(Relay::new(Arc::clone(&session))));

    let chat = tokio::spawn(async move { room.initiate_chat("user_proxy", "hi", true).await });

    assert_eq!(next_frame(&mut client).await, "user_proxy: hi");
    assert_eq!(next_frame(&mut client).await, "director: reply from director");
    assert_eq!(next_frame(&mut client).await, prompt_frame("room"));
    assert!(client.send("Looks good: ship it"));
    assert_eq!(next_frame(&mut client).await, "user_proxy: Looks good: ship it");

    let outcome = chat.await.unwrap().unwrap();
    assert_eq!(outcome.termination, TerminationReason::MaxRoundReached);
    assert_eq!(&*outcome.messages[2].content, "Looks good: ship it");
}

#[tokio::test]
async fn test_disconnect_while_awaiting_input_fails_the_request() {
    let (session, mut client) = session_pair();
    let relay = Arc::new(Relay::new(Arc::clone(&session)));

    let asking = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.get_human_input("still there?").await })
    };
    assert_eq!(next_frame(&mut client).await, "system: still there?");
    client.disconnect();

    let err = tokio::time::timeout(WAIT, asking).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.downcast_ref::<RelayError>(), Some(&RelayError::ConnectionClosed));
    assert_eq!(session.state(), RelayState::Closed);

    // the relay refuses to write on the closed session
    let err = relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "late")))
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<RelayError>(), Some(&RelayError::ConnectionClosed));
}

#[tokio::test]
async fn test_records_without_sender_and_signals_are_not_forwarded() {
    let (session, mut client) = session_pair();
    let relay = Relay::new(Arc::clone(&session));

    relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("  ", "orphan")))
        .await
        .unwrap();
    relay
        .on_dispatch(&Dispatch::Signal("next speaker: director".into()))
        .await
        .unwrap();
    relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "visible")))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut client).await, "director: visible");
    assert!(tokio::time::timeout(Duration::from_millis(50), client.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_terminated_session_stops_forwarding() {
    let (session, mut client) = session_pair();
    let relay = Relay::new(Arc::clone(&session));
    session.set_state(RelayState::Terminated);

    relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "after the end")))
        .await
        .unwrap();
    let err = relay.get_human_input("more?").await.unwrap_err();

    assert_eq!(err.downcast_ref::<RelayError>(), Some(&RelayError::Terminated));
    assert!(tokio::time::timeout(Duration::from_millis(50), client.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_input_timeout_is_reported() {
    let (session, mut client) = session_pair();
    session.set_state(RelayState::ConversationActive);
    let relay = Relay::new(Arc::clone(&session)).with_input_timeout(Some(Duration::from_millis(40)));

    let err = relay.get_human_input("quick!").await.unwrap_err();

    assert_eq!(next_frame(&mut client).await, "system: quick!");
    assert_eq!(
        err.downcast_ref::<RelayError>(),
        Some(&RelayError::HumanInputTimeout(Duration::from_millis(40)))
    );
    assert!(!session.is_closed());
    // nobody is waiting any more
    assert_eq!(session.state(), RelayState::ConversationActive);
}

#[tokio::test]
async fn test_rejected_request_leaves_the_waiting_state_alone() {
    let (session, mut client) = session_pair();
    session.set_state(RelayState::ConversationActive);
    let relay = Arc::new(Relay::new(Arc::clone(&session)));

    let waiting = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.get_human_input("first").await.map_err(|e| e.to_string()) })
    };
    assert_eq!(next_frame(&mut client).await, "system: first");
    assert_eq!(session.state(), RelayState::AwaitingHumanInput);

    let err = relay.get_human_input("second").await.unwrap_err();
    assert_eq!(err.downcast_ref::<RelayError>(), Some(&RelayError::ReceiveInFlight));
    assert_eq!(session.state(), RelayState::AwaitingHumanInput);

    assert!(client.send("answer"));
    assert_eq!(waiting.await.unwrap().unwrap(), "answer");
    assert_eq!(session.state(), RelayState::ConversationActive);

    // the rejected call never wrote a prompt
    assert!(tokio::time::timeout(Duration::from_millis(50), client.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_relay_can_be_moved_to_another_session() {
    let relay = Relay::detached();
    let (first, mut first_client) = session_pair();
    let (second, mut second_client) = session_pair();

    relay.attach(Arc::clone(&first));
    relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "one")))
        .await
        .unwrap();
    let detached = relay.detach().unwrap();
    assert_eq!(detached.id(), first.id());

    relay.attach(Arc::clone(&second));
    relay
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "two")))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut first_client).await, "director: one");
    assert_eq!(next_frame(&mut second_client).await, "director: two");
}

/// Wraps a [`MemoryTransport`] and records how many receives overlap.
struct ProbeTransport {
    inner: MemoryTransport,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    sends: AtomicUsize,
}

#[async_trait]
impl Transport for ProbeTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.inner.send_text(text).await
    }

    async fn receive_text(&self) -> Result<String, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.receive_text().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn closed_token(&self) -> CancellationToken {
        self.inner.closed_token()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_input_requests_never_overlap() {
    const REQUESTS: usize = 32;

    let (memory, mut client) = MemoryTransport::pair();
    let probe = Arc::new(ProbeTransport {
        inner: memory,
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        sends: AtomicUsize::new(0),
    });
    let session = Arc::new(ChatSession::new(probe.clone()));
    let relay = Arc::new(Relay::new(Arc::clone(&session)));
    let rejected = Arc::new(AtomicUsize::new(0));

    let answering = tokio::spawn(async move {
        let mut prompts = 0;
        while prompts < REQUESTS {
            let frame = client.recv().await.expect("client closed early");
            assert!(frame.starts_with("system: "), "unexpected frame {}", frame);
            prompts += 1;
            tokio::task::yield_now().await;
            assert!(client.send(format!("answer {}", prompts)));
        }
        prompts
    });

    let mut askers = Vec::new();
    for i in 0..REQUESTS {
        let relay = Arc::clone(&relay);
        let rejected = Arc::clone(&rejected);
        askers.push(tokio::spawn(async move {
            loop {
                match relay.get_human_input(&format!("prompt {}", i)).await {
                    Ok(answer) => return answer,
                    Err(e) => {
                        assert_eq!(
                            e.downcast_ref::<RelayError>(),
                            Some(&RelayError::ReceiveInFlight)
                        );
                        rejected.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            }
        }));
    }

    let mut answers = Vec::new();
    for asker in askers {
        answers.push(tokio::time::timeout(Duration::from_secs(10), asker).await.unwrap().unwrap());
    }
    let prompts = answering.await.unwrap();

    answers.sort();
    answers.dedup();
    assert_eq!(answers.len(), REQUESTS);
    assert_eq!(prompts, REQUESTS);
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    // rejected attempts never wrote a prompt
    assert_eq!(probe.sends.load(Ordering::SeqCst), REQUESTS);
}

#[tokio::test]
async fn test_registry_sessions_are_independent() {
    let registry = SessionRegistry::new();
    let (a, mut client_a) = MemoryTransport::pair();
    let (b, mut client_b) = MemoryTransport::pair();
    let session_a = registry.open(Arc::new(a));
    let session_b = registry.open(Arc::new(b));

    Relay::new(Arc::clone(&session_a))
        .on_dispatch(&Dispatch::Record(ChatMessage::new("director", "for a")))
        .await
        .unwrap();
    client_b.disconnect();

    assert_eq!(next_frame(&mut client_a).await, "director: for a");
    assert!(session_b.receive(None).await.is_err());
    assert!(!session_a.is_closed());
    assert_eq!(registry.len(), 2);
}
