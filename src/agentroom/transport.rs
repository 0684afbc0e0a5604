//! Bidirectional text channels to a single remote client.
//!
//! [`Transport`] is the seam between the relay and the wire. [`WebSocketTransport`] serves
//! browsers over an upgraded axum websocket; [`MemoryTransport`] is an in-process pair used by
//! tests and headless drivers.
//!
//! Every transport owns a [`CancellationToken`] that fires once the peer is gone, so work tied
//! to the connection can unwind without waiting for the next read.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer disconnected or the channel was closed locally.
    ConnectionClosed,
    /// Any other failure reported by the underlying connection.
    Connection(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionClosed => write!(f, "connection closed"),
            TransportError::Connection(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

impl Error for TransportError {}

/// One logical message per frame, UTF-8 text only.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one complete text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Wait for the next complete text frame.
    async fn receive_text(&self) -> Result<String, TransportError>;

    /// Close the channel. Safe to call more than once.
    async fn close(&self);

    /// Token cancelled when the connection goes away, from either side.
    fn closed_token(&self) -> CancellationToken;
}

/// [`Transport`] over an upgraded axum websocket.
///
/// A reader task drains the socket into a queue so disconnects are noticed while nobody is
/// waiting on [`receive_text`](Transport::receive_text). Binary and ping/pong frames are dropped.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
}

impl WebSocketTransport {
    /// Wrap an accepted socket. Must be called from within a tokio runtime.
    pub fn new(socket: WebSocket) -> Self {
        let (sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let reader_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        log::debug!("websocket peer closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("websocket read failed: {}", e);
                        break;
                    }
                }
            }
            reader_closed.cancel();
        });

        Self {
            sink: Mutex::new(sink),
            inbound: Mutex::new(rx),
            closed,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
            log::debug!("websocket write failed: {}", e);
            self.closed.cancel();
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    async fn receive_text(&self) -> Result<String, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            frame = inbound.recv() => frame.ok_or(TransportError::ConnectionClosed),
            _ = self.closed.cancelled() => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
        let mut sink = self.sink.lock().await;
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    }

    fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// In-process [`Transport`]; the other end is a [`MemoryPeer`].
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
}

/// The client side of a [`MemoryTransport`].
pub struct MemoryPeer {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (to_server, server_rx) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        (
            MemoryTransport {
                outbound: to_client,
                inbound: Mutex::new(server_rx),
                closed: closed.clone(),
            },
            MemoryPeer {
                outbound: to_server,
                inbound: client_rx,
                closed,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound.send(text).map_err(|_| {
            self.closed.cancel();
            TransportError::ConnectionClosed
        })
    }

    async fn receive_text(&self) -> Result<String, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::ConnectionClosed),
            frame = inbound.recv() => frame.ok_or(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl MemoryPeer {
    /// Send one frame to the server side. Returns false once the connection is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        !self.closed.is_cancelled() && self.outbound.send(text.into()).is_ok()
    }

    /// Next frame written by the server, or `None` once it closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            frame = self.inbound.recv() => frame,
            _ = self.closed.cancelled() => self.inbound.try_recv().ok(),
        }
    }

    /// Simulate the client going away.
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
