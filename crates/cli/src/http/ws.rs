//! WebSocket subscriber transport.
//!
//! The write half lives in the registry as a `SubscriberConnection`; the read
//! half stays in the upgrade task and only watches for the peer going away.
//! Closing the write half also ends the read loop, so the socket is dropped
//! even when the peer never answers the close frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use contracts::{CloseReason, ContractError, SubscriberConnection};
use dispatcher::SubscriberRegistry;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Write half of one WebSocket subscriber
pub struct WsConnection {
    peer: String,
    sender: Mutex<Option<SplitSink<WebSocket, Message>>>,
    closed: AtomicBool,
    close_timeout: Duration,
    released: CancellationToken,
}

impl WsConnection {
    pub fn new(
        peer: impl Into<String>,
        sender: SplitSink<WebSocket, Message>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            peer: peer.into(),
            sender: Mutex::new(Some(sender)),
            closed: AtomicBool::new(false),
            close_timeout,
            released: CancellationToken::new(),
        }
    }

    /// Cancelled once the connection is closed from this side.
    pub fn released(&self) -> CancellationToken {
        self.released.clone()
    }

    fn closed_error(&self) -> ContractError {
        ContractError::subscriber_write(&self.peer, "connection closed")
    }
}

#[async_trait]
impl SubscriberConnection for WsConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn push(&self, payload: Bytes) -> Result<(), ContractError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| ContractError::subscriber_write(&self.peer, e.to_string()))?;

        let mut sender = self.sender.lock().await;
        // close may have won the lock race
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        let Some(sender) = sender.as_mut() else {
            return Err(self.closed_error());
        };
        sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ContractError::subscriber_write(&self.peer, e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.released.cancel();

        let handshake = async {
            let Some(mut sender) = self.sender.lock().await.take() else {
                return;
            };
            // the peer may already be gone
            let _ = sender.send(Message::Close(None)).await;
            let _ = sender.close().await;
        };
        if tokio::time::timeout(self.close_timeout, handshake).await.is_err() {
            debug!(
                peer = %self.peer,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Close handshake timed out, dropping write half"
            );
        }
    }
}

/// Register the socket and hold it until the peer leaves or `shutdown` fires.
pub async fn serve_subscriber(
    socket: WebSocket,
    peer: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    shutdown: CancellationToken,
) {
    let (sender, mut receiver) = socket.split();
    let connection = WsConnection::new(peer.to_string(), sender, registry.close_timeout());
    let released = connection.released();
    let id = registry.register(Arc::new(connection));
    debug!(subscriber = %id, peer = %peer, "Subscriber read loop started");

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            _ = released.cancelled() => {
                // already evicted and closed by a failed push
                debug!(subscriber = %id, peer = %peer, "Subscriber released");
                return;
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Close(_))) | None => break CloseReason::Graceful,
                Some(Err(e)) => {
                    debug!(subscriber = %id, error = %e, "Subscriber read failed");
                    break CloseReason::Graceful;
                }
                // inbound frames only prove liveness
                Some(Ok(_)) => {}
            },
        }
    };

    if registry.evict(id, reason).await {
        info!(subscriber = %id, reason = ?reason, "Subscriber disconnected");
    }
}
