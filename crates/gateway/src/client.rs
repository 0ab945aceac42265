//! Connection handles and the session registry.
//!
//! The registry maps each authenticated user id to its single live
//! connection. It is the only state shared between connection tasks:
//! - the handshake inserts (evicting any older connection for the user)
//! - the read loop and the liveness task remove on failure
//! - the delivery router looks receivers up
//!
//! Removal is always conditional on the entry still pointing at the caller's
//! connection, so a stale task never removes a newer session.

use crate::error::{GatewayError, Result};
use crate::protocol::ServerMessage;
use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use futures::{Sink, SinkExt};
use metrics::{counter, gauge};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Write half of one client connection.
///
/// Writes from the read loop, the liveness task and other sessions' routers
/// are serialized by the sink mutex, and each one is bounded by the write
/// deadline.
pub struct ClientConnection {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Timestamp when the connection was accepted.
    pub connected_at: i64,
    sink: Mutex<FrameSink>,
    write_wait: Duration,
    /// Cancelled when the gateway closes the connection.
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Wrap the write half of a socket.
    pub fn new<S>(sink: S, write_wait: Duration) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now().timestamp(),
            sink: Mutex::new(Box::pin(sink)),
            write_wait,
            cancel: CancellationToken::new(),
        }
    }

    /// Send a protocol message.
    pub async fn send(&self, msg: &ServerMessage) -> Result<()> {
        let frame = msg.to_frame()?;
        self.send_frame(frame).await
    }

    /// Send a keepalive ping.
    pub async fn ping(&self) -> Result<()> {
        self.send_frame(Message::Ping(Bytes::new())).await
    }

    /// Send a raw frame within the write deadline.
    pub async fn send_frame(&self, frame: Message) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await
        };

        match timeout(self.write_wait, write).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::WriteTimeout(self.write_wait)),
        }
    }

    /// Close the connection: send a close frame, shut the sink, and cancel
    /// every task watching [`ClientConnection::closed`]. Idempotent.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.cancel.cancel();

        let shutdown = async {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            sink.close().await
        };

        match timeout(self.write_wait, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Connection {} close error: {}", self.id, e),
            Err(_) => debug!("Connection {} close timed out", self.id),
        }
    }

    /// Whether [`ClientConnection::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Registry of live sessions, one per user id.
pub struct SessionRegistry {
    /// User ID → live connection.
    sessions: DashMap<String, Arc<ClientConnection>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register `conn` as the live session for `user_id`.
    ///
    /// A previous session for the same user is told it was replaced and then
    /// closed on a spawned task, so a stalled old peer never delays the new
    /// login. Returns the replaced connection's id.
    pub fn register(&self, user_id: &str, conn: Arc<ClientConnection>) -> Option<ConnectionId> {
        let id = conn.id;
        let previous = self.sessions.insert(user_id.to_string(), conn);
        self.update_gauge();
        info!("Session {} registered for user {}", id, user_id);

        let previous = previous.filter(|old| old.id != id)?;
        info!(
            "User {} already had connection {}, closing it",
            user_id, previous.id
        );
        counter!("gateway_sessions_replaced_total").increment(1);

        let replaced_id = previous.id;
        tokio::spawn(async move {
            if let Err(e) = previous.send(&ServerMessage::replaced()).await {
                debug!("Failed to notify replaced connection {}: {}", previous.id, e);
            }
            previous.close().await;
        });
        Some(replaced_id)
    }

    /// Remove the session for `user_id` only if it is still `conn_id`.
    pub fn remove_if_current(&self, user_id: &str, conn_id: ConnectionId) -> bool {
        let removed = self
            .sessions
            .remove_if(user_id, |_, conn| conn.id == conn_id)
            .is_some();
        if removed {
            self.update_gauge();
            debug!("Session {} removed for user {}", conn_id, user_id);
        }
        removed
    }

    /// Write a message to the user's live session.
    ///
    /// Returns `None` if the user has no session, otherwise the write result.
    pub async fn deliver(&self, user_id: &str, msg: &ServerMessage) -> Option<Result<()>> {
        // Clone the handle so no map guard is held across the write.
        let conn = self.sessions.get(user_id).map(|r| r.clone())?;
        let result = conn.send(msg).await;
        if let Err(ref e) = result {
            warn!("Live write to user {} failed: {}", user_id, e);
        }
        Some(result)
    }

    /// Id of the user's current connection, if any.
    pub fn current_connection(&self, user_id: &str) -> Option<ConnectionId> {
        self.sessions.get(user_id).map(|r| r.id)
    }

    /// Whether the user has a live session.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn update_gauge(&self) {
        gauge!("gateway_active_sessions").set(self.sessions.len() as f64);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
