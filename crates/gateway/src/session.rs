//! Connection lifecycle: handshake, register, read loop, teardown.
//!
//! ```text
//! AwaitingAuth ──auth ok──▶ Active ──EOF / close / timeout / replaced──▶ Closed
//!      │
//!      └──bad auth / unknown user / timeout──▶ Closed
//! ```
//!
//! Each accepted socket runs [`run_session`] on its own task. Once active, a
//! keepalive task pings the peer while the read loop handles chat frames.
//! Every exit path removes the session (if it is still current), closes the
//! transport and stops the keepalive task.

use crate::client::ClientConnection;
use crate::error::{GatewayError, HandshakeError, Rejection};
use crate::keepalive::run_keepalive;
use crate::protocol::{AuthMessage, ChatMessage, ServerMessage};
use crate::validation::validate_auth_message;
use crate::ws_server::AppState;
use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use futures::{Sink, Stream, StreamExt};
use metrics::counter;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// A data frame's payload. Both text and binary frames carry JSON.
#[derive(Debug)]
pub enum Payload {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Payload {
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            Payload::Text(text) => serde_json::from_str(text.as_str()),
            Payload::Binary(data) => serde_json::from_slice(data),
        }
    }
}

/// Why a session's read side ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// No pong within the read deadline.
    Timeout,
    /// Stream ended without a close frame.
    Eof,
    /// Peer sent a close frame.
    ClosedByPeer,
    /// Transport error on read.
    Transport(axum::Error),
    /// An acknowledgment could not be written.
    WriteFailed(GatewayError),
    /// The gateway closed the connection (e.g. a newer login replaced it).
    ForceClosed,
}

impl SessionEnd {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionEnd::Timeout => "timeout",
            SessionEnd::Eof => "eof",
            SessionEnd::ClosedByPeer => "closed_by_peer",
            SessionEnd::Transport(_) => "transport",
            SessionEnd::WriteFailed(_) => "write_failed",
            SessionEnd::ForceClosed => "force_closed",
        }
    }
}

/// Reads data frames under a pong-refreshed deadline.
pub struct FrameReader<R> {
    stream: R,
    deadline: Instant,
    pong_wait: Duration,
}

impl<R> FrameReader<R>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    pub fn new(stream: R, pong_wait: Duration) -> Self {
        Self {
            stream,
            deadline: Instant::now() + pong_wait,
            pong_wait,
        }
    }

    /// Next text or binary frame.
    ///
    /// Control frames are consumed here. Only a pong moves the deadline.
    pub async fn next_payload(&mut self) -> Result<Payload, SessionEnd> {
        loop {
            let frame = match timeout_at(self.deadline, self.stream.next()).await {
                Err(_) => return Err(SessionEnd::Timeout),
                Ok(None) => return Err(SessionEnd::Eof),
                Ok(Some(Err(e))) => return Err(SessionEnd::Transport(e)),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => return Ok(Payload::Text(text)),
                Message::Binary(data) => return Ok(Payload::Binary(data)),
                Message::Pong(_) => {
                    self.deadline = Instant::now() + self.pong_wait;
                }
                // Answered by the transport.
                Message::Ping(_) => {}
                Message::Close(_) => return Err(SessionEnd::ClosedByPeer),
            }
        }
    }
}

/// Read and verify the handshake frame. Returns the authenticated user id.
async fn authenticate<R>(
    state: &AppState,
    reader: &mut FrameReader<R>,
) -> Result<String, HandshakeError>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let payload = reader.next_payload().await.map_err(|end| match end {
        SessionEnd::Timeout => HandshakeError::Timeout,
        _ => HandshakeError::Closed,
    })?;

    let auth: AuthMessage = payload
        .decode()
        .map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    let user_id = validate_auth_message(&auth)?;

    match state.users.user_exists(user_id).await {
        Ok(true) => Ok(user_id.to_string()),
        Ok(false) => Err(HandshakeError::UnknownUser),
        Err(e) => Err(HandshakeError::Lookup(e)),
    }
}

/// Drive one accepted WebSocket from handshake to teardown.
pub async fn run_session<S, R>(state: Arc<AppState>, sink: S, stream: R)
where
    S: Sink<Message, Error = axum::Error> + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    counter!("gateway_connections_total").increment(1);

    let timings = state.timings;
    let conn = Arc::new(ClientConnection::new(sink, timings.write_wait));
    let mut reader = FrameReader::new(stream, timings.pong_wait);

    let user_id = match authenticate(&state, &mut reader).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("Handshake failed on connection {}: {:?}", conn.id, e);
            counter!("gateway_handshake_failures_total", "reason" => e.reason()).increment(1);
            if !matches!(e, HandshakeError::Closed) {
                if let Err(send_err) = conn.send(&ServerMessage::error(e.to_string())).await {
                    debug!("Failed to send handshake error: {}", send_err);
                }
            }
            conn.close().await;
            return;
        }
    };

    // Confirm before registering so no pushed message can precede auth_success.
    if let Err(e) = conn.send(&ServerMessage::auth_success()).await {
        warn!("Failed to confirm handshake for {}: {}", user_id, e);
    }
    state.registry.register(&user_id, conn.clone());
    info!("User {} connected on {}", user_id, conn.id);

    let keepalive = tokio::spawn(run_keepalive(
        state.registry.clone(),
        user_id.clone(),
        conn.clone(),
        timings.ping_period,
    ));

    let end = read_loop(&state, &user_id, &conn, &mut reader).await;

    state.registry.remove_if_current(&user_id, conn.id);
    conn.close().await;
    keepalive.abort();

    counter!("gateway_disconnections_total", "reason" => end.reason()).increment(1);
    info!("User {} disconnected from {}: {:?}", user_id, conn.id, end);
}

async fn read_loop<R>(
    state: &AppState,
    user_id: &str,
    conn: &ClientConnection,
    reader: &mut FrameReader<R>,
) -> SessionEnd
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;

            _ = conn.closed() => Err(SessionEnd::ForceClosed),
            payload = reader.next_payload() => payload,
        };
        let payload = match next {
            Ok(payload) => payload,
            Err(end) => return end,
        };

        let ack = match payload.decode::<ChatMessage>() {
            Ok(message) => state.router.handle(user_id, message).await,
            Err(e) => {
                debug!("Malformed frame from {}: {}", user_id, e);
                counter!("gateway_messages_rejected_total", "reason" => Rejection::Malformed.reason())
                    .increment(1);
                ServerMessage::rejected(&Rejection::Malformed)
            }
        };

        if let Err(e) = conn.send(&ack).await {
            warn!("Failed to acknowledge message from {}: {}", user_id, e);
            return SessionEnd::WriteFailed(e);
        }
    }
}
