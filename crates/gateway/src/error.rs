//! Gateway error types.
//!
//! Three families:
//! - [`GatewayError`]: transport, serialization and configuration failures.
//! - [`HandshakeError`]: why a connection never became a session. Terminal.
//! - [`Rejection`]: why a single chat message was refused. The connection
//!   stays open and the sender gets one error acknowledgment.

use std::time::Duration;
use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// A write did not complete within the write deadline.
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The connection has already been closed by the gateway.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Handshake failure. The text is what the client sees in its error frame.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// First frame was not a decodable auth message.
    #[error("Authentication failed: {0}")]
    Malformed(String),

    /// Decoded, but `type` was not `"auth"`.
    #[error("Invalid authentication message")]
    NotAuth,

    /// Decoded, but `user_id` was empty.
    #[error("Invalid authentication message")]
    EmptyUserId,

    /// No such user.
    #[error("Invalid authentication message")]
    UnknownUser,

    /// The user lookup itself failed.
    #[error("Invalid authentication message")]
    Lookup(#[source] chat_store::Error),

    /// No auth frame before the read deadline.
    #[error("Authentication timed out")]
    Timeout,

    /// Peer went away before authenticating.
    #[error("Connection closed before authentication")]
    Closed,
}

impl HandshakeError {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeError::Malformed(_) => "malformed",
            HandshakeError::NotAuth => "not_auth",
            HandshakeError::EmptyUserId => "empty_user_id",
            HandshakeError::UnknownUser => "unknown_user",
            HandshakeError::Lookup(_) => "lookup_failed",
            HandshakeError::Timeout => "timeout",
            HandshakeError::Closed => "closed",
        }
    }
}

/// Per-message rejection. `Display` is the acknowledgment text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Invalid message format")]
    Malformed,

    #[error("message text cannot be empty")]
    EmptyText,

    #[error("message text is too long (max {max} characters)")]
    TextTooLong { max: usize },

    #[error("receiver ID cannot be empty")]
    EmptyReceiver,

    #[error("room ID cannot be empty")]
    EmptyRoom,

    #[error("Sender ID in message doesn't match authenticated user")]
    SenderMismatch,

    #[error("Room does not exist")]
    RoomNotFound,

    #[error("You are not a member of this room")]
    SenderNotMember,

    #[error("Receiver is not a member of this room")]
    ReceiverNotMember,

    #[error("Database error when validating room")]
    RoomLookupFailed,

    #[error("Database error when validating room membership")]
    SenderLookupFailed,

    #[error("Database error when validating receiver room membership")]
    ReceiverLookupFailed,

    #[error("Failed to save message")]
    SaveFailed,
}

impl Rejection {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::EmptyText | Rejection::TextTooLong { .. } => "invalid_text",
            Rejection::EmptyReceiver => "empty_receiver",
            Rejection::EmptyRoom => "empty_room",
            Rejection::SenderMismatch => "sender_mismatch",
            Rejection::RoomNotFound => "room_not_found",
            Rejection::SenderNotMember | Rejection::ReceiverNotMember => "not_member",
            Rejection::RoomLookupFailed
            | Rejection::SenderLookupFailed
            | Rejection::ReceiverLookupFailed => "lookup_failed",
            Rejection::SaveFailed => "save_failed",
        }
    }
}
