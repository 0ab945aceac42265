//! WebSocket protocol message types.
//!
//! Every frame is a JSON object. Server frames are discriminated by `type`.

use crate::error::{Rejection, Result};
use axum::extract::ws::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current unix timestamp in seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Handshake frame. Must be the first frame on a connection.
///
/// Missing fields decode as empty strings so they fail validation rather than
/// decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthMessage {
    /// Must be `"auth"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
}

/// Chat frame sent after a successful handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    pub text: String,
    pub receiver_id: String,
    /// Optional. When present it must equal the authenticated user.
    pub sender_id: String,
    pub room_id: String,
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Outcome reported to the sender of an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Persisted; the receiver was offline or the live write failed.
    Sent,
    /// Persisted and written to the receiver's live session.
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

/// Session state carried by `auth_success` and `disconnect` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Replaced,
}

/// Message sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    AuthSuccess {
        status: ConnectionStatus,
        timestamp: i64,
    },
    /// Handshake failure or per-message rejection.
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Chat message pushed to an online receiver.
    Message {
        text: String,
        sender_id: String,
        room_id: String,
        timestamp: i64,
    },
    /// Acknowledgment to the sender of an accepted message.
    Status {
        status: DeliveryStatus,
        text: String,
        timestamp: i64,
    },
    /// Sent to an older connection right before a newer login closes it.
    Disconnect {
        status: ConnectionStatus,
        error: String,
    },
}

impl ServerMessage {
    pub fn auth_success() -> Self {
        ServerMessage::AuthSuccess {
            status: ConnectionStatus::Connected,
            timestamp: now(),
        }
    }

    /// Error frame without a timestamp (handshake failures).
    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            timestamp: None,
        }
    }

    /// Timestamped error frame for a rejected chat message.
    pub fn rejected(rejection: &Rejection) -> Self {
        ServerMessage::Error {
            error: rejection.to_string(),
            timestamp: Some(now()),
        }
    }

    pub fn replaced() -> Self {
        ServerMessage::Disconnect {
            status: ConnectionStatus::Replaced,
            error: "New connection established from another device".to_string(),
        }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<Message> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}
