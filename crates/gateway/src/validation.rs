//! Stateless shape checks on inbound frames.
//!
//! Sender identity is not checked here; that needs the authenticated session.

use crate::error::{HandshakeError, Rejection};
use crate::protocol::{AuthMessage, ChatMessage};

/// Maximum chat message length, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

/// The `type` every handshake frame must carry.
pub const AUTH_MESSAGE_TYPE: &str = "auth";

/// Validate a chat message. Checks run in field order and the first failure wins.
pub fn validate_chat_message(message: &ChatMessage) -> Result<(), Rejection> {
    if message.text.is_empty() {
        return Err(Rejection::EmptyText);
    }

    if message.text.chars().count() > MAX_TEXT_CHARS {
        return Err(Rejection::TextTooLong {
            max: MAX_TEXT_CHARS,
        });
    }

    if message.receiver_id.is_empty() {
        return Err(Rejection::EmptyReceiver);
    }

    if message.room_id.is_empty() {
        return Err(Rejection::EmptyRoom);
    }

    Ok(())
}

/// Validate a handshake frame, returning the claimed user id.
pub fn validate_auth_message(message: &AuthMessage) -> Result<&str, HandshakeError> {
    if message.kind != AUTH_MESSAGE_TYPE {
        return Err(HandshakeError::NotAuth);
    }

    if message.user_id.is_empty() {
        return Err(HandshakeError::EmptyUserId);
    }

    Ok(&message.user_id)
}
