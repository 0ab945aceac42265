//! Message router: validate → authorize → persist → deliver.
//!
//! Every chat frame from an authenticated session passes through
//! [`ChatRouter::handle`], which always yields exactly one acknowledgment for
//! the sender. Persistence happens before any delivery attempt, so a message
//! the receiver sees is always stored.

use crate::authorize::authorize;
use crate::client::SessionRegistry;
use crate::error::Rejection;
use crate::protocol::{ChatMessage, DeliveryStatus, ServerMessage};
use crate::validation::validate_chat_message;
use chat_store::{RoomDirectory, StoredMessage};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes accepted chat messages to storage and to the receiver's session.
pub struct ChatRouter {
    registry: Arc<SessionRegistry>,
    rooms: Arc<dyn RoomDirectory>,
}

impl ChatRouter {
    pub fn new(registry: Arc<SessionRegistry>, rooms: Arc<dyn RoomDirectory>) -> Self {
        Self { registry, rooms }
    }

    /// Process one chat message from `sender_id` and return the sender's ack.
    pub async fn handle(&self, sender_id: &str, message: ChatMessage) -> ServerMessage {
        match self.process(sender_id, message).await {
            Ok((stored, status)) => {
                counter!("gateway_messages_total", "status" => status.as_str()).increment(1);
                ServerMessage::Status {
                    status,
                    text: stored.text,
                    timestamp: stored.created_at,
                }
            }
            Err(rejection) => {
                counter!("gateway_messages_rejected_total", "reason" => rejection.reason())
                    .increment(1);
                ServerMessage::rejected(&rejection)
            }
        }
    }

    async fn process(
        &self,
        sender_id: &str,
        mut message: ChatMessage,
    ) -> Result<(StoredMessage, DeliveryStatus), Rejection> {
        validate_chat_message(&message).map_err(|rejection| {
            debug!("Rejected message from {}: {}", sender_id, rejection);
            rejection
        })?;

        authorize(self.rooms.as_ref(), sender_id, &mut message).await?;

        let stored = self
            .rooms
            .save_message(&message.text, &message.sender_id, &message.room_id)
            .await
            .map_err(|e| {
                warn!("Failed to save message in room {}: {}", message.room_id, e);
                Rejection::SaveFailed
            })?;

        let status = if self.deliver(&message.receiver_id, &stored).await {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Sent
        };

        info!(
            "Message {} from {} to {} in room {}: {}",
            stored.id,
            stored.sender_id,
            message.receiver_id,
            stored.room_id,
            status.as_str()
        );

        Ok((stored, status))
    }

    /// Push a stored message to the receiver's live session.
    ///
    /// Returns true only if the write succeeded.
    async fn deliver(&self, receiver_id: &str, stored: &StoredMessage) -> bool {
        let push = ServerMessage::Message {
            text: stored.text.clone(),
            sender_id: stored.sender_id.clone(),
            room_id: stored.room_id.clone(),
            timestamp: stored.created_at,
        };

        match self.registry.deliver(receiver_id, &push).await {
            Some(Ok(())) => true,
            Some(Err(_)) => false,
            None => {
                debug!("Receiver {} is offline, message stored only", receiver_id);
                false
            }
        }
    }
}
