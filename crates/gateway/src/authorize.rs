//! Room-membership authorization for inbound chat messages.

use crate::error::Rejection;
use crate::protocol::ChatMessage;
use chat_store::RoomDirectory;
use tracing::warn;

/// Authorize `message` from the authenticated `sender_id`.
///
/// Checks short-circuit in order: sender identity, room existence, sender
/// membership, receiver membership. An empty `sender_id` on the message is
/// filled in from the session.
pub async fn authorize(
    rooms: &dyn RoomDirectory,
    sender_id: &str,
    message: &mut ChatMessage,
) -> Result<(), Rejection> {
    if !message.sender_id.is_empty() && message.sender_id != sender_id {
        warn!(
            "Message sender ID mismatch: auth={}, message={}",
            sender_id, message.sender_id
        );
        return Err(Rejection::SenderMismatch);
    }
    if message.sender_id.is_empty() {
        message.sender_id = sender_id.to_string();
    }

    let room_id = message.room_id.as_str();

    let exists = rooms.room_exists(room_id).await.map_err(|e| {
        warn!("Failed to check room existence for {}: {}", room_id, e);
        Rejection::RoomLookupFailed
    })?;
    if !exists {
        warn!("Room does not exist: {}", room_id);
        return Err(Rejection::RoomNotFound);
    }

    let sender_is_member = rooms.is_member(sender_id, room_id).await.map_err(|e| {
        warn!("Failed to check room membership for {}: {}", sender_id, e);
        Rejection::SenderLookupFailed
    })?;
    if !sender_is_member {
        warn!("User {} is not a member of room {}", sender_id, room_id);
        return Err(Rejection::SenderNotMember);
    }

    let receiver_id = message.receiver_id.as_str();
    let receiver_is_member = rooms.is_member(receiver_id, room_id).await.map_err(|e| {
        warn!("Failed to check room membership for {}: {}", receiver_id, e);
        Rejection::ReceiverLookupFailed
    })?;
    if !receiver_is_member {
        warn!("Receiver {} is not a member of room {}", receiver_id, room_id);
        return Err(Rejection::ReceiverNotMember);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_store::{MemoryStore, NewRoom, RoomCatalog};

    async fn store_with_room() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let room = store
            .create_room(NewRoom {
                property_id: "listing-1".to_string(),
                property_owner_id: "owner".to_string(),
                customer_id: "customer".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, room.room_id)
    }

    fn chat(sender_id: &str, receiver_id: &str, room_id: &str) -> ChatMessage {
        ChatMessage {
            text: "hi".to_string(),
            receiver_id: receiver_id.to_string(),
            sender_id: sender_id.to_string(),
            room_id: room_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fills_missing_sender() {
        let (store, room_id) = store_with_room().await;
        let mut msg = chat("", "owner", &room_id);
        authorize(&store, "customer", &mut msg).await.unwrap();
        assert_eq!(msg.sender_id, "customer");
    }

    #[tokio::test]
    async fn test_matching_sender_is_accepted() {
        let (store, room_id) = store_with_room().await;
        let mut msg = chat("customer", "owner", &room_id);
        assert!(authorize(&store, "customer", &mut msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_forged_sender_is_rejected_first() {
        let (store, _) = store_with_room().await;
        // Room is also missing; the identity check must win.
        let mut msg = chat("owner", "owner", "missing-room");
        assert_eq!(
            authorize(&store, "customer", &mut msg).await,
            Err(Rejection::SenderMismatch)
        );
    }

    #[tokio::test]
    async fn test_missing_room() {
        let (store, _) = store_with_room().await;
        let mut msg = chat("", "owner", "missing-room");
        assert_eq!(
            authorize(&store, "customer", &mut msg).await,
            Err(Rejection::RoomNotFound)
        );
    }

    #[tokio::test]
    async fn test_non_member_sender_and_receiver() {
        let (store, room_id) = store_with_room().await;

        let mut from_stranger = chat("", "owner", &room_id);
        assert_eq!(
            authorize(&store, "stranger", &mut from_stranger).await,
            Err(Rejection::SenderNotMember)
        );

        let mut to_stranger = chat("", "stranger", &room_id);
        assert_eq!(
            authorize(&store, "customer", &mut to_stranger).await,
            Err(Rejection::ReceiverNotMember)
        );
    }
}
