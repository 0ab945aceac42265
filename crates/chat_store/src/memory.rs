//! Lock-free in-memory chat storage using DashMap.
//!
//! Structure:
//! - users: set of registered user ids
//! - rooms: room_id -> Room
//! - messages: room_id -> messages in arrival order

use crate::error::{Error, Result};
use crate::traits::{RoomCatalog, RoomDirectory, UserDirectory};
use crate::types::{NewRoom, Room, StoredMessage};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Process-local chat storage. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    users: DashSet<String>,
    rooms: DashMap<String, Room>,
    messages: DashMap<String, Vec<StoredMessage>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted messages across all rooms.
    pub fn message_count(&self) -> usize {
        self.inner.messages.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        Ok(self.inner.users.contains(user_id))
    }
}

#[async_trait]
impl RoomDirectory for MemoryStore {
    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        Ok(self.inner.rooms.contains_key(room_id))
    }

    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .rooms
            .get(room_id)
            .map(|room| room.has_member(user_id))
            .unwrap_or(false))
    }

    async fn save_message(
        &self,
        text: &str,
        sender_id: &str,
        room_id: &str,
    ) -> Result<StoredMessage> {
        let message = StoredMessage::new(text, sender_id, room_id);
        self.inner
            .messages
            .entry(room_id.to_string())
            .or_default()
            .push(message.clone());
        debug!("Saved message {} in room {}", message.id, room_id);
        Ok(message)
    }
}

#[async_trait]
impl RoomCatalog for MemoryStore {
    async fn register_user(&self, user_id: &str) -> Result<()> {
        self.inner.users.insert(user_id.to_string());
        Ok(())
    }

    async fn create_room(&self, room: NewRoom) -> Result<Room> {
        room.validate()?;
        let room = room.into_room();
        self.inner.rooms.insert(room.room_id.clone(), room.clone());
        info!(
            "Created room {} for listing {}",
            room.room_id, room.property_id
        );
        Ok(room)
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .inner
            .rooms
            .iter()
            .filter(|entry| entry.value().has_member(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(rooms)
    }

    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<StoredMessage>> {
        if !self.inner.rooms.contains_key(room_id) {
            return Err(Error::NotFound(format!("room {}", room_id)));
        }
        Ok(self
            .inner
            .messages
            .get(room_id)
            .map(|messages| messages.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_room() -> (MemoryStore, Room) {
        let store = MemoryStore::new();
        store.register_user("owner").await.unwrap();
        store.register_user("customer").await.unwrap();
        let room = store
            .create_room(NewRoom {
                property_id: "listing-1".to_string(),
                property_owner_id: "owner".to_string(),
                customer_id: "customer".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, room)
    }

    #[tokio::test]
    async fn test_user_exists() {
        let (store, _) = store_with_room().await;
        assert!(store.user_exists("owner").await.unwrap());
        assert!(!store.user_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_membership_queries() {
        let (store, room) = store_with_room().await;
        assert!(store.room_exists(&room.room_id).await.unwrap());
        assert!(!store.room_exists("no-such-room").await.unwrap());

        assert!(store.is_member("owner", &room.room_id).await.unwrap());
        assert!(store.is_member("customer", &room.room_id).await.unwrap());
        assert!(!store.is_member("ghost", &room.room_id).await.unwrap());
        assert!(!store.is_member("owner", "no-such-room").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_is_in_arrival_order() {
        let (store, room) = store_with_room().await;
        store.save_message("hi", "customer", &room.room_id).await.unwrap();
        store.save_message("hello", "owner", &room.room_id).await.unwrap();

        let history = store.messages_for_room(&room.room_id).await.unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert_eq!(history[0].sender_id, "customer");
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_history_of_unknown_room() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.messages_for_room("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rooms_for_user() {
        let (store, room) = store_with_room().await;
        store
            .create_room(NewRoom {
                property_id: "listing-2".to_string(),
                property_owner_id: "someone-else".to_string(),
                customer_id: "another".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let rooms = store.rooms_for_user("customer").await.unwrap();
        assert_eq!(rooms, vec![room]);
        assert!(store.rooms_for_user("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_room_rejects_missing_fields() {
        let store = MemoryStore::new();
        let result = store.create_room(NewRoom::default()).await;
        assert!(matches!(result, Err(Error::InvalidRoom(_))));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.register_user("shared").await.unwrap();
        assert!(store.user_exists("shared").await.unwrap());
    }
}
