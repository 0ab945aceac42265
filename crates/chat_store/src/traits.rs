//! Capability traits the gateway consumes.
//!
//! Any storage technology can back the gateway by implementing these.

use crate::error::Result;
use crate::types::{NewRoom, Room, StoredMessage};
use async_trait::async_trait;

/// User lookups needed by the connection handshake.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether a user with this id is registered.
    async fn user_exists(&self, user_id: &str) -> Result<bool>;
}

/// Room queries and message persistence needed by the message pipeline.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Whether the room exists.
    async fn room_exists(&self, room_id: &str) -> Result<bool>;

    /// Whether the user is one of the room's members.
    ///
    /// A missing room is reported as "not a member", not as an error.
    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool>;

    /// Durably persist a message.
    async fn save_message(
        &self,
        text: &str,
        sender_id: &str,
        room_id: &str,
    ) -> Result<StoredMessage>;
}

/// Room bookkeeping outside the real-time path.
#[async_trait]
pub trait RoomCatalog: Send + Sync {
    /// Register a user id so it passes the handshake.
    async fn register_user(&self, user_id: &str) -> Result<()>;

    /// Open a room for a listing.
    async fn create_room(&self, room: NewRoom) -> Result<Room>;

    /// Rooms where the user is the owner or the customer, ordered by room id.
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>>;

    /// Room history, oldest first.
    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<StoredMessage>>;
}
