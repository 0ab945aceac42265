//! Redis-backed chat storage.
//!
//! Key layout:
//! - `chat:users`: set of registered user ids
//! - `chat:room:{room_id}`: JSON-encoded [`Room`]
//! - `chat:user_rooms:{user_id}`: set of room ids the user belongs to
//! - `chat:messages:{room_id}`: list of JSON-encoded [`StoredMessage`], oldest first

use crate::error::{Error, Result};
use crate::traits::{RoomCatalog, RoomDirectory, UserDirectory};
use crate::types::{NewRoom, Room, StoredMessage};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Redis set holding every registered user id.
const USERS_KEY: &str = "chat:users";

/// Redis key prefix for rooms: chat:room:{room_id}
const ROOM_KEY_PREFIX: &str = "chat:room:";

/// Redis key prefix for per-user room sets: chat:user_rooms:{user_id}
const USER_ROOMS_KEY_PREFIX: &str = "chat:user_rooms:";

/// Redis key prefix for room history lists: chat:messages:{room_id}
const MESSAGES_KEY_PREFIX: &str = "chat:messages:";

fn room_key(room_id: &str) -> String {
    format!("{}{}", ROOM_KEY_PREFIX, room_id)
}

fn user_rooms_key(user_id: &str) -> String {
    format!("{}{}", USER_ROOMS_KEY_PREFIX, user_id)
}

fn messages_key(room_id: &str) -> String {
    format!("{}{}", MESSAGES_KEY_PREFIX, room_id)
}

/// Room record plus both membership entries, applied as one MULTI/EXEC.
fn create_room_pipeline(room: &Room, json: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .set(room_key(&room.room_id), json)
        .ignore()
        .sadd(user_rooms_key(&room.property_owner_id), &room.room_id)
        .ignore()
        .sadd(user_rooms_key(&room.customer_id), &room.room_id)
        .ignore();
    pipe
}

/// Redis client wrapper for chat operations.
#[derive(Clone)]
pub struct RedisChatStore {
    client: Arc<redis::Client>,
}

impl RedisChatStore {
    /// Create a new Redis-backed store. Does not connect until first use.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get an async connection.
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Round-trip a PING to check the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Fetch a room by id.
    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(room_key(room_id)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserDirectory for RedisChatStore {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.sismember(USERS_KEY, user_id).await?;
        Ok(exists)
    }
}

#[async_trait]
impl RoomDirectory for RedisChatStore {
    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(room_key(room_id)).await?;
        Ok(exists)
    }

    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool> {
        Ok(self
            .get_room(room_id)
            .await?
            .map(|room| room.has_member(user_id))
            .unwrap_or(false))
    }

    async fn save_message(
        &self,
        text: &str,
        sender_id: &str,
        room_id: &str,
    ) -> Result<StoredMessage> {
        let mut conn = self.get_connection().await?;
        let message = StoredMessage::new(text, sender_id, room_id);
        let json = serde_json::to_string(&message)?;

        conn.rpush::<_, _, ()>(messages_key(room_id), &json).await?;
        debug!("Saved message {} in room {}", message.id, room_id);

        Ok(message)
    }
}

#[async_trait]
impl RoomCatalog for RedisChatStore {
    async fn register_user(&self, user_id: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        conn.sadd::<_, _, ()>(USERS_KEY, user_id).await?;
        info!("Registered user {}", user_id);
        Ok(())
    }

    async fn create_room(&self, room: NewRoom) -> Result<Room> {
        room.validate()?;
        let room = room.into_room();
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&room)?;

        let _: () = create_room_pipeline(&room, &json).query_async(&mut conn).await?;
        info!(
            "Created room {} for listing {}",
            room.room_id, room.property_id
        );

        Ok(room)
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>> {
        let room_ids: Vec<String> = {
            let mut conn = self.get_connection().await?;
            conn.smembers(user_rooms_key(user_id)).await?
        };

        let mut rooms = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            match self.get_room(&room_id).await? {
                Some(room) => rooms.push(room),
                None => warn!("Room {} listed for {} but missing", room_id, user_id),
            }
        }
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(rooms)
    }

    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<StoredMessage>> {
        if !self.room_exists(room_id).await? {
            return Err(Error::NotFound(format!("room {}", room_id)));
        }

        let mut conn = self.get_connection().await?;
        let entries: Vec<String> = conn.lrange(messages_key(room_id), 0, -1).await?;
        entries
            .iter()
            .map(|json| serde_json::from_str(json).map_err(Error::from))
            .collect()
    }
}
