//! Room and message records.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A listing-scoped chat room between a listing owner and one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub property_id: String,
    pub property_owner_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
}

impl Room {
    /// A user is a member iff they own the listing or are the customer.
    pub fn has_member(&self, user_id: &str) -> bool {
        !user_id.is_empty() && (self.property_owner_id == user_id || self.customer_id == user_id)
    }
}

/// Request to open a room for a listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRoom {
    pub property_id: String,
    pub property_owner_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
}

impl NewRoom {
    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.property_id.is_empty()
            || self.property_owner_id.is_empty()
            || self.customer_id.is_empty()
        {
            return Err(Error::InvalidRoom("Missing required fields".to_string()));
        }
        Ok(())
    }

    /// Build the stored room under a freshly generated id.
    pub fn into_room(self) -> Room {
        Room {
            room_id: Uuid::new_v4().to_string(),
            property_id: self.property_id,
            property_owner_id: self.property_owner_id,
            customer_id: self.customer_id,
            title: self.title,
            image: self.image,
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub text: String,
    pub sender_id: String,
    pub room_id: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl StoredMessage {
    pub fn new(text: &str, sender_id: &str, room_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            sender_id: sender_id.to_string(),
            room_id: room_id.to_string(),
            created_at: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_room() -> NewRoom {
        NewRoom {
            property_id: "listing-1".to_string(),
            property_owner_id: "owner".to_string(),
            customer_id: "customer".to_string(),
            title: "Loft near the river".to_string(),
            image: String::new(),
        }
    }

    #[test]
    fn test_membership() {
        let room = new_room().into_room();
        assert!(room.has_member("owner"));
        assert!(room.has_member("customer"));
        assert!(!room.has_member("stranger"));
        assert!(!room.has_member(""));
    }

    #[test]
    fn test_new_room_requires_parties() {
        assert!(new_room().validate().is_ok());

        let mut missing_customer = new_room();
        missing_customer.customer_id.clear();
        assert!(matches!(
            missing_customer.validate(),
            Err(Error::InvalidRoom(_))
        ));
    }

    #[test]
    fn test_rooms_get_distinct_ids() {
        let a = new_room().into_room();
        let b = new_room().into_room();
        assert_ne!(a.room_id, b.room_id);
    }
}
