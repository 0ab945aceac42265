//! Storage collaborators for the chat gateway.
//!
//! The gateway core only asks storage a handful of questions:
//! - does this user exist?
//! - does this room exist, and is this user one of its two members?
//! - persist this message.
//!
//! Those are [`UserDirectory`] and [`RoomDirectory`]. [`RoomCatalog`] adds the
//! room bookkeeping (creation, listing, history) that tooling and tests need.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: DashMap-backed, process-local.
//! - [`RedisChatStore`]: Redis-backed, shared across restarts.

pub mod error;
pub mod memory;
pub mod redis_client;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use redis_client::RedisChatStore;
pub use traits::{RoomCatalog, RoomDirectory, UserDirectory};
pub use types::{NewRoom, Room, StoredMessage};
