//! Real-time chat gateway for marketplace rooms.
//!
//! This service:
//! - Accepts WebSocket connections from buyers and listing owners
//! - Authenticates each connection with a first-frame handshake
//! - Keeps one live session per user (a new login replaces the old one)
//! - Validates, authorizes and persists chat messages, then pushes them to
//!   the receiver if online
//!
//! ## Architecture
//!
//! ```text
//! WebSocket client
//!         ↓
//! session (handshake, read deadline, keepalive)
//!         ↓
//! ChatRouter (validate → authorize → persist → deliver)
//!         ↓                               ↓
//! chat_store (users, rooms, messages)   SessionRegistry (DashMap, one entry per user)
//!                                         ↓
//!                                       receiver's WebSocket
//! ```
//!
//! Every accepted message is persisted before delivery is attempted, and the
//! sender always gets exactly one acknowledgment: `status` (`sent` or
//! `delivered`) or `error`.

pub mod authorize;
pub mod client;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod protocol;
pub mod router;
pub mod session;
pub mod validation;
pub mod ws_server;

pub use client::{ClientConnection, ConnectionId, SessionRegistry};
pub use config::{GatewayConfig, OriginPolicy, SessionTimings};
pub use error::{GatewayError, HandshakeError, Rejection, Result};
pub use protocol::{AuthMessage, ChatMessage, DeliveryStatus, ServerMessage};
pub use router::ChatRouter;
pub use ws_server::{create_router, AppState};
