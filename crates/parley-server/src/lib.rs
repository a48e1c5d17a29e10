//! # parley-server
//!
//! The Parley messaging server:
//!
//! - **REST API**: users, conversations, messages (persist → respond →
//!   broadcast)
//! - **WebSocket sessions**: one live connection per user, with heartbeat,
//!   slow-client eviction, and graceful cleanup
//! - **Presence**: online/offline fan-out to a user's contacts
//! - **Calls**: ring → active/declined/missed/ended lifecycle with per-flag
//!   media updates
//! - **Signaling**: stateless WebRTC offer/answer/candidate relay

#![deny(unsafe_code)]

pub mod api;
pub mod calls;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod server;
pub mod shutdown;
pub mod signaling;
pub mod websocket;
