//! WebSocket subsystem: per-client connections, the user registry, event
//! fan-out, inbound routing, and session lifecycle.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod router;
pub mod session;
