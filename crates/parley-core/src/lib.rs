//! # parley-core
//!
//! Shared domain types for the Parley messaging server:
//!
//! - **Branded IDs**: newtype wrappers over UUID v7 strings so a user id can
//!   never be passed where a call id is expected
//! - **Domain models**: conversations, participants, messages, calls, and
//!   presence, in the camelCase shape they cross the wire in
//! - **Envelopes**: the closed inbound [`events::ClientMessage`] set and the
//!   closed outbound [`events::ServerEvent`] catalog, both serialized as
//!   `{type, payload}` JSON

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod models;

pub use events::{ClientMessage, ServerEvent};
pub use ids::{CallId, ConversationId, MessageId, UserId};
