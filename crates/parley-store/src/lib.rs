//! # parley-store
//!
//! `SQLite` persistence for the Parley messaging server.
//!
//! - **Chat store**: high-level API for users, conversations, messages, and
//!   calls; multi-step writes run inside transactions
//! - **`SQLite` backend**: `rusqlite` with `r2d2` pooling and a repository
//!   per aggregate (users, conversations, messages, calls)
//! - **Migrations**: version-tracked SQL schema evolution

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use sqlite::repositories::calls::MediaFlag;
pub use sqlite::repositories::messages::NewMessage;
pub use store::ChatStore;
