//! User repository — accounts and presence.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use parley_core::ids::UserId;
use parley_core::models::{PresenceStatus, User};

use crate::errors::{Result, StoreError};
use crate::sqlite::codec;

/// User repository — stateless, every method takes `&Connection`.
pub struct UserRepo;

impl UserRepo {
    /// Create a new user. Fails with [`StoreError::AlreadyExists`] if the
    /// username is taken.
    pub fn create(conn: &Connection, username: &str) -> Result<User> {
        let id = UserId::new();
        let now = codec::now();
        let result = conn.execute(
            "INSERT INTO users (id, username, status, last_seen_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                username,
                PresenceStatus::Offline.as_str(),
                codec::fmt_ts(now),
                codec::fmt_ts(now),
            ],
        );

        match result {
            Ok(_) => Ok(User {
                id,
                username: username.to_owned(),
                status: PresenceStatus::Offline,
                last_seen_at: now,
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AlreadyExists(format!("username {username}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by ID.
    pub fn get(conn: &Connection, user_id: &UserId) -> Result<Option<User>> {
        let row = conn
            .query_row(
                "SELECT id, username, status, last_seen_at, created_at
                 FROM users WHERE id = ?1",
                params![user_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Look up a user by username.
    pub fn get_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
        let row = conn
            .query_row(
                "SELECT id, username, status, last_seen_at, created_at
                 FROM users WHERE username = ?1",
                params![username],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List all users, ordered by username.
    pub fn list(conn: &Connection) -> Result<Vec<User>> {
        let mut stmt = conn.prepare(
            "SELECT id, username, status, last_seen_at, created_at
             FROM users ORDER BY username",
        )?;
        let users = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Update a user's presence status and bump `last_seen_at`.
    ///
    /// Returns `false` if the user does not exist.
    pub fn set_status(conn: &Connection, user_id: &UserId, status: PresenceStatus) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE users SET status = ?2, last_seen_at = ?3 WHERE id = ?1",
            params![
                user_id.as_str(),
                status.as_str(),
                codec::fmt_ts(Utc::now())
            ],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: UserId::from(row.get::<_, String>(0)?),
            username: row.get(1)?,
            status: codec::text_enum(2, &row.get::<_, String>(2)?)?,
            last_seen_at: codec::ts(3, &row.get::<_, String>(3)?)?,
            created_at: codec::ts(4, &row.get::<_, String>(4)?)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
