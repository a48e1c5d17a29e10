//! Conversation repository — conversations, membership, typing, read state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use parley_core::ids::{ConversationId, MessageId, UserId};
use parley_core::models::{Conversation, ConversationKind, Participant, ParticipantRole};

use crate::errors::Result;
use crate::sqlite::codec;

/// Conversation repository — stateless, every method takes `&Connection`.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Insert a conversation row. Membership rows are added separately via
    /// [`Self::add_participant`].
    pub fn create(
        conn: &Connection,
        kind: ConversationKind,
        name: Option<&str>,
        description: Option<&str>,
        created_by: &UserId,
    ) -> Result<Conversation> {
        let id = ConversationId::new();
        let now = codec::now();
        let _ = conn.execute(
            "INSERT INTO conversations (id, kind, name, description, created_by, last_activity_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.as_str(),
                kind.as_str(),
                name,
                description,
                created_by.as_str(),
                codec::fmt_ts(now),
                codec::fmt_ts(now),
            ],
        )?;

        Ok(Conversation {
            id,
            kind,
            name: name.map(String::from),
            description: description.map(String::from),
            created_by: created_by.clone(),
            last_activity_at: now,
            last_message_id: None,
            created_at: now,
        })
    }

    /// Add a membership row.
    pub fn add_participant(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
        role: ParticipantRole,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO participants (conversation_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation_id.as_str(),
                user_id.as_str(),
                role.as_str(),
                codec::fmt_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Remove a membership row. Returns `false` if the user was not a member.
    pub fn remove_participant(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.as_str(), user_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Get a conversation by ID.
    pub fn get(conn: &Connection, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let row = conn
            .query_row(
                "SELECT id, kind, name, description, created_by, last_activity_at, last_message_id, created_at
                 FROM conversations WHERE id = ?1",
                params![conversation_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Find the direct conversation between two users, if one exists.
    ///
    /// Membership is unordered: `find_direct(a, b)` and `find_direct(b, a)`
    /// return the same row.
    pub fn find_direct(conn: &Connection, a: &UserId, b: &UserId) -> Result<Option<Conversation>> {
        let row = conn
            .query_row(
                "SELECT c.id, c.kind, c.name, c.description, c.created_by,
                        c.last_activity_at, c.last_message_id, c.created_at
                 FROM conversations c
                 WHERE c.kind = 'direct'
                   AND EXISTS (SELECT 1 FROM participants p
                               WHERE p.conversation_id = c.id AND p.user_id = ?1)
                   AND EXISTS (SELECT 1 FROM participants p
                               WHERE p.conversation_id = c.id AND p.user_id = ?2)
                 LIMIT 1",
                params![a.as_str(), b.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List conversations the user belongs to, most recently active first.
    pub fn list_for_user(conn: &Connection, user_id: &UserId) -> Result<Vec<Conversation>> {
        let mut stmt = conn.prepare(
            "SELECT c.id, c.kind, c.name, c.description, c.created_by,
                    c.last_activity_at, c.last_message_id, c.created_at
             FROM conversations c
             JOIN participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?1
             ORDER BY c.last_activity_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id.as_str()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Update conversation metadata. `None` fields are left unchanged.
    ///
    /// Returns `false` if the conversation does not exist.
    pub fn update_meta(
        conn: &Connection,
        conversation_id: &ConversationId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversations
             SET name = COALESCE(?2, name), description = COALESCE(?3, description)
             WHERE id = ?1",
            params![conversation_id.as_str(), name, description],
        )?;
        Ok(changed > 0)
    }

    /// Bump the activity stamp and last-message pointer after a new message.
    pub fn touch_activity(
        conn: &Connection,
        conversation_id: &ConversationId,
        last_message_id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let _ = conn.execute(
            "UPDATE conversations SET last_activity_at = ?2, last_message_id = ?3 WHERE id = ?1",
            params![
                conversation_id.as_str(),
                codec::fmt_ts(at),
                last_message_id.as_str()
            ],
        )?;
        Ok(())
    }

    /// All membership rows of a conversation, in join order.
    pub fn participants_of(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>> {
        let mut stmt = conn.prepare(
            "SELECT conversation_id, user_id, role, joined_at, muted_until,
                    last_read_message_id, last_read_at, is_typing, typing_at
             FROM participants WHERE conversation_id = ?1
             ORDER BY joined_at",
        )?;
        let rows = stmt
            .query_map(params![conversation_id.as_str()], Self::map_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The member user IDs of a conversation.
    pub fn participant_user_ids(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT user_id FROM participants WHERE conversation_id = ?1 ORDER BY joined_at",
        )?;
        let rows = stmt
            .query_map(params![conversation_id.as_str()], |row| {
                Ok(UserId::from(row.get::<_, String>(0)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether the user is a member of the conversation.
    pub fn is_participant(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.as_str(), user_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Distinct users who share at least one conversation with `user_id`,
    /// excluding the user themself.
    pub fn contact_ids_of(conn: &Connection, user_id: &UserId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT other.user_id
             FROM participants mine
             JOIN participants other ON other.conversation_id = mine.conversation_id
             WHERE mine.user_id = ?1 AND other.user_id != ?1",
        )?;
        let rows = stmt
            .query_map(params![user_id.as_str()], |row| {
                Ok(UserId::from(row.get::<_, String>(0)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Set the typing hint on a membership row.
    ///
    /// Returns `false` if the user is not a member.
    pub fn set_typing(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE participants SET is_typing = ?3, typing_at = ?4
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![
                conversation_id.as_str(),
                user_id.as_str(),
                i32::from(is_typing),
                codec::fmt_ts(Utc::now()),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Advance the reader's read pointer.
    ///
    /// Returns `false` if the user is not a member.
    pub fn mark_read(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
        message_id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE participants SET last_read_message_id = ?3, last_read_at = ?4
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![
                conversation_id.as_str(),
                user_id.as_str(),
                message_id.as_str(),
                codec::fmt_ts(at),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Count messages the user has not read yet.
    ///
    /// Tombstones and the user's own messages are excluded.
    pub fn unread_count(
        conn: &Connection,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM messages m
             JOIN participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?2
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.deleted_at IS NULL
               AND (p.last_read_at IS NULL OR m.created_at > p.last_read_at)",
            params![conversation_id.as_str(), user_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: ConversationId::from(row.get::<_, String>(0)?),
            kind: codec::text_enum(1, &row.get::<_, String>(1)?)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_by: UserId::from(row.get::<_, String>(4)?),
            last_activity_at: codec::ts(5, &row.get::<_, String>(5)?)?,
            last_message_id: row.get::<_, Option<String>>(6)?.map(MessageId::from),
            created_at: codec::ts(7, &row.get::<_, String>(7)?)?,
        })
    }

    fn map_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
        Ok(Participant {
            conversation_id: ConversationId::from(row.get::<_, String>(0)?),
            user_id: UserId::from(row.get::<_, String>(1)?),
            role: codec::text_enum(2, &row.get::<_, String>(2)?)?,
            joined_at: codec::ts(3, &row.get::<_, String>(3)?)?,
            muted_until: codec::opt_ts(4, row.get(4)?)?,
            last_read_message_id: row.get::<_, Option<String>>(5)?.map(MessageId::from),
            last_read_at: codec::opt_ts(6, row.get(6)?)?,
            is_typing: row.get::<_, i64>(7)? != 0,
            typing_at: codec::opt_ts(8, row.get(8)?)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
