//! Message repository — message rows, edits, tombstones, read receipts.

use rusqlite::{Connection, OptionalExtension, params};

use parley_core::ids::{ConversationId, MessageId, UserId};
use parley_core::models::{DeliveryStatus, Message, MessageType};

use crate::errors::{Result, StoreError};
use crate::sqlite::codec;

/// Options for creating a new message.
pub struct NewMessage<'a> {
    /// Owning conversation.
    pub conversation_id: &'a ConversationId,
    /// Author.
    pub sender_id: &'a UserId,
    /// Text content.
    pub content: &'a str,
    /// Content kind.
    pub message_type: MessageType,
    /// Attachment URLs.
    pub attachments: &'a [String],
    /// Message this replies to, if any.
    pub reply_to_id: Option<&'a MessageId>,
}

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message row.
    pub fn create(conn: &Connection, opts: &NewMessage<'_>) -> Result<Message> {
        let id = MessageId::new();
        let now = codec::now();
        let attachments_json = serde_json::to_string(opts.attachments)?;

        let _ = conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, message_type,
             attachments, reply_to_id, delivery_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id.as_str(),
                opts.conversation_id.as_str(),
                opts.sender_id.as_str(),
                opts.content,
                opts.message_type.as_str(),
                attachments_json,
                opts.reply_to_id.map(MessageId::as_str),
                DeliveryStatus::Sent.as_str(),
                codec::fmt_ts(now),
            ],
        )?;

        Ok(Message {
            id,
            conversation_id: opts.conversation_id.clone(),
            sender_id: opts.sender_id.clone(),
            content: Some(opts.content.to_owned()),
            message_type: opts.message_type,
            attachments: opts.attachments.to_vec(),
            reply_to_id: opts.reply_to_id.cloned(),
            delivery_status: DeliveryStatus::Sent,
            created_at: now,
            edited_at: None,
            deleted_at: None,
        })
    }

    /// Get a message by ID.
    pub fn get(conn: &Connection, message_id: &MessageId) -> Result<Option<Message>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![message_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List messages in a conversation, newest first.
    ///
    /// When `before` is set, only messages older than that message are
    /// returned (cursor paging).
    pub fn list(
        conn: &Connection,
        conversation_id: &ConversationId,
        limit: i64,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE conversation_id = ?1
               AND (?2 IS NULL OR created_at < (SELECT created_at FROM messages WHERE id = ?2))
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    conversation_id.as_str(),
                    before.map(MessageId::as_str),
                    limit
                ],
                Self::map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Replace a message's content and stamp `edited_at`.
    ///
    /// Tombstoned messages cannot be edited.
    pub fn edit(conn: &Connection, message_id: &MessageId, content: &str) -> Result<Message> {
        let existing = Self::get(conn, message_id)?
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        if existing.is_deleted() {
            return Err(StoreError::InvalidOperation(
                "cannot edit a deleted message".into(),
            ));
        }

        let edited_at = codec::now();
        let _ = conn.execute(
            "UPDATE messages SET content = ?2, edited_at = ?3 WHERE id = ?1",
            params![message_id.as_str(), content, codec::fmt_ts(edited_at)],
        )?;

        Ok(Message {
            content: Some(content.to_owned()),
            edited_at: Some(edited_at),
            ..existing
        })
    }

    /// Tombstone a message: clear content and attachments, keep the row.
    ///
    /// Deleting an already-deleted message is a no-op and returns the
    /// existing tombstone.
    pub fn tombstone(conn: &Connection, message_id: &MessageId) -> Result<Message> {
        let existing = Self::get(conn, message_id)?
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        if existing.is_deleted() {
            return Ok(existing);
        }

        let deleted_at = codec::now();
        let _ = conn.execute(
            "UPDATE messages SET content = NULL, attachments = '[]', deleted_at = ?2 WHERE id = ?1",
            params![message_id.as_str(), codec::fmt_ts(deleted_at)],
        )?;

        Ok(Message {
            content: None,
            attachments: Vec::new(),
            deleted_at: Some(deleted_at),
            ..existing
        })
    }

    /// Mark every message up to and including `message_id` as read, except
    /// the reader's own. Returns how many rows changed.
    pub fn mark_read_up_to(
        conn: &Connection,
        conversation_id: &ConversationId,
        reader_id: &UserId,
        message_id: &MessageId,
    ) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE messages SET delivery_status = 'read'
             WHERE conversation_id = ?1
               AND sender_id != ?2
               AND delivery_status != 'read'
               AND created_at <= (SELECT created_at FROM messages WHERE id = ?3)",
            params![
                conversation_id.as_str(),
                reader_id.as_str(),
                message_id.as_str()
            ],
        )?;
        Ok(changed)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        Ok(Message {
            id: MessageId::from(row.get::<_, String>(0)?),
            conversation_id: ConversationId::from(row.get::<_, String>(1)?),
            sender_id: UserId::from(row.get::<_, String>(2)?),
            content: row.get(3)?,
            message_type: codec::text_enum(4, &row.get::<_, String>(4)?)?,
            attachments: codec::string_list(5, &row.get::<_, String>(5)?)?,
            reply_to_id: row.get::<_, Option<String>>(6)?.map(MessageId::from),
            delivery_status: codec::text_enum(7, &row.get::<_, String>(7)?)?,
            created_at: codec::ts(8, &row.get::<_, String>(8)?)?,
            edited_at: codec::opt_ts(9, row.get(9)?)?,
            deleted_at: codec::opt_ts(10, row.get(10)?)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, conversation_id, sender_id, content, message_type,
 attachments, reply_to_id, delivery_status, created_at, edited_at, deleted_at FROM messages";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
