//! Call repository — call rows, participants, media flags.
//!
//! Lifecycle transitions are compare-and-set updates: the `WHERE status`
//! clause makes each transition race-free, and the returned bool tells the
//! caller whether this invocation actually performed it.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use parley_core::ids::{CallId, ConversationId, UserId};
use parley_core::models::{Call, CallParticipant, CallStatus, CallType};

use crate::errors::Result;
use crate::sqlite::codec;

/// A per-participant media flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaFlag {
    /// Microphone muted.
    Muted,
    /// Camera off.
    VideoOff,
    /// Screen share active.
    ScreenSharing,
}

impl MediaFlag {
    fn column(self) -> &'static str {
        match self {
            Self::Muted => "is_muted",
            Self::VideoOff => "is_video_off",
            Self::ScreenSharing => "is_screen_sharing",
        }
    }
}

/// Call repository — stateless, every method takes `&Connection`.
pub struct CallRepo;

impl CallRepo {
    /// Insert a call row in the `initiated` state.
    pub fn create(
        conn: &Connection,
        conversation_id: Option<&ConversationId>,
        initiated_by: &UserId,
        call_type: CallType,
    ) -> Result<Call> {
        let id = CallId::new();
        let now = codec::now();
        let _ = conn.execute(
            "INSERT INTO calls (id, conversation_id, initiated_by, call_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                conversation_id.map(ConversationId::as_str),
                initiated_by.as_str(),
                call_type.as_str(),
                CallStatus::Initiated.as_str(),
                codec::fmt_ts(now),
            ],
        )?;

        Ok(Call {
            id,
            conversation_id: conversation_id.cloned(),
            initiated_by: initiated_by.clone(),
            call_type,
            status: CallStatus::Initiated,
            started_at: None,
            ended_at: None,
            created_at: now,
        })
    }

    /// Get a call by ID.
    pub fn get(conn: &Connection, call_id: &CallId) -> Result<Option<Call>> {
        let row = conn
            .query_row(
                "SELECT id, conversation_id, initiated_by, call_type, status,
                        started_at, ended_at, created_at
                 FROM calls WHERE id = ?1",
                params![call_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Transition `initiated` → `active` and stamp `started_at`.
    ///
    /// Returns `false` if the call is not in the `initiated` state (already
    /// active, already terminal, or unknown).
    pub fn activate(conn: &Connection, call_id: &CallId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE calls SET status = 'active', started_at = ?2
             WHERE id = ?1 AND status = 'initiated'",
            params![call_id.as_str(), codec::fmt_ts(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    /// Transition `initiated` → `declined`.
    pub fn decline(conn: &Connection, call_id: &CallId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE calls SET status = 'declined' WHERE id = ?1 AND status = 'initiated'",
            params![call_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Transition `initiated` → `missed` (ring timeout expired).
    pub fn mark_missed(conn: &Connection, call_id: &CallId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE calls SET status = 'missed' WHERE id = ?1 AND status = 'initiated'",
            params![call_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Transition `initiated` or `active` → `ended` and stamp `ended_at`.
    pub fn end(conn: &Connection, call_id: &CallId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE calls SET status = 'ended', ended_at = ?2
             WHERE id = ?1 AND status IN ('initiated', 'active')",
            params![call_id.as_str(), codec::fmt_ts(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    /// Add a participant row, or re-join if they previously left.
    pub fn add_participant(conn: &Connection, call_id: &CallId, user_id: &UserId) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO call_participants (call_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(call_id, user_id) DO UPDATE SET left_at = NULL",
            params![
                call_id.as_str(),
                user_id.as_str(),
                codec::fmt_ts(Utc::now())
            ],
        )?;
        Ok(())
    }

    /// Stamp a participant's `left_at`. The row survives (append-only).
    pub fn leave(conn: &Connection, call_id: &CallId, user_id: &UserId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE call_participants SET left_at = ?3
             WHERE call_id = ?1 AND user_id = ?2 AND left_at IS NULL",
            params![
                call_id.as_str(),
                user_id.as_str(),
                codec::fmt_ts(Utc::now())
            ],
        )?;
        Ok(changed > 0)
    }

    /// Set one media flag, leaving the others untouched.
    ///
    /// Returns the updated participant row, or `None` if the user is not in
    /// the call.
    pub fn set_media_flag(
        conn: &Connection,
        call_id: &CallId,
        user_id: &UserId,
        flag: MediaFlag,
        value: bool,
    ) -> Result<Option<CallParticipant>> {
        let changed = conn.execute(
            &format!(
                "UPDATE call_participants SET {} = ?3 WHERE call_id = ?1 AND user_id = ?2",
                flag.column()
            ),
            params![call_id.as_str(), user_id.as_str(), i32::from(value)],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::participant(conn, call_id, user_id)
    }

    /// Get a single participant row.
    pub fn participant(
        conn: &Connection,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<Option<CallParticipant>> {
        let row = conn
            .query_row(
                "SELECT call_id, user_id, joined_at, left_at, is_muted, is_video_off, is_screen_sharing
                 FROM call_participants WHERE call_id = ?1 AND user_id = ?2",
                params![call_id.as_str(), user_id.as_str()],
                Self::map_participant,
            )
            .optional()?;
        Ok(row)
    }

    /// All participant rows of a call, in join order.
    pub fn participants_of(conn: &Connection, call_id: &CallId) -> Result<Vec<CallParticipant>> {
        let mut stmt = conn.prepare(
            "SELECT call_id, user_id, joined_at, left_at, is_muted, is_video_off, is_screen_sharing
             FROM call_participants WHERE call_id = ?1 ORDER BY joined_at",
        )?;
        let rows = stmt
            .query_map(params![call_id.as_str()], Self::map_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Call> {
        Ok(Call {
            id: CallId::from(row.get::<_, String>(0)?),
            conversation_id: row.get::<_, Option<String>>(1)?.map(ConversationId::from),
            initiated_by: UserId::from(row.get::<_, String>(2)?),
            call_type: codec::text_enum(3, &row.get::<_, String>(3)?)?,
            status: codec::text_enum(4, &row.get::<_, String>(4)?)?,
            started_at: codec::opt_ts(5, row.get(5)?)?,
            ended_at: codec::opt_ts(6, row.get(6)?)?,
            created_at: codec::ts(7, &row.get::<_, String>(7)?)?,
        })
    }

    fn map_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallParticipant> {
        Ok(CallParticipant {
            call_id: CallId::from(row.get::<_, String>(0)?),
            user_id: UserId::from(row.get::<_, String>(1)?),
            joined_at: codec::ts(2, &row.get::<_, String>(2)?)?,
            left_at: codec::opt_ts(3, row.get(3)?)?,
            is_muted: row.get::<_, i64>(4)? != 0,
            is_video_off: row.get::<_, i64>(5)? != 0,
            is_screen_sharing: row.get::<_, i64>(6)? != 0,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
