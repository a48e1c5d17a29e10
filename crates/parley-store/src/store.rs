//! High-level transactional [`ChatStore`] API.
//!
//! Composes repository operations into atomic, domain-centric methods.
//! Multi-step writes (direct conversation find-or-create, message insert
//! with activity bump, call creation with the initiator's participant row)
//! run inside a single `SQLite` transaction — callers never observe partial
//! state.

use chrono::Utc;

use parley_core::ids::{CallId, ConversationId, MessageId, UserId};
use parley_core::models::{
    Call, CallParticipant, CallType, Conversation, ConversationKind, Message, Participant,
    ParticipantRole, PresenceStatus, User,
};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{
    self, ConnectionConfig, ConnectionPool, PooledConnection,
};
use crate::sqlite::migrations;
use crate::sqlite::repositories::calls::{CallRepo, MediaFlag};
use crate::sqlite::repositories::conversations::ConversationRepo;
use crate::sqlite::repositories::messages::{MessageRepo, NewMessage};
use crate::sqlite::repositories::users::UserRepo;

/// High-level chat store wrapping a connection pool and all repositories.
pub struct ChatStore {
    pool: ConnectionPool,
}

impl ChatStore {
    /// Create a `ChatStore` over an existing pool. The caller is responsible
    /// for having run migrations.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store and run pending migrations.
    pub fn open(path: impl AsRef<std::path::Path>, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Open an in-memory store with migrations applied (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────

    /// Create a user with a unique username.
    pub fn create_user(&self, username: &str) -> Result<User> {
        let conn = self.conn()?;
        UserRepo::create(&conn, username)
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let conn = self.conn()?;
        UserRepo::get(&conn, user_id)
    }

    /// Look up a user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        UserRepo::get_by_username(&conn, username)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        UserRepo::list(&conn)
    }

    /// Update a user's presence and bump their last-seen stamp.
    pub fn set_presence(&self, user_id: &UserId, status: PresenceStatus) -> Result<bool> {
        let conn = self.conn()?;
        UserRepo::set_status(&conn, user_id, status)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────

    /// Find the direct conversation between two users, creating it if it
    /// does not exist yet.
    ///
    /// Returns the conversation and whether this call created it. Atomic:
    /// the lookup and the insert happen in one transaction, so two
    /// concurrent calls cannot produce a second pair conversation.
    pub fn find_or_create_direct(&self, a: &UserId, b: &UserId) -> Result<(Conversation, bool)> {
        if a == b {
            return Err(StoreError::InvalidOperation(
                "direct conversation requires two distinct users".into(),
            ));
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if let Some(existing) = ConversationRepo::find_direct(&tx, a, b)? {
            tx.commit()?;
            return Ok((existing, false));
        }

        for user_id in [a, b] {
            if UserRepo::get(&tx, user_id)?.is_none() {
                return Err(StoreError::UserNotFound(user_id.to_string()));
            }
        }

        let conv = ConversationRepo::create(&tx, ConversationKind::Direct, None, None, a)?;
        ConversationRepo::add_participant(&tx, &conv.id, a, ParticipantRole::Member)?;
        ConversationRepo::add_participant(&tx, &conv.id, b, ParticipantRole::Member)?;
        tx.commit()?;

        Ok((conv, true))
    }

    /// Create a group conversation. The creator becomes the owner; every
    /// listed member joins with the member role.
    pub fn create_group(
        &self,
        created_by: &UserId,
        name: &str,
        description: Option<&str>,
        members: &[UserId],
    ) -> Result<Conversation> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if UserRepo::get(&tx, created_by)?.is_none() {
            return Err(StoreError::UserNotFound(created_by.to_string()));
        }

        let conv =
            ConversationRepo::create(&tx, ConversationKind::Group, Some(name), description, created_by)?;
        ConversationRepo::add_participant(&tx, &conv.id, created_by, ParticipantRole::Owner)?;
        for member in members {
            if member == created_by {
                continue;
            }
            if UserRepo::get(&tx, member)?.is_none() {
                return Err(StoreError::UserNotFound(member.to_string()));
            }
            ConversationRepo::add_participant(&tx, &conv.id, member, ParticipantRole::Member)?;
        }
        tx.commit()?;

        Ok(conv)
    }

    /// Get a conversation by ID.
    pub fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        ConversationRepo::get(&conn, conversation_id)
    }

    /// List a user's conversations, most recently active first.
    pub fn conversations_of(&self, user_id: &UserId) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        ConversationRepo::list_for_user(&conn, user_id)
    }

    /// Update conversation metadata (`None` fields unchanged) and return the
    /// updated row.
    pub fn update_conversation(
        &self,
        conversation_id: &ConversationId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Conversation> {
        let conn = self.conn()?;
        if !ConversationRepo::update_meta(&conn, conversation_id, name, description)? {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        ConversationRepo::get(&conn, conversation_id)?
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Remove a user from a group conversation.
    ///
    /// Leaving a direct conversation is not allowed: the pair mapping is
    /// permanent.
    pub fn leave_conversation(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<()> {
        let conn = self.conn()?;
        let conv = ConversationRepo::get(&conn, conversation_id)?
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        if conv.kind == ConversationKind::Direct {
            return Err(StoreError::InvalidOperation(
                "cannot leave a direct conversation".into(),
            ));
        }
        if !ConversationRepo::remove_participant(&conn, conversation_id, user_id)? {
            return Err(StoreError::InvalidOperation(format!(
                "user {user_id} is not a participant of {conversation_id}"
            )));
        }
        Ok(())
    }

    /// All membership rows of a conversation.
    pub fn participants_of(&self, conversation_id: &ConversationId) -> Result<Vec<Participant>> {
        let conn = self.conn()?;
        ConversationRepo::participants_of(&conn, conversation_id)
    }

    /// The member user IDs of a conversation.
    pub fn participant_user_ids(&self, conversation_id: &ConversationId) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        ConversationRepo::participant_user_ids(&conn, conversation_id)
    }

    /// Whether the user is a member of the conversation.
    pub fn is_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool> {
        let conn = self.conn()?;
        ConversationRepo::is_participant(&conn, conversation_id, user_id)
    }

    /// Distinct users sharing at least one conversation with `user_id`.
    pub fn contact_ids_of(&self, user_id: &UserId) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        ConversationRepo::contact_ids_of(&conn, user_id)
    }

    /// Set a member's typing hint. Returns `false` (and stores nothing) if
    /// the user is not a member.
    pub fn set_typing(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<bool> {
        let conn = self.conn()?;
        ConversationRepo::set_typing(&conn, conversation_id, user_id, is_typing)
    }

    /// Advance the reader's read pointer and flip delivery status on
    /// everything up to (and including) `message_id`.
    pub fn mark_read(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        message_id: &MessageId,
    ) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if MessageRepo::get(&tx, message_id)?.is_none() {
            return Err(StoreError::MessageNotFound(message_id.to_string()));
        }
        if !ConversationRepo::mark_read(&tx, conversation_id, user_id, message_id, Utc::now())? {
            return Err(StoreError::InvalidOperation(format!(
                "user {user_id} is not a participant of {conversation_id}"
            )));
        }
        let _ = MessageRepo::mark_read_up_to(&tx, conversation_id, user_id, message_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Count messages the user has not read yet in a conversation.
    pub fn unread_count(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<i64> {
        let conn = self.conn()?;
        ConversationRepo::unread_count(&conn, conversation_id, user_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// Persist a message and bump the conversation's activity stamp and
    /// last-message pointer, atomically.
    ///
    /// The sender must be a participant of the conversation.
    pub fn create_message(&self, opts: &NewMessage<'_>) -> Result<Message> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if ConversationRepo::get(&tx, opts.conversation_id)?.is_none() {
            return Err(StoreError::ConversationNotFound(
                opts.conversation_id.to_string(),
            ));
        }
        if !ConversationRepo::is_participant(&tx, opts.conversation_id, opts.sender_id)? {
            return Err(StoreError::InvalidOperation(format!(
                "user {} is not a participant of {}",
                opts.sender_id, opts.conversation_id
            )));
        }

        let message = MessageRepo::create(&tx, opts)?;
        ConversationRepo::touch_activity(
            &tx,
            opts.conversation_id,
            &message.id,
            message.created_at,
        )?;
        tx.commit()?;

        Ok(message)
    }

    /// Get a message by ID.
    pub fn get_message(&self, message_id: &MessageId) -> Result<Option<Message>> {
        let conn = self.conn()?;
        MessageRepo::get(&conn, message_id)
    }

    /// List messages in a conversation, newest first, with optional cursor.
    pub fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: i64,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        MessageRepo::list(&conn, conversation_id, limit, before)
    }

    /// Edit a message's content.
    pub fn edit_message(&self, message_id: &MessageId, content: &str) -> Result<Message> {
        let conn = self.conn()?;
        MessageRepo::edit(&conn, message_id, content)
    }

    /// Tombstone a message.
    pub fn delete_message(&self, message_id: &MessageId) -> Result<Message> {
        let conn = self.conn()?;
        MessageRepo::tombstone(&conn, message_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────

    /// Create a call in the `initiated` state with the initiator already
    /// joined, atomically.
    pub fn create_call(
        &self,
        conversation_id: Option<&ConversationId>,
        initiated_by: &UserId,
        call_type: CallType,
    ) -> Result<Call> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if let Some(conv_id) = conversation_id {
            if !ConversationRepo::is_participant(&tx, conv_id, initiated_by)? {
                return Err(StoreError::InvalidOperation(format!(
                    "user {initiated_by} is not a participant of {conv_id}"
                )));
            }
        }

        let call = CallRepo::create(&tx, conversation_id, initiated_by, call_type)?;
        CallRepo::add_participant(&tx, &call.id, initiated_by)?;
        tx.commit()?;

        Ok(call)
    }

    /// Get a call by ID.
    pub fn get_call(&self, call_id: &CallId) -> Result<Option<Call>> {
        let conn = self.conn()?;
        CallRepo::get(&conn, call_id)
    }

    /// Accept a ringing call: transition to `active` and join the accepter.
    ///
    /// Returns the updated call and whether this acceptance performed the
    /// `initiated` → `active` transition (a later accepter joins an already
    /// active call and gets `false`).
    pub fn accept_call(&self, call_id: &CallId, user_id: &UserId) -> Result<(Call, bool)> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let call = CallRepo::get(&tx, call_id)?
            .ok_or_else(|| StoreError::CallNotFound(call_id.to_string()))?;
        if call.status.is_terminal() {
            return Err(StoreError::InvalidOperation(format!(
                "call {call_id} is already {}",
                call.status
            )));
        }

        let transitioned = CallRepo::activate(&tx, call_id)?;
        CallRepo::add_participant(&tx, call_id, user_id)?;
        let updated = CallRepo::get(&tx, call_id)?
            .ok_or_else(|| StoreError::CallNotFound(call_id.to_string()))?;
        tx.commit()?;

        Ok((updated, transitioned))
    }

    /// Decline a ringing call. Returns `true` if this call performed the
    /// transition.
    pub fn decline_call(&self, call_id: &CallId) -> Result<bool> {
        let conn = self.conn()?;
        CallRepo::decline(&conn, call_id)
    }

    /// Mark a still-ringing call as missed (ring timeout). Returns `true`
    /// if this call performed the transition.
    pub fn mark_call_missed(&self, call_id: &CallId) -> Result<bool> {
        let conn = self.conn()?;
        CallRepo::mark_missed(&conn, call_id)
    }

    /// End a call. Returns the updated call and whether this invocation
    /// performed the transition.
    pub fn end_call(&self, call_id: &CallId) -> Result<(Call, bool)> {
        let conn = self.conn()?;
        let transitioned = CallRepo::end(&conn, call_id)?;
        let call = CallRepo::get(&conn, call_id)?
            .ok_or_else(|| StoreError::CallNotFound(call_id.to_string()))?;
        Ok((call, transitioned))
    }

    /// Stamp a participant's departure from a call.
    pub fn leave_call(&self, call_id: &CallId, user_id: &UserId) -> Result<bool> {
        let conn = self.conn()?;
        CallRepo::leave(&conn, call_id, user_id)
    }

    /// Set one media flag on a call participant, leaving the others alone.
    pub fn set_media_flag(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        flag: MediaFlag,
        value: bool,
    ) -> Result<Option<CallParticipant>> {
        let conn = self.conn()?;
        CallRepo::set_media_flag(&conn, call_id, user_id, flag, value)
    }

    /// All participant rows of a call.
    pub fn call_participants(&self, call_id: &CallId) -> Result<Vec<CallParticipant>> {
        let conn = self.conn()?;
        CallRepo::participants_of(&conn, call_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::models::{CallStatus, DeliveryStatus, MessageType};

    fn store() -> ChatStore {
        ChatStore::in_memory().unwrap()
    }

    fn post(store: &ChatStore, conv: &ConversationId, sender: &UserId, content: &str) -> Message {
        store
            .create_message(&NewMessage {
                conversation_id: conv,
                sender_id: sender,
                content,
                message_type: MessageType::Text,
                attachments: &[],
                reply_to_id: None,
            })
            .unwrap()
    }

    #[test]
    fn direct_conversation_is_created_once() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;

        let (first, created) = store.find_or_create_direct(&alice, &bob).unwrap();
        assert!(created);

        // Same pair in either order resolves to the same conversation.
        let (second, created) = store.find_or_create_direct(&bob, &alice).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn direct_conversation_requires_distinct_users() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let err = store.find_or_create_direct(&alice, &alice).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn direct_conversation_requires_existing_users() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let err = store
            .find_or_create_direct(&alice, &UserId::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }

    #[test]
    fn group_creator_is_owner() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;

        let conv = store
            .create_group(&alice, "team", Some("the team"), &[bob.clone()])
            .unwrap();

        let participants = store.participants_of(&conv.id).unwrap();
        assert_eq!(participants.len(), 2);
        let alice_row = participants.iter().find(|p| p.user_id == alice).unwrap();
        assert_eq!(alice_row.role, ParticipantRole::Owner);
        let bob_row = participants.iter().find(|p| p.user_id == bob).unwrap();
        assert_eq!(bob_row.role, ParticipantRole::Member);
    }

    #[test]
    fn group_membership_dedupes_creator() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let conv = store
            .create_group(&alice, "solo", None, &[alice.clone()])
            .unwrap();
        assert_eq!(store.participants_of(&conv.id).unwrap().len(), 1);
    }

    #[test]
    fn message_bumps_conversation_activity() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let message = post(&store, &conv.id, &alice, "hello");

        let fetched = store.get_conversation(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.last_message_id.as_ref(), Some(&message.id));
        assert!(fetched.last_activity_at >= conv.last_activity_at);
    }

    #[test]
    fn non_participant_cannot_post() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let mallory = store.create_user("mallory").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let err = store
            .create_message(&NewMessage {
                conversation_id: &conv.id,
                sender_id: &mallory,
                content: "let me in",
                message_type: MessageType::Text,
                attachments: &[],
                reply_to_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn cannot_leave_direct_conversation() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let err = store.leave_conversation(&conv.id, &bob).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn mark_read_clears_unread_count() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let _ = post(&store, &conv.id, &alice, "one");
        let latest = post(&store, &conv.id, &alice, "two");

        assert_eq!(store.unread_count(&conv.id, &bob).unwrap(), 2);
        // The sender has nothing unread from themself.
        assert_eq!(store.unread_count(&conv.id, &alice).unwrap(), 0);

        store.mark_read(&conv.id, &bob, &latest.id).unwrap();
        assert_eq!(store.unread_count(&conv.id, &bob).unwrap(), 0);

        let fetched = store.get_message(&latest.id).unwrap().unwrap();
        assert_eq!(fetched.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn deleted_messages_do_not_count_as_unread() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let message = post(&store, &conv.id, &alice, "oops");
        assert_eq!(store.unread_count(&conv.id, &bob).unwrap(), 1);

        let _ = store.delete_message(&message.id).unwrap();
        assert_eq!(store.unread_count(&conv.id, &bob).unwrap(), 0);
    }

    #[test]
    fn call_creation_joins_initiator() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let (conv, _) = store.find_or_create_direct(&alice, &bob).unwrap();

        let call = store
            .create_call(Some(&conv.id), &alice, CallType::Video)
            .unwrap();
        assert_eq!(call.status, CallStatus::Initiated);

        let participants = store.call_participants(&call.id).unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].user_id, alice);
    }

    #[test]
    fn accept_transitions_once() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let carol = store.create_user("carol").unwrap().id;
        let call = store.create_call(None, &alice, CallType::Voice).unwrap();

        let (active, transitioned) = store.accept_call(&call.id, &bob).unwrap();
        assert!(transitioned);
        assert_eq!(active.status, CallStatus::Active);
        assert!(active.started_at.is_some());

        // Carol joins the already-active call.
        let (still_active, transitioned) = store.accept_call(&call.id, &carol).unwrap();
        assert!(!transitioned);
        assert_eq!(still_active.started_at, active.started_at);
        assert_eq!(store.call_participants(&call.id).unwrap().len(), 3);
    }

    #[test]
    fn accepting_a_terminal_call_fails() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let call = store.create_call(None, &alice, CallType::Voice).unwrap();

        assert!(store.decline_call(&call.id).unwrap());
        let err = store.accept_call(&call.id, &bob).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn ring_timeout_loses_to_earlier_transition() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let call = store.create_call(None, &alice, CallType::Voice).unwrap();

        let _ = store.accept_call(&call.id, &bob).unwrap();
        // The timer fires after the call went active: no-op.
        assert!(!store.mark_call_missed(&call.id).unwrap());
        assert_eq!(
            store.get_call(&call.id).unwrap().unwrap().status,
            CallStatus::Active
        );
    }

    #[test]
    fn end_call_reports_duration() {
        let store = store();
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let call = store.create_call(None, &alice, CallType::Voice).unwrap();
        let _ = store.accept_call(&call.id, &bob).unwrap();

        let (ended, transitioned) = store.end_call(&call.id).unwrap();
        assert!(transitioned);
        assert_eq!(ended.status, CallStatus::Ended);
        assert!(ended.ended_at.is_some());

        // Second hang-up does not transition again.
        let (_, transitioned) = store.end_call(&call.id).unwrap();
        assert!(!transitioned);
    }
}
