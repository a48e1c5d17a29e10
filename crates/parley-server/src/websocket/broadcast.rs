//! Event fan-out to connected WebSocket clients.
//!
//! Fire-and-forget: the event is serialized once, shared via `Arc`, and
//! enqueued on each recipient's bounded buffer without blocking. Offline
//! recipients are skipped; a full buffer drops the event for that client
//! only. A client that keeps dropping past its budget is evicted.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, warn};

use parley_core::events::ServerEvent;
use parley_core::ids::{ConversationId, UserId};
use parley_store::{ChatStore, StoreError};

use crate::metrics::{EVENTS_DROPPED_TOTAL, EVENTS_SENT_TOTAL, WS_EVICTIONS_TOTAL};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;

/// Resolves a conversation to the users who should receive its events.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// The member user IDs of a conversation.
    async fn member_ids(&self, conversation_id: &ConversationId)
    -> Result<Vec<UserId>, StoreError>;
}

#[async_trait]
impl MembershipResolver for ChatStore {
    async fn member_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<UserId>, StoreError> {
        self.participant_user_ids(conversation_id)
    }
}

/// Fans events out to the live connections of their recipients.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    resolver: Arc<dyn MembershipResolver>,
    /// Dropped-event budget before a slow client is evicted.
    max_send_drops: u64,
}

impl Broadcaster {
    /// Create a broadcaster over the registry and membership resolver.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        resolver: Arc<dyn MembershipResolver>,
        max_send_drops: u64,
    ) -> Self {
        Self {
            registry,
            resolver,
            max_send_drops,
        }
    }

    /// Send an event to a single user. Returns `false` if the user is
    /// offline or their buffer was full.
    pub async fn send_to_user(&self, user_id: &UserId, event: &ServerEvent) -> bool {
        let Some(frame) = serialize(event) else {
            return false;
        };
        let Some(conn) = self.registry.get(user_id).await else {
            debug!(user_id = %user_id, event_type = event.event_type(), "recipient offline, skipping");
            return false;
        };
        self.deliver(&conn, frame, event.event_type())
    }

    /// Send an event to a set of users, optionally excluding one (the
    /// actor who caused the event).
    pub async fn send_to_users(
        &self,
        user_ids: &[UserId],
        exclude: Option<&UserId>,
        event: &ServerEvent,
    ) {
        let Some(frame) = serialize(event) else {
            return;
        };
        let mut recipients = 0;
        for user_id in user_ids {
            if exclude == Some(user_id) {
                continue;
            }
            if let Some(conn) = self.registry.get(user_id).await {
                let _ = self.deliver(&conn, frame.clone(), event.event_type());
                recipients += 1;
            }
        }
        debug!(
            event_type = event.event_type(),
            recipients, "broadcast event"
        );
    }

    /// Send an event to every member of a conversation, optionally
    /// excluding the actor.
    ///
    /// A resolver failure is logged and the broadcast skipped; fan-out is
    /// fire-and-forget and never bubbles errors to the caller.
    pub async fn send_to_conversation(
        &self,
        conversation_id: &ConversationId,
        exclude: Option<&UserId>,
        event: &ServerEvent,
    ) {
        let members = match self.resolver.member_ids(conversation_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e,
                    "failed to resolve conversation members, skipping broadcast");
                return;
            }
        };
        self.send_to_users(&members, exclude, event).await;
    }

    /// Enqueue a frame, counting drops and evicting clients that blow
    /// their drop budget.
    fn deliver(&self, conn: &Arc<ClientConnection>, frame: Arc<String>, event_type: &'static str) -> bool {
        if conn.send(frame) {
            counter!(EVENTS_SENT_TOTAL, "type" => event_type).increment(1);
            return true;
        }
        counter!(EVENTS_DROPPED_TOTAL).increment(1);
        if conn.drop_count() > self.max_send_drops && !conn.is_evicted() {
            warn!(conn_id = %conn.id, drops = conn.drop_count(),
                "client too slow to keep up, evicting");
            counter!(WS_EVICTIONS_TOTAL, "reason" => "slow").increment(1);
            conn.request_eviction();
        }
        false
    }
}

fn serialize(event: &ServerEvent) -> Option<Arc<String>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
            None
        }
    }
}
