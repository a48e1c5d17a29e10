//! Presence tracking: persist status changes and tell the user's contacts.
//!
//! A contact is anyone sharing at least one conversation with the user.
//! The status change is never echoed back to the user themselves.

use std::sync::Arc;

use metrics::gauge;
use tracing::{debug, warn};

use parley_core::events::ServerEvent;
use parley_core::ids::UserId;
use parley_core::models::PresenceStatus;
use parley_store::ChatStore;

use crate::metrics::USERS_ONLINE;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::ConnectionRegistry;

/// Persist a presence change and broadcast it to the user's contacts.
pub async fn set_status(
    store: &ChatStore,
    broadcaster: &Broadcaster,
    registry: &Arc<ConnectionRegistry>,
    user_id: &UserId,
    status: PresenceStatus,
) {
    match store.set_presence(user_id, status) {
        Ok(true) => {}
        Ok(false) => {
            debug!(user_id = %user_id, "presence change for unknown user, ignoring");
            return;
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "failed to persist presence change");
            return;
        }
    }

    let contacts = match store.contact_ids_of(user_id) {
        Ok(contacts) => contacts,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "failed to resolve contacts for presence broadcast");
            return;
        }
    };

    let event = ServerEvent::UserStatusChanged {
        user_id: user_id.clone(),
        status,
    };
    broadcaster.send_to_users(&contacts, Some(user_id), &event).await;

    #[allow(clippy::cast_precision_loss)]
    gauge!(USERS_ONLINE).set(registry.online_user_count().await as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::websocket::connection::ClientConnection;

    async fn online(
        registry: &ConnectionRegistry,
        user: &UserId,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(format!("conn_{user}"), tx));
        conn.bind_user(user.clone());
        registry.add(conn.clone()).await;
        let _ = registry.bind_user(user.clone(), conn).await;
        rx
    }

    #[tokio::test]
    async fn status_change_reaches_contacts_but_not_self() {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let alice = store.create_user("alice").unwrap().id;
        let bob = store.create_user("bob").unwrap().id;
        let stranger = store.create_user("stranger").unwrap().id;
        let _ = store.find_or_create_direct(&alice, &bob).unwrap();

        let registry = Arc::new(ConnectionRegistry::new());
        let mut alice_rx = online(&registry, &alice).await;
        let mut bob_rx = online(&registry, &bob).await;
        let mut stranger_rx = online(&registry, &stranger).await;

        let broadcaster = Broadcaster::new(registry.clone(), store.clone(), 100);
        set_status(&store, &broadcaster, &registry, &alice, PresenceStatus::Online).await;

        let frame = bob_rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "user-status-changed");
        assert_eq!(parsed["payload"]["userId"], alice.as_str());
        assert_eq!(parsed["payload"]["status"], "online");

        // Neither the actor nor an unrelated user hears about it.
        assert!(alice_rx.try_recv().is_err());
        assert!(stranger_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_change_persists() {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let alice = store.create_user("alice").unwrap().id;
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), store.clone(), 100);

        set_status(&store, &broadcaster, &registry, &alice, PresenceStatus::Busy).await;
        let user = store.get_user(&alice).unwrap().unwrap();
        assert_eq!(user.status, PresenceStatus::Busy);
    }

    #[tokio::test]
    async fn unknown_user_is_a_no_op() {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), store.clone(), 100);
        set_status(&store, &broadcaster, &registry, &UserId::from("ghost"), PresenceStatus::Online)
            .await;
    }
}
