//! Connection registry — the single source of truth for who is connected.
//!
//! Invariant: at most one live connection per user. Binding a user to a new
//! connection returns the displaced one so the caller can evict it.
//! Unregistration is compare-and-remove: a connection can only remove the
//! user mapping if it still owns it, so a slow close of an old connection
//! never clobbers the user's newer one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use parley_core::ids::UserId;

use super::connection::ClientConnection;

#[derive(Default)]
struct Inner {
    /// All live connections, identified or not, by connection ID.
    by_conn: HashMap<String, Arc<ClientConnection>>,
    /// Identified connections by user. At most one entry per user.
    by_user: HashMap<UserId, Arc<ClientConnection>>,
}

/// Tracks live connections and the user → connection mapping.
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Track a freshly upgraded (not yet identified) connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut inner = self.inner.write().await;
        let _ = inner.by_conn.insert(connection.id.clone(), connection);
    }

    /// Bind a user to a connection, returning the connection this user was
    /// previously bound to (if any, and if it is not the same one).
    ///
    /// The caller owns evicting the displaced connection.
    pub async fn bind_user(
        &self,
        user_id: UserId,
        connection: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        let mut inner = self.inner.write().await;
        let displaced = inner.by_user.insert(user_id.clone(), connection.clone());
        match displaced {
            Some(prior) if !Arc::ptr_eq(&prior, &connection) => {
                debug!(user_id = %user_id, old_conn = %prior.id, new_conn = %connection.id,
                    "user rebound to newer connection");
                Some(prior)
            }
            _ => None,
        }
    }

    /// Remove a connection.
    ///
    /// The user mapping is removed only if this exact connection still owns
    /// it. Returns `true` when the user mapping was removed, meaning the
    /// caller should run the user's disconnect side effects (presence, etc.).
    pub async fn unregister(&self, connection: &Arc<ClientConnection>) -> bool {
        let mut inner = self.inner.write().await;
        let _ = inner.by_conn.remove(&connection.id);

        let Some(user_id) = connection.user_id() else {
            return false;
        };
        let owns_mapping = inner
            .by_user
            .get(&user_id)
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if owns_mapping {
            let _ = inner.by_user.remove(&user_id);
        }
        owns_mapping
    }

    /// Get the live connection of a user.
    pub async fn get(&self, user_id: &UserId) -> Option<Arc<ClientConnection>> {
        self.inner.read().await.by_user.get(user_id).cloned()
    }

    /// Whether the user currently has a live, identified connection.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.read().await.by_user.contains_key(user_id)
    }

    /// Number of live connections (identified or not).
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_conn.len()
    }

    /// Number of users with an identified connection.
    pub async fn online_user_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
