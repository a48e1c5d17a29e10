//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_core::events::ServerEvent;
use parley_core::ids::UserId;

/// Represents a connected WebSocket client.
///
/// Starts unauthenticated; [`Self::bind_user`] moves it to the identified
/// state after a valid `identify` message. The eviction token is fired when
/// the server wants this connection gone (displaced by a newer connection
/// for the same user, or too slow to keep up).
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Bound user ID (set after `identify`).
    user_id: Mutex<Option<UserId>>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of events dropped due to a full channel.
    pub dropped_events: AtomicU64,
    /// Fired to force this connection closed.
    evict: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id: Mutex::new(None),
            tx,
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_events: AtomicU64::new(0),
            evict: CancellationToken::new(),
        }
    }

    /// Bind this connection to a user.
    pub fn bind_user(&self, user_id: UserId) {
        *self.user_id.lock() = Some(user_id);
    }

    /// Get the currently bound user ID.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.lock().clone()
    }

    /// Whether the connection has identified itself.
    pub fn is_identified(&self) -> bool {
        self.user_id.lock().is_some()
    }

    /// Enqueue a pre-serialized frame for the client.
    ///
    /// Never blocks. Returns `false` if the channel is full or closed, and
    /// increments the dropped-event counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_events.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize an event and enqueue it for the client.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total events dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the session task to close this connection.
    pub fn request_eviction(&self) {
        self.evict.cancel();
    }

    /// Whether eviction has been requested.
    pub fn is_evicted(&self) -> bool {
        self.evict.is_cancelled()
    }

    /// Token the session task selects on to notice eviction.
    pub fn eviction_token(&self) -> CancellationToken {
        self.evict.clone()
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last sign of life (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
