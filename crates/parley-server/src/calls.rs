//! Call lifecycle: ringing, accept/decline, ring timeout, hang-up, and
//! per-participant media flags.
//!
//! All transitions are compare-and-swap updates in the store, so a late
//! decline of an already-active call, or a ring timer racing an accept,
//! resolves to exactly one winner. Only the winner broadcasts.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::events::ServerEvent;
use parley_core::ids::{CallId, ConversationId, UserId};
use parley_core::models::{Call, CallParticipant, CallType};
use parley_store::{ChatStore, MediaFlag, StoreError};

use crate::metrics::{CALLS_ACTIVE, CALLS_TOTAL, CALL_DURATION_SECONDS};
use crate::websocket::broadcast::Broadcaster;

type Result<T> = std::result::Result<T, StoreError>;

/// Drives call state transitions and the resulting event fan-out.
///
/// The manager is the only mutator of call state; both the WebSocket router
/// and the REST handlers go through it.
pub struct CallManager {
    store: Arc<ChatStore>,
    broadcaster: Arc<Broadcaster>,
    /// How long a call rings before it is marked missed.
    ring_timeout: Duration,
    /// Ring timers wind down when this fires.
    shutdown: CancellationToken,
}

impl CallManager {
    /// Create a call manager.
    pub fn new(
        store: Arc<ChatStore>,
        broadcaster: Arc<Broadcaster>,
        ring_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            broadcaster,
            ring_timeout,
            shutdown,
        }
    }

    /// Start a call and ring the other conversation members.
    ///
    /// Ad-hoc calls (no conversation) ring nobody at start; callees are
    /// added as they join and only they hear subsequent lifecycle events.
    pub async fn start_call(
        self: &Arc<Self>,
        actor: &UserId,
        conversation_id: Option<&ConversationId>,
        call_type: CallType,
    ) -> Result<Call> {
        let call = self.store.create_call(conversation_id, actor, call_type)?;
        info!(call_id = %call.id, initiator = %actor, call_type = %call_type, "call started");
        counter!(CALLS_TOTAL, "type" => call_type.as_str()).increment(1);

        if let Some(conversation_id) = &call.conversation_id {
            let event = ServerEvent::IncomingCall {
                call: call.clone(),
                initiator: actor.clone(),
            };
            self.broadcaster
                .send_to_conversation(conversation_id, Some(actor), &event)
                .await;
        }

        self.spawn_ring_timer(call.id.clone());
        Ok(call)
    }

    /// Accept a ringing (or already active) call.
    pub async fn accept_call(&self, actor: &UserId, call_id: &CallId) -> Result<Call> {
        let (call, transitioned) = self.store.accept_call(call_id, actor)?;
        if transitioned {
            info!(call_id = %call_id, user_id = %actor, "call active");
            gauge!(CALLS_ACTIVE).increment(1.0);
        }

        // Everyone hears this, the accepter included: all parties need to
        // know who joined.
        let event = ServerEvent::CallAccepted {
            call_id: call_id.clone(),
            user_id: actor.clone(),
        };
        self.fan_out(&call, None, &event).await;
        Ok(call)
    }

    /// Decline a ringing call. Declining a call that already left the
    /// ringing state changes nothing and tells nobody.
    pub async fn decline_call(&self, actor: &UserId, call_id: &CallId) -> Result<Call> {
        let transitioned = self.store.decline_call(call_id)?;
        let call = self
            .store
            .get_call(call_id)?
            .ok_or_else(|| StoreError::CallNotFound(call_id.to_string()))?;
        if !transitioned {
            debug!(call_id = %call_id, "decline lost the race, ignoring");
            return Ok(call);
        }
        info!(call_id = %call_id, user_id = %actor, "call declined");

        let event = ServerEvent::CallDeclined {
            call_id: call_id.clone(),
            user_id: actor.clone(),
        };
        self.fan_out(&call, Some(actor), &event).await;
        Ok(call)
    }

    /// Hang up a call. The first hang-up ends it for everyone.
    pub async fn end_call(&self, actor: &UserId, call_id: &CallId) -> Result<Call> {
        let (call, transitioned) = self.store.end_call(call_id)?;
        if !transitioned {
            debug!(call_id = %call_id, "call already ended, ignoring");
            return Ok(call);
        }
        if let Err(e) = self.store.leave_call(call_id, actor) {
            debug!(call_id = %call_id, error = %e, "failed to record leave on hang-up");
        }

        let duration = call.duration_secs();
        info!(call_id = %call_id, ended_by = %actor, duration_secs = duration, "call ended");
        if call.started_at.is_some() {
            gauge!(CALLS_ACTIVE).decrement(1.0);
            #[allow(clippy::cast_precision_loss)]
            histogram!(CALL_DURATION_SECONDS).record(duration as f64);
        }

        // The ender hears this too, so every client tears down in lockstep.
        let event = ServerEvent::CallEnded {
            call_id: call_id.clone(),
            ended_by: actor.clone(),
            duration,
        };
        self.fan_out(&call, None, &event).await;
        Ok(call)
    }

    /// Flip one of the actor's media flags, leaving the other two alone,
    /// and tell the rest of the call.
    ///
    /// Returns `None` when the actor is not a participant of the call.
    pub async fn toggle_media(
        &self,
        actor: &UserId,
        call_id: &CallId,
        flag: MediaFlag,
        value: bool,
    ) -> Result<Option<CallParticipant>> {
        let Some(participant) = self.store.set_media_flag(call_id, actor, flag, value)? else {
            debug!(call_id = %call_id, user_id = %actor,
                "media toggle from non-participant, ignoring");
            return Ok(None);
        };

        let call = self
            .store
            .get_call(call_id)?
            .ok_or_else(|| StoreError::CallNotFound(call_id.to_string()))?;
        let event = ServerEvent::ParticipantMediaChanged {
            call_id: call_id.clone(),
            user_id: actor.clone(),
            is_muted: participant.is_muted,
            is_video_off: participant.is_video_off,
            is_screen_sharing: participant.is_screen_sharing,
        };
        self.fan_out(&call, Some(actor), &event).await;
        Ok(Some(participant))
    }

    /// Time out a still-ringing call after [`Self::ring_timeout`].
    ///
    /// The CAS in the store means an accept or decline that lands first
    /// wins and the timer does nothing.
    fn spawn_ring_timer(self: &Arc<Self>, call_id: CallId) {
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(manager.ring_timeout) => {}
                () = shutdown.cancelled() => return,
            }

            match manager.store.mark_call_missed(&call_id) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(call_id = %call_id, error = %e, "ring timer failed to mark call missed");
                    return;
                }
            }
            info!(call_id = %call_id, "call missed");

            let call = match manager.store.get_call(&call_id) {
                Ok(Some(call)) => call,
                Ok(None) => return,
                Err(e) => {
                    warn!(call_id = %call_id, error = %e, "failed to load missed call");
                    return;
                }
            };
            // The initiator hears this too: their client stops ringing.
            let event = ServerEvent::CallMissed { call_id };
            manager.fan_out(&call, None, &event).await;
        }));
    }

    /// Everyone who should hear lifecycle events for this call: the
    /// conversation members, or for an ad-hoc call, whoever has joined.
    fn audience(&self, call: &Call) -> Result<Vec<UserId>> {
        match &call.conversation_id {
            Some(conversation_id) => self.store.participant_user_ids(conversation_id),
            None => Ok(self
                .store
                .call_participants(&call.id)?
                .into_iter()
                .map(|p| p.user_id)
                .collect()),
        }
    }

    async fn fan_out(&self, call: &Call, exclude: Option<&UserId>, event: &ServerEvent) {
        match self.audience(call) {
            Ok(audience) => self.broadcaster.send_to_users(&audience, exclude, event).await,
            Err(e) => {
                warn!(call_id = %call.id, error = %e, "failed to resolve call audience");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use parley_core::models::CallStatus;

    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::ConnectionRegistry;

    struct Harness {
        store: Arc<ChatStore>,
        registry: Arc<ConnectionRegistry>,
        manager: Arc<CallManager>,
    }

    fn harness(ring_timeout: Duration) -> Harness {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), store.clone(), 100));
        let manager = Arc::new(CallManager::new(
            store.clone(),
            broadcaster,
            ring_timeout,
            CancellationToken::new(),
        ));
        Harness {
            store,
            registry,
            manager,
        }
    }

    impl Harness {
        async fn online(&self, user: &UserId) -> mpsc::Receiver<Arc<String>> {
            let (tx, rx) = mpsc::channel(32);
            let conn = Arc::new(ClientConnection::new(format!("conn_{user}"), tx));
            conn.bind_user(user.clone());
            self.registry.add(conn.clone()).await;
            let _ = self.registry.bind_user(user.clone(), conn).await;
            rx
        }
    }

    fn parse(frame: &Arc<String>) -> serde_json::Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn start_call_rings_other_members_only() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();

        let mut alice_rx = h.online(&alice).await;
        let mut bob_rx = h.online(&bob).await;

        let call = h
            .manager
            .start_call(&alice, Some(&conv.id), CallType::Video)
            .await
            .unwrap();
        assert_eq!(call.status, CallStatus::Initiated);

        let frame = bob_rx.try_recv().unwrap();
        let parsed = parse(&frame);
        assert_eq!(parsed["type"], "incoming-call");
        assert_eq!(parsed["payload"]["initiator"], alice.as_str());
        assert_eq!(parsed["payload"]["call"]["callType"], "video");
        assert_eq!(parsed["payload"]["call"]["status"], "initiated");

        // The initiator does not ring themselves.
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn starting_a_call_in_a_foreign_conversation_fails() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let mallory = h.store.create_user("mallory").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();

        let result = h
            .manager
            .start_call(&mallory, Some(&conv.id), CallType::Voice)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ad_hoc_call_rings_nobody() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let _ = h.store.find_or_create_direct(&alice, &bob).unwrap();

        let mut bob_rx = h.online(&bob).await;
        let call = h.manager.start_call(&alice, None, CallType::Voice).await.unwrap();
        assert!(call.conversation_id.is_none());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accept_notifies_every_party_and_activates() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Voice).unwrap();

        let mut alice_rx = h.online(&alice).await;
        let mut bob_rx = h.online(&bob).await;

        let accepted = h.manager.accept_call(&bob, &call.id).await.unwrap();
        assert_eq!(accepted.status, CallStatus::Active);
        assert!(accepted.started_at.is_some());

        // All parties learn who joined, the accepter included.
        for rx in [&mut alice_rx, &mut bob_rx] {
            let parsed = parse(&rx.try_recv().unwrap());
            assert_eq!(parsed["type"], "call-accepted");
            assert_eq!(parsed["payload"]["userId"], bob.as_str());
        }
    }

    #[tokio::test]
    async fn decline_notifies_others() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Voice).unwrap();

        let mut alice_rx = h.online(&alice).await;
        let declined = h.manager.decline_call(&bob, &call.id).await.unwrap();
        assert_eq!(declined.status, CallStatus::Declined);

        let frame = alice_rx.try_recv().unwrap();
        let parsed = parse(&frame);
        assert_eq!(parsed["type"], "call-declined");
        assert_eq!(parsed["payload"]["userId"], bob.as_str());
    }

    #[tokio::test]
    async fn decline_after_accept_is_a_no_op() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Voice).unwrap();

        let _ = h.manager.accept_call(&bob, &call.id).await.unwrap();
        let mut alice_rx = h.online(&alice).await;
        let unchanged = h.manager.decline_call(&bob, &call.id).await.unwrap();

        assert_eq!(unchanged.status, CallStatus::Active);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn end_broadcasts_duration_to_everyone_once() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Voice).unwrap();
        let _ = h.store.accept_call(&call.id, &bob).unwrap();

        let mut alice_rx = h.online(&alice).await;
        let mut bob_rx = h.online(&bob).await;

        let ended = h.manager.end_call(&alice, &call.id).await.unwrap();
        assert_eq!(ended.status, CallStatus::Ended);
        // Both sides tear down, the ender included.
        for rx in [&mut alice_rx, &mut bob_rx] {
            let parsed = parse(&rx.try_recv().unwrap());
            assert_eq!(parsed["type"], "call-ended");
            assert_eq!(parsed["payload"]["endedBy"], alice.as_str());
            assert!(parsed["payload"]["duration"].as_i64().unwrap() >= 0);
        }

        // The second hang-up changes nothing and says nothing.
        let _ = h.manager.end_call(&bob, &call.id).await.unwrap();
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ending_a_never_answered_call_reports_zero_duration() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Voice).unwrap();

        let mut bob_rx = h.online(&bob).await;
        let ended = h.manager.end_call(&alice, &call.id).await.unwrap();
        assert_eq!(ended.duration_secs(), 0);

        let frame = bob_rx.try_recv().unwrap();
        let parsed = parse(&frame);
        assert_eq!(parsed["payload"]["duration"], 0);
    }

    #[tokio::test]
    async fn media_toggle_changes_one_flag_and_notifies_others() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Video).unwrap();
        let _ = h.store.accept_call(&call.id, &bob).unwrap();

        let mut bob_rx = h.online(&bob).await;
        let me = h
            .manager
            .toggle_media(&alice, &call.id, MediaFlag::Muted, true)
            .await
            .unwrap()
            .unwrap();
        assert!(me.is_muted);
        assert!(!me.is_video_off);
        assert!(!me.is_screen_sharing);

        let frame = bob_rx.try_recv().unwrap();
        let parsed = parse(&frame);
        assert_eq!(parsed["type"], "participant-media-changed");
        assert_eq!(parsed["payload"]["userId"], alice.as_str());
        assert_eq!(parsed["payload"]["isMuted"], true);
        assert_eq!(parsed["payload"]["isVideoOff"], false);
        assert_eq!(parsed["payload"]["isScreenSharing"], false);
    }

    #[tokio::test]
    async fn media_toggle_from_non_participant_is_dropped() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = h.store.create_call(Some(&conv.id), &alice, CallType::Video).unwrap();

        let mut alice_rx = h.online(&alice).await;
        // bob never joined the call.
        let result = h
            .manager
            .toggle_media(&bob, &call.id, MediaFlag::VideoOff, true)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unanswered_call_is_missed_after_ring_timeout() {
        let h = harness(Duration::from_millis(50));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();

        let mut alice_rx = h.online(&alice).await;
        let mut bob_rx = h.online(&bob).await;

        let _ = h
            .manager
            .start_call(&alice, Some(&conv.id), CallType::Voice)
            .await
            .unwrap();
        let _ = bob_rx.try_recv(); // incoming-call
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Both sides hear the miss, the initiator included.
        let alice_frame = alice_rx.try_recv().unwrap();
        assert_eq!(parse(&alice_frame)["type"], "call-missed");
        let bob_frame = bob_rx.try_recv().unwrap();
        assert_eq!(parse(&bob_frame)["type"], "call-missed");
    }

    #[tokio::test]
    async fn accept_beats_ring_timer() {
        let h = harness(Duration::from_millis(50));
        let alice = h.store.create_user("alice").unwrap().id;
        let bob = h.store.create_user("bob").unwrap().id;
        let (conv, _) = h.store.find_or_create_direct(&alice, &bob).unwrap();

        let mut bob_rx = h.online(&bob).await;
        let call = h
            .manager
            .start_call(&alice, Some(&conv.id), CallType::Voice)
            .await
            .unwrap();
        let _ = bob_rx.try_recv(); // incoming-call

        let _ = h.manager.accept_call(&bob, &call.id).await.unwrap();
        let accepted = parse(&bob_rx.try_recv().unwrap());
        assert_eq!(accepted["type"], "call-accepted");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let call = h.store.get_call(&call.id).unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Active);
        // No call-missed frame for anyone.
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_call_ids_are_errors() {
        let h = harness(Duration::from_secs(45));
        let alice = h.store.create_user("alice").unwrap().id;
        let ghost = CallId::from("no-such-call");
        assert!(h.manager.accept_call(&alice, &ghost).await.is_err());
        assert!(h.manager.decline_call(&alice, &ghost).await.is_err());
        assert!(h.manager.end_call(&alice, &ghost).await.is_err());
        // A toggle against an unknown call simply matches no participant.
        let toggled = h
            .manager
            .toggle_media(&alice, &ghost, MediaFlag::Muted, true)
            .await
            .unwrap();
        assert!(toggled.is_none());
    }
}
