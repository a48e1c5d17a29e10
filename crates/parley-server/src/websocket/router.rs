//! Inbound frame routing.
//!
//! Every text frame is parsed against the closed [`ClientMessage`] set.
//! Anything that fails to parse is dropped silently (counted, logged at
//! debug). A connection must identify before any other message is honored;
//! early frames are dropped the same way. The WebSocket is fire-and-forget
//! in both directions: no acks, no error replies.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use parley_core::events::{ClientMessage, ServerEvent};
use parley_core::ids::{ConversationId, UserId};
use parley_core::models::PresenceStatus;
use parley_store::MediaFlag;

use crate::metrics::{WS_EVICTIONS_TOTAL, WS_MALFORMED_TOTAL, WS_MESSAGES_TOTAL};
use crate::presence;
use crate::server::AppState;
use crate::signaling::{self, SignalKind};

use super::connection::ClientConnection;

/// Handle one inbound text frame.
pub async fn handle_frame(state: &AppState, conn: &Arc<ClientConnection>, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(conn_id = %conn.id, error = %e, "malformed frame, dropping");
            counter!(WS_MALFORMED_TOTAL).increment(1);
            return;
        }
    };
    counter!(WS_MESSAGES_TOTAL).increment(1);

    if let ClientMessage::Identify { user_id } = &message {
        identify(state, conn, user_id.clone()).await;
        return;
    }

    // Everything else requires an identified connection.
    let Some(actor) = conn.user_id() else {
        debug!(conn_id = %conn.id, "frame before identify, dropping");
        return;
    };

    match message {
        ClientMessage::Identify { .. } => unreachable!("handled above"),
        ClientMessage::Typing {
            conversation_id,
            is_typing,
        } => typing(state, &actor, &conversation_id, is_typing).await,
        ClientMessage::StartCall {
            conversation_id,
            call_type,
        } => drop_errors(
            state
                .calls
                .start_call(&actor, conversation_id.as_ref(), call_type)
                .await,
        ),
        ClientMessage::AcceptCall { call_id } => {
            drop_errors(state.calls.accept_call(&actor, &call_id).await);
        }
        ClientMessage::DeclineCall { call_id } => {
            drop_errors(state.calls.decline_call(&actor, &call_id).await);
        }
        ClientMessage::EndCall { call_id } => {
            drop_errors(state.calls.end_call(&actor, &call_id).await);
        }
        ClientMessage::ToggleMute { call_id, is_muted } => drop_errors(
            state
                .calls
                .toggle_media(&actor, &call_id, MediaFlag::Muted, is_muted)
                .await,
        ),
        ClientMessage::ToggleVideo {
            call_id,
            is_video_off,
        } => drop_errors(
            state
                .calls
                .toggle_media(&actor, &call_id, MediaFlag::VideoOff, is_video_off)
                .await,
        ),
        ClientMessage::ToggleScreenShare {
            call_id,
            is_screen_sharing,
        } => drop_errors(
            state
                .calls
                .toggle_media(&actor, &call_id, MediaFlag::ScreenSharing, is_screen_sharing)
                .await,
        ),
        ClientMessage::WebrtcOffer {
            target_user_id,
            payload,
        } => {
            signaling::relay(&state.broadcaster, &actor, &target_user_id, SignalKind::Offer, payload)
                .await;
        }
        ClientMessage::WebrtcAnswer {
            target_user_id,
            payload,
        } => {
            signaling::relay(&state.broadcaster, &actor, &target_user_id, SignalKind::Answer, payload)
                .await;
        }
        ClientMessage::IceCandidate {
            target_user_id,
            payload,
        } => {
            signaling::relay(
                &state.broadcaster,
                &actor,
                &target_user_id,
                SignalKind::Candidate,
                payload,
            )
            .await;
        }
    }
}

/// Call operations reply over the socket only on success; a bad call id or
/// an out-of-order transition is dropped like any other bad frame.
fn drop_errors<T>(result: Result<T, parley_store::StoreError>) {
    if let Err(e) = result {
        debug!(error = %e, "call frame rejected, dropping");
    }
}

/// Bind the connection to a user, displacing any older connection the user
/// had, and flip them online.
async fn identify(state: &AppState, conn: &Arc<ClientConnection>, user_id: UserId) {
    if conn.is_identified() {
        debug!(conn_id = %conn.id, "duplicate identify, ignoring");
        return;
    }

    match state.store.get_user(&user_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(conn_id = %conn.id, user_id = %user_id, "identify for unknown user, dropping");
            return;
        }
        Err(e) => {
            warn!(conn_id = %conn.id, error = %e, "identify lookup failed");
            return;
        }
    }

    conn.bind_user(user_id.clone());
    if let Some(displaced) = state.registry.bind_user(user_id.clone(), conn.clone()).await {
        info!(user_id = %user_id, old_conn = %displaced.id, new_conn = %conn.id,
            "evicting displaced connection");
        counter!(WS_EVICTIONS_TOTAL, "reason" => "displaced").increment(1);
        displaced.request_eviction();
    }
    info!(conn_id = %conn.id, user_id = %user_id, "connection identified");

    presence::set_status(
        &state.store,
        &state.broadcaster,
        &state.registry,
        &user_id,
        PresenceStatus::Online,
    )
    .await;
}

/// Persist the typing hint and tell the other members.
async fn typing(
    state: &AppState,
    actor: &UserId,
    conversation_id: &ConversationId,
    is_typing: bool,
) {
    match state.store.set_typing(conversation_id, actor, is_typing) {
        Ok(true) => {}
        Ok(false) => {
            debug!(user_id = %actor, conversation_id = %conversation_id,
                "typing from non-member, dropping");
            return;
        }
        Err(e) => {
            debug!(conversation_id = %conversation_id, error = %e, "typing update failed");
            return;
        }
    }

    let event = ServerEvent::TypingStatus {
        conversation_id: conversation_id.clone(),
        user_id: actor.clone(),
        is_typing,
    };
    state
        .broadcaster
        .send_to_conversation(conversation_id, Some(actor), &event)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use parley_core::models::CallStatus;

    use crate::config::ServerConfig;
    use parley_store::ChatStore;

    fn test_state() -> AppState {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        AppState::new(ServerConfig::default(), store, None)
    }

    async fn connect(state: &AppState, id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(id.into(), tx));
        state.registry.add(conn.clone()).await;
        (conn, rx)
    }

    async fn identify_as(state: &AppState, conn: &Arc<ClientConnection>, user_id: &UserId) {
        let frame = format!(r#"{{"type":"identify","payload":{{"userId":"{user_id}"}}}}"#);
        handle_frame(state, conn, &frame).await;
    }

    fn parse(frame: &Arc<String>) -> serde_json::Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_silently() {
        let state = test_state();
        let (conn, mut rx) = connect(&state, "c1").await;

        handle_frame(&state, &conn, "not json").await;
        handle_frame(&state, &conn, r#"{"type":"self-destruct","payload":{}}"#).await;
        handle_frame(&state, &conn, r#"{"type":"typing","payload":{}}"#).await;

        assert!(rx.try_recv().is_err());
        assert!(!conn.is_identified());
    }

    #[tokio::test]
    async fn identify_binds_and_flips_online() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let (conn, _rx) = connect(&state, "c1").await;

        identify_as(&state, &conn, &alice).await;

        assert!(conn.is_identified());
        assert!(state.registry.is_online(&alice).await);
        let user = state.store.get_user(&alice).unwrap().unwrap();
        assert_eq!(user.status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn identify_for_unknown_user_is_dropped() {
        let state = test_state();
        let (conn, _rx) = connect(&state, "c1").await;
        identify_as(&state, &conn, &UserId::from("ghost")).await;
        assert!(!conn.is_identified());
    }

    #[tokio::test]
    async fn second_identify_evicts_the_first_connection() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let (old, _rx1) = connect(&state, "c1").await;
        let (new, _rx2) = connect(&state, "c2").await;

        identify_as(&state, &old, &alice).await;
        identify_as(&state, &new, &alice).await;

        assert!(old.is_evicted());
        assert!(!new.is_evicted());
        let current = state.registry.get(&alice).await.unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn frames_before_identify_are_dropped() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let (conn, _rx) = connect(&state, "c1").await;
        let frame = format!(
            r#"{{"type":"typing","payload":{{"conversationId":"{}","isTyping":true}}}}"#,
            conv.id
        );
        handle_frame(&state, &conn, &frame).await;

        // Nothing persisted.
        let participants = state.store.participants_of(&conv.id).unwrap();
        assert!(participants.iter().all(|p| !p.is_typing));
    }

    #[tokio::test]
    async fn typing_reaches_other_members_only() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let (alice_conn, mut alice_rx) = connect(&state, "c1").await;
        let (bob_conn, mut bob_rx) = connect(&state, "c2").await;
        identify_as(&state, &alice_conn, &alice).await;
        identify_as(&state, &bob_conn, &bob).await;
        // Drain presence traffic from the identifies.
        while bob_rx.try_recv().is_ok() {}
        while alice_rx.try_recv().is_ok() {}

        let frame = format!(
            r#"{{"type":"typing","payload":{{"conversationId":"{}","isTyping":true}}}}"#,
            conv.id
        );
        handle_frame(&state, &alice_conn, &frame).await;

        let received = parse(&bob_rx.try_recv().unwrap());
        assert_eq!(received["type"], "typing-status");
        assert_eq!(received["payload"]["userId"], alice.as_str());
        assert_eq!(received["payload"]["isTyping"], true);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_from_non_member_is_dropped() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let mallory = state.store.create_user("mallory").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let (bob_conn, mut bob_rx) = connect(&state, "c1").await;
        let (mallory_conn, _mrx) = connect(&state, "c2").await;
        identify_as(&state, &bob_conn, &bob).await;
        identify_as(&state, &mallory_conn, &mallory).await;
        while bob_rx.try_recv().is_ok() {}

        let frame = format!(
            r#"{{"type":"typing","payload":{{"conversationId":"{}","isTyping":true}}}}"#,
            conv.id
        );
        handle_frame(&state, &mallory_conn, &frame).await;
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_call_frame_goes_through_call_manager() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let (alice_conn, _arx) = connect(&state, "c1").await;
        let (bob_conn, mut bob_rx) = connect(&state, "c2").await;
        identify_as(&state, &alice_conn, &alice).await;
        identify_as(&state, &bob_conn, &bob).await;
        while bob_rx.try_recv().is_ok() {}

        let frame = format!(
            r#"{{"type":"start-call","payload":{{"conversationId":"{}","callType":"voice"}}}}"#,
            conv.id
        );
        handle_frame(&state, &alice_conn, &frame).await;

        let received = parse(&bob_rx.try_recv().unwrap());
        assert_eq!(received["type"], "incoming-call");
        assert_eq!(received["payload"]["call"]["status"], "initiated");
    }

    #[tokio::test]
    async fn toggle_mute_updates_only_that_flag() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Video)
            .unwrap();

        let (alice_conn, _arx) = connect(&state, "c1").await;
        identify_as(&state, &alice_conn, &alice).await;

        let frame = format!(
            r#"{{"type":"toggle-mute","payload":{{"callId":"{}","isMuted":true}}}}"#,
            call.id
        );
        handle_frame(&state, &alice_conn, &frame).await;

        let me = state.store.call_participants(&call.id).unwrap();
        let me = me.iter().find(|p| p.user_id == alice).unwrap();
        assert!(me.is_muted);
        assert!(!me.is_video_off);
        assert!(!me.is_screen_sharing);
    }

    #[tokio::test]
    async fn end_call_frame_ends_the_call() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();

        let (alice_conn, _arx) = connect(&state, "c1").await;
        identify_as(&state, &alice_conn, &alice).await;

        let frame = format!(r#"{{"type":"end-call","payload":{{"callId":"{}"}}}}"#, call.id);
        handle_frame(&state, &alice_conn, &frame).await;

        let call = state.store.get_call(&call.id).unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Ended);
    }

    #[tokio::test]
    async fn webrtc_offer_is_relayed_to_target() {
        let state = test_state();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;

        let (alice_conn, _arx) = connect(&state, "c1").await;
        let (bob_conn, mut bob_rx) = connect(&state, "c2").await;
        identify_as(&state, &alice_conn, &alice).await;
        identify_as(&state, &bob_conn, &bob).await;
        while bob_rx.try_recv().is_ok() {}

        let frame = format!(
            r#"{{"type":"webrtc-offer","payload":{{"targetUserId":"{bob}","payload":{{"sdp":"v=0"}}}}}}"#
        );
        handle_frame(&state, &alice_conn, &frame).await;

        let received = parse(&bob_rx.try_recv().unwrap());
        assert_eq!(received["type"], "webrtc-offer");
        assert_eq!(received["payload"]["fromUserId"], alice.as_str());
        assert_eq!(received["payload"]["payload"]["sdp"], "v=0");
    }
}
