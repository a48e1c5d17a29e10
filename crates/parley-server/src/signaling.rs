//! WebRTC signaling relay.
//!
//! Offers, answers, and ICE candidates are forwarded verbatim to the target
//! user's live connection with the sender's id attached. The server keeps no
//! negotiation state and never inspects the payload; an offline target means
//! the frame is dropped silently.

use metrics::counter;
use serde_json::Value;
use tracing::debug;

use parley_core::events::ServerEvent;
use parley_core::ids::UserId;

use crate::metrics::{SIGNALING_DROPPED_TOTAL, SIGNALING_RELAYED_TOTAL};
use crate::websocket::broadcast::Broadcaster;

/// Which signaling frame is being relayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// SDP offer.
    Offer,
    /// SDP answer.
    Answer,
    /// ICE candidate.
    Candidate,
}

impl SignalKind {
    fn label(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        }
    }
}

/// Relay a signaling frame from one user to another.
pub async fn relay(
    broadcaster: &Broadcaster,
    from: &UserId,
    target: &UserId,
    kind: SignalKind,
    payload: Value,
) {
    let event = match kind {
        SignalKind::Offer => ServerEvent::WebrtcOffer {
            from_user_id: from.clone(),
            payload,
        },
        SignalKind::Answer => ServerEvent::WebrtcAnswer {
            from_user_id: from.clone(),
            payload,
        },
        SignalKind::Candidate => ServerEvent::IceCandidate {
            from_user_id: from.clone(),
            payload,
        },
    };

    if broadcaster.send_to_user(target, &event).await {
        counter!(SIGNALING_RELAYED_TOTAL, "kind" => kind.label()).increment(1);
    } else {
        debug!(from = %from, target = %target, kind = kind.label(),
            "signaling target offline, dropping");
        counter!(SIGNALING_DROPPED_TOTAL, "kind" => kind.label()).increment(1);
    }
}
