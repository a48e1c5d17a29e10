//! Wire envelopes: the closed inbound message set and the closed outbound
//! event catalog.
//!
//! Every frame in either direction is a UTF-8 JSON envelope
//! `{ "type": string, "payload": object }`. Both directions are modeled as
//! tagged unions so anything outside the enumerated set fails to parse at
//! the boundary instead of falling through a catch-all branch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CallId, ConversationId, MessageId, UserId};
use crate::models::{Call, CallType, Conversation, Message, PresenceStatus};

/// Inbound message from a connected client.
///
/// Everything except `identify` requires the connection to have identified
/// itself first; the router drops early frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Bind this connection to a user id.
    Identify {
        /// The authenticated user.
        user_id: UserId,
    },
    /// Update the sender's typing hint in a conversation.
    Typing {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Whether the user is currently typing.
        is_typing: bool,
    },
    /// Start a call.
    StartCall {
        /// Owning conversation; `None` for an ad-hoc call.
        conversation_id: Option<ConversationId>,
        /// Voice or video.
        call_type: CallType,
    },
    /// Accept a ringing call.
    AcceptCall {
        /// The call.
        call_id: CallId,
    },
    /// Decline a ringing call.
    DeclineCall {
        /// The call.
        call_id: CallId,
    },
    /// Hang up a call.
    EndCall {
        /// The call.
        call_id: CallId,
    },
    /// Set the sender's mute flag.
    ToggleMute {
        /// The call.
        call_id: CallId,
        /// New mute state.
        is_muted: bool,
    },
    /// Set the sender's video-off flag.
    ToggleVideo {
        /// The call.
        call_id: CallId,
        /// New video-off state.
        is_video_off: bool,
    },
    /// Set the sender's screen-share flag.
    ToggleScreenShare {
        /// The call.
        call_id: CallId,
        /// New screen-share state.
        is_screen_sharing: bool,
    },
    /// Relay an SDP offer to another user.
    WebrtcOffer {
        /// Recipient.
        target_user_id: UserId,
        /// Opaque negotiation payload; never inspected.
        payload: Value,
    },
    /// Relay an SDP answer to another user.
    WebrtcAnswer {
        /// Recipient.
        target_user_id: UserId,
        /// Opaque negotiation payload; never inspected.
        payload: Value,
    },
    /// Relay an ICE candidate to another user.
    IceCandidate {
        /// Recipient.
        target_user_id: UserId,
        /// Opaque negotiation payload; never inspected.
        payload: Value,
    },
}

/// Outbound event pushed to connected clients.
///
/// This is the complete catalog; the broadcaster refuses to send anything
/// that is not one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A conversation the recipient belongs to was created.
    NewConversation {
        /// The new conversation.
        conversation: Conversation,
    },
    /// Conversation metadata changed.
    ConversationUpdated {
        /// The updated conversation.
        conversation: Conversation,
    },
    /// A participant left a conversation.
    ParticipantLeft {
        /// The conversation.
        conversation_id: ConversationId,
        /// Who left.
        user_id: UserId,
    },
    /// A message was posted.
    NewMessage {
        /// The conversation.
        conversation_id: ConversationId,
        /// The message.
        message: Message,
    },
    /// A message was edited.
    MessageUpdated {
        /// The conversation.
        conversation_id: ConversationId,
        /// The updated message.
        message: Message,
    },
    /// A message was tombstoned.
    MessageDeleted {
        /// The conversation.
        conversation_id: ConversationId,
        /// The deleted message.
        message_id: MessageId,
    },
    /// A call is ringing.
    IncomingCall {
        /// The call.
        call: Call,
        /// Who started it.
        initiator: UserId,
    },
    /// Someone accepted the call.
    CallAccepted {
        /// The call.
        call_id: CallId,
        /// Who accepted.
        user_id: UserId,
    },
    /// Someone declined the call.
    CallDeclined {
        /// The call.
        call_id: CallId,
        /// Who declined.
        user_id: UserId,
    },
    /// The call ended.
    CallEnded {
        /// The call.
        call_id: CallId,
        /// Who hung up.
        ended_by: UserId,
        /// Whole seconds of active time; 0 if never active.
        duration: i64,
    },
    /// Nobody picked up before the ring timeout.
    CallMissed {
        /// The call.
        call_id: CallId,
    },
    /// A participant changed their media flags.
    ParticipantMediaChanged {
        /// The call.
        call_id: CallId,
        /// Whose flags changed.
        user_id: UserId,
        /// Microphone muted.
        is_muted: bool,
        /// Camera off.
        is_video_off: bool,
        /// Screen share active.
        is_screen_sharing: bool,
    },
    /// A user's presence changed.
    UserStatusChanged {
        /// The user.
        user_id: UserId,
        /// New status.
        status: PresenceStatus,
    },
    /// A participant's typing hint changed.
    TypingStatus {
        /// The conversation.
        conversation_id: ConversationId,
        /// Who is (or stopped) typing.
        user_id: UserId,
        /// Whether they are typing.
        is_typing: bool,
    },
    /// Relayed SDP offer.
    WebrtcOffer {
        /// Original sender.
        from_user_id: UserId,
        /// Opaque negotiation payload, forwarded verbatim.
        payload: Value,
    },
    /// Relayed SDP answer.
    WebrtcAnswer {
        /// Original sender.
        from_user_id: UserId,
        /// Opaque negotiation payload, forwarded verbatim.
        payload: Value,
    },
    /// Relayed ICE candidate.
    IceCandidate {
        /// Original sender.
        from_user_id: UserId,
        /// Opaque negotiation payload, forwarded verbatim.
        payload: Value,
    },
}

impl ServerEvent {
    /// The wire `type` string for this event (used for logging and metrics).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewConversation { .. } => "new-conversation",
            Self::ConversationUpdated { .. } => "conversation-updated",
            Self::ParticipantLeft { .. } => "participant-left",
            Self::NewMessage { .. } => "new-message",
            Self::MessageUpdated { .. } => "message-updated",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::IncomingCall { .. } => "incoming-call",
            Self::CallAccepted { .. } => "call-accepted",
            Self::CallDeclined { .. } => "call-declined",
            Self::CallEnded { .. } => "call-ended",
            Self::CallMissed { .. } => "call-missed",
            Self::ParticipantMediaChanged { .. } => "participant-media-changed",
            Self::UserStatusChanged { .. } => "user-status-changed",
            Self::TypingStatus { .. } => "typing-status",
            Self::WebrtcOffer { .. } => "webrtc-offer",
            Self::WebrtcAnswer { .. } => "webrtc-answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }
}
