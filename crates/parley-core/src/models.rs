//! Domain models and wire enums.
//!
//! These structs are the shapes that cross the wire (camelCase JSON) and the
//! shapes the store returns. Enums carry a string codec (`as_str` /
//! `FromStr`) so the persistence layer can store them as plain text columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{CallId, ConversationId, MessageId, UserId};

/// Error returned when parsing an enum from an unknown string value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownVariant {
    /// The enum the value was parsed for.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// The canonical string form (also the stored column value).
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

str_enum! {
    /// A user's best-known availability state.
    PresenceStatus {
        /// Connected and active.
        Online => "online",
        /// Connected but idle.
        Away => "away",
        /// Connected but does not want to be disturbed.
        Busy => "busy",
        /// Not connected.
        Offline => "offline",
    }
}

str_enum! {
    /// Conversation shape.
    ConversationKind {
        /// Exactly two participants; at most one per unordered user pair.
        Direct => "direct",
        /// Named multi-party conversation.
        Group => "group",
    }
}

str_enum! {
    /// Role of a participant within a conversation.
    ParticipantRole {
        /// The creator of a group conversation; unique per group.
        Owner => "owner",
        /// Elevated member.
        Admin => "admin",
        /// Regular member.
        Member => "member",
    }
}

str_enum! {
    /// Kind of message content.
    MessageType {
        /// Plain text.
        Text => "text",
        /// Image attachment message.
        Image => "image",
        /// Server-generated notice (e.g. "X left the conversation").
        System => "system",
    }
}

str_enum! {
    /// Delivery progress of a message.
    DeliveryStatus {
        /// Persisted by the server.
        Sent => "sent",
        /// Reached at least one recipient device.
        Delivered => "delivered",
        /// Read by a recipient.
        Read => "read",
    }
}

str_enum! {
    /// Media kind of a call.
    CallType {
        /// Audio only.
        Voice => "voice",
        /// Audio and video.
        Video => "video",
    }
}

str_enum! {
    /// Call lifecycle state.
    CallStatus {
        /// Created, waiting for someone to pick up.
        Initiated => "initiated",
        /// At least one callee accepted.
        Active => "active",
        /// A callee declined (terminal).
        Declined => "declined",
        /// Nobody accepted before the ring timeout (terminal).
        Missed => "missed",
        /// Hung up (terminal).
        Ended => "ended",
    }
}

impl CallStatus {
    /// Whether no further transitions are allowed from this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Missed | Self::Ended)
    }
}

/// A registered user together with their presence record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Unique display handle.
    pub username: String,
    /// Current presence status.
    pub status: PresenceStatus,
    /// When the user was last seen connected.
    pub last_seen_at: DateTime<Utc>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// A direct or group conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Direct or group.
    pub kind: ConversationKind,
    /// Display name (group only).
    pub name: Option<String>,
    /// Description (group only).
    pub description: Option<String>,
    /// Who created it.
    pub created_by: UserId,
    /// Bumped on every new message.
    pub last_activity_at: DateTime<Utc>,
    /// Most recent message, if any.
    pub last_message_id: Option<MessageId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// The conversation.
    pub conversation_id: ConversationId,
    /// The member.
    pub user_id: UserId,
    /// Role within the conversation.
    pub role: ParticipantRole,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
    /// Notifications muted until this time, if set.
    pub muted_until: Option<DateTime<Utc>>,
    /// Last message the user has read.
    pub last_read_message_id: Option<MessageId>,
    /// When the user last read.
    pub last_read_at: Option<DateTime<Utc>>,
    /// Soft typing hint; stale after a few seconds.
    pub is_typing: bool,
    /// When the typing flag last changed.
    pub typing_at: Option<DateTime<Utc>>,
}

/// A message within a conversation.
///
/// Deleted messages are tombstones: content and attachments are cleared but
/// the row (and therefore reply references and ordering) survives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text content; `None` once tombstoned.
    pub content: Option<String>,
    /// Content kind.
    pub message_type: MessageType,
    /// Attachment URLs; empty once tombstoned.
    pub attachments: Vec<String>,
    /// Message this replies to, if any.
    pub reply_to_id: Option<MessageId>,
    /// Delivery progress.
    pub delivery_status: DeliveryStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time, if edited.
    pub edited_at: Option<DateTime<Utc>>,
    /// Tombstone time, if deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether this message has been tombstoned.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A voice or video call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Call id.
    pub id: CallId,
    /// Owning conversation; `None` for ad-hoc calls.
    pub conversation_id: Option<ConversationId>,
    /// Who started the call.
    pub initiated_by: UserId,
    /// Voice or video.
    pub call_type: CallType,
    /// Lifecycle state.
    pub status: CallStatus,
    /// Stamped when the call first becomes active.
    pub started_at: Option<DateTime<Utc>>,
    /// Stamped when the call ends.
    pub ended_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Call {
    /// Call duration in whole seconds; 0 if the call never became active.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_seconds().max(0),
            _ => 0,
        }
    }
}

/// Per-user state within a call. Append/leave-only: a participant who
/// leaves keeps their row with `left_at` set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    /// The call.
    pub call_id: CallId,
    /// The participant.
    pub user_id: UserId,
    /// When they joined.
    pub joined_at: DateTime<Utc>,
    /// When they left, if they have.
    pub left_at: Option<DateTime<Utc>>,
    /// Microphone muted.
    pub is_muted: bool,
    /// Camera off.
    pub is_video_off: bool,
    /// Screen share active.
    pub is_screen_sharing: bool,
}
