//! Conversation endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use tracing::info;

use parley_core::events::ServerEvent;
use parley_core::ids::{ConversationId, MessageId, UserId};
use parley_core::models::Conversation;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

use super::Actor;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CreateConversation {
    /// One-to-one; reuses the existing conversation for this user pair.
    Direct { user_id: UserId },
    /// Named multi-party conversation; the actor becomes the owner.
    Group {
        name: String,
        #[serde(default)]
        description: Option<String>,
        member_ids: Vec<UserId>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConversation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRead {
    pub message_id: MessageId,
}

/// `POST /api/conversations`
pub async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<CreateConversation>,
) -> ApiResult<Json<Conversation>> {
    let (conversation, newly_created) = match body {
        CreateConversation::Direct { user_id } => {
            state.store.find_or_create_direct(&actor, &user_id)?
        }
        CreateConversation::Group {
            name,
            description,
            member_ids,
        } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::BadRequest("group name must not be empty".into()));
            }
            let conversation =
                state
                    .store
                    .create_group(&actor, name, description.as_deref(), &member_ids)?;
            (conversation, true)
        }
    };

    if newly_created {
        info!(conversation_id = %conversation.id, kind = %conversation.kind, "conversation created");
        let event = ServerEvent::NewConversation {
            conversation: conversation.clone(),
        };
        let conversation_id = conversation.id.clone();
        let state = state.clone();
        drop(tokio::spawn(async move {
            state
                .broadcaster
                .send_to_conversation(&conversation_id, Some(&actor), &event)
                .await;
        }));
    }

    Ok(Json(conversation))
}

/// `GET /api/conversations`
pub async fn list(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.store.conversations_of(&actor)?))
}

/// `GET /api/conversations/{id}`
pub async fn get(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Conversation>> {
    let conversation = require_member(&state, &id, &actor)?;
    Ok(Json(conversation))
}

/// `PATCH /api/conversations/{id}`
pub async fn update(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ConversationId>,
    Json(body): Json<UpdateConversation>,
) -> ApiResult<Json<Conversation>> {
    let _ = require_member(&state, &id, &actor)?;
    let conversation = state
        .store
        .update_conversation(&id, body.name.as_deref(), body.description.as_deref())?;

    let event = ServerEvent::ConversationUpdated {
        conversation: conversation.clone(),
    };
    let conversation_id = conversation.id.clone();
    let state = state.clone();
    drop(tokio::spawn(async move {
        state
            .broadcaster
            .send_to_conversation(&conversation_id, Some(&actor), &event)
            .await;
    }));

    Ok(Json(conversation))
}

/// `POST /api/conversations/{id}/leave`
pub async fn leave(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.leave_conversation(&id, &actor)?;
    info!(conversation_id = %id, user_id = %actor, "participant left");

    // The actor is no longer a member, so no exclusion is needed.
    let event = ServerEvent::ParticipantLeft {
        conversation_id: id.clone(),
        user_id: actor,
    };
    let state_bg = state.clone();
    drop(tokio::spawn(async move {
        state_bg.broadcaster.send_to_conversation(&id, None, &event).await;
    }));

    Ok(Json(serde_json::json!({ "left": true })))
}

/// `POST /api/conversations/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ConversationId>,
    Json(body): Json<MarkRead>,
) -> ApiResult<Json<serde_json::Value>> {
    let _ = require_member(&state, &id, &actor)?;
    state.store.mark_read(&id, &actor, &body.message_id)?;

    // Read receipts surface as a delivery-status change on the message.
    if let Some(message) = state.store.get_message(&body.message_id)? {
        let event = ServerEvent::MessageUpdated {
            conversation_id: id.clone(),
            message,
        };
        let state_bg = state.clone();
        drop(tokio::spawn(async move {
            state_bg
                .broadcaster
                .send_to_conversation(&id, Some(&actor), &event)
                .await;
        }));
    }

    Ok(Json(serde_json::json!({ "read": true })))
}

/// `GET /api/conversations/{id}/unread`
pub async fn unread_count(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<serde_json::Value>> {
    let _ = require_member(&state, &id, &actor)?;
    let unread = state.store.unread_count(&id, &actor)?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}

/// Load the conversation, requiring the actor to be a member.
fn require_member(
    state: &AppState,
    conversation_id: &ConversationId,
    actor: &UserId,
) -> ApiResult<Conversation> {
    let conversation = state
        .store
        .get_conversation(conversation_id)?
        .ok_or_else(|| ApiError::NotFound(format!("conversation {conversation_id}")))?;
    if !state.store.is_participant(conversation_id, actor)? {
        return Err(ApiError::Forbidden("not a member of this conversation".into()));
    }
    Ok(conversation)
}
