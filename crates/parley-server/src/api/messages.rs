//! Message endpoints.
//!
//! Sending a message is the canonical persist → respond → broadcast path:
//! the row is committed, the sender gets it back in the HTTP response, and
//! the other members' connections receive a `new-message` event off the
//! request path.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::info;

use parley_core::events::ServerEvent;
use parley_core::ids::{ConversationId, MessageId, UserId};
use parley_core::models::{Message, MessageType};
use parley_store::NewMessage;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

use super::Actor;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub before: Option<MessageId>,
}

/// `POST /api/conversations/{id}/messages`
pub async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<CreateMessage>,
) -> ApiResult<Json<Message>> {
    if body.content.is_empty() && body.attachments.is_empty() {
        return Err(ApiError::BadRequest("message must have content or attachments".into()));
    }

    let message = state.store.create_message(&NewMessage {
        conversation_id: &conversation_id,
        sender_id: &actor,
        content: &body.content,
        message_type: body.message_type,
        attachments: &body.attachments,
        reply_to_id: body.reply_to_id.as_ref(),
    })?;
    info!(message_id = %message.id, conversation_id = %conversation_id, "message sent");

    broadcast(
        &state,
        Some(actor),
        conversation_id.clone(),
        ServerEvent::NewMessage {
            conversation_id,
            message: message.clone(),
        },
    );
    Ok(Json(message))
}

/// `GET /api/conversations/{id}/messages`
pub async fn list(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(conversation_id): Path<ConversationId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    if !state.store.is_participant(&conversation_id, &actor)? {
        return Err(ApiError::Forbidden("not a member of this conversation".into()));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let messages = state
        .store
        .list_messages(&conversation_id, limit, query.before.as_ref())?;
    Ok(Json(messages))
}

/// `PATCH /api/messages/{id}`
pub async fn edit(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(message_id): Path<MessageId>,
    Json(body): Json<EditMessage>,
) -> ApiResult<Json<Message>> {
    let _ = require_sender(&state, &message_id, &actor)?;
    let message = state.store.edit_message(&message_id, &body.content)?;

    broadcast(
        &state,
        None,
        message.conversation_id.clone(),
        ServerEvent::MessageUpdated {
            conversation_id: message.conversation_id.clone(),
            message: message.clone(),
        },
    );
    Ok(Json(message))
}

/// `DELETE /api/messages/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(message_id): Path<MessageId>,
) -> ApiResult<Json<Message>> {
    let _ = require_sender(&state, &message_id, &actor)?;
    let message = state.store.delete_message(&message_id)?;
    info!(message_id = %message.id, "message deleted");

    broadcast(
        &state,
        None,
        message.conversation_id.clone(),
        ServerEvent::MessageDeleted {
            conversation_id: message.conversation_id.clone(),
            message_id: message.id.clone(),
        },
    );
    Ok(Json(message))
}

/// Only the author may edit or delete a message.
fn require_sender(
    state: &AppState,
    message_id: &MessageId,
    actor: &UserId,
) -> ApiResult<Message> {
    let message = state
        .store
        .get_message(message_id)?
        .ok_or_else(|| ApiError::NotFound(format!("message {message_id}")))?;
    if &message.sender_id != actor {
        return Err(ApiError::Forbidden("only the sender may modify a message".into()));
    }
    Ok(message)
}

/// Push the event to the conversation off the request path. `exclude` skips
/// the sender for `new-message` (they hold the HTTP response); edits and
/// tombstones go to everyone so the actor's own live connection converges
/// too.
fn broadcast(
    state: &AppState,
    exclude: Option<UserId>,
    conversation_id: ConversationId,
    event: ServerEvent,
) {
    let state = state.clone();
    drop(tokio::spawn(async move {
        state
            .broadcaster
            .send_to_conversation(&conversation_id, exclude.as_ref(), &event)
            .await;
    }));
}
