//! Call endpoints.
//!
//! These are thin wrappers over [`CallManager`]: the manager performs the
//! transition and the event fan-out, and the handler returns the committed
//! call row. Out-of-order transitions (accepting an ended call, say) come
//! back as 400 instead of the silent drop the WebSocket path uses.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use parley_core::ids::{CallId, ConversationId};
use parley_core::models::{Call, CallParticipant, CallType};
use parley_store::MediaFlag;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

use super::Actor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCall {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub call_type: CallType,
}

/// Media flags to change; absent fields are left alone.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMedia {
    #[serde(default)]
    pub is_muted: Option<bool>,
    #[serde(default)]
    pub is_video_off: Option<bool>,
    #[serde(default)]
    pub is_screen_sharing: Option<bool>,
}

/// `POST /api/calls`
pub async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<CreateCall>,
) -> ApiResult<Json<Call>> {
    let call = state
        .calls
        .start_call(&actor, body.conversation_id.as_ref(), body.call_type)
        .await?;
    Ok(Json(call))
}

/// `GET /api/calls/{id}`
pub async fn get(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<Call>> {
    let call = state
        .store
        .get_call(&call_id)?
        .ok_or_else(|| ApiError::NotFound(format!("call {call_id}")))?;
    Ok(Json(call))
}

/// `GET /api/calls/{id}/participants`
pub async fn participants(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<Vec<CallParticipant>>> {
    let _ = state
        .store
        .get_call(&call_id)?
        .ok_or_else(|| ApiError::NotFound(format!("call {call_id}")))?;
    Ok(Json(state.store.call_participants(&call_id)?))
}

/// `POST /api/calls/{id}/accept`
pub async fn accept(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<Call>> {
    Ok(Json(state.calls.accept_call(&actor, &call_id).await?))
}

/// `POST /api/calls/{id}/decline`
pub async fn decline(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<Call>> {
    Ok(Json(state.calls.decline_call(&actor, &call_id).await?))
}

/// `POST /api/calls/{id}/end`
pub async fn end(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<Call>> {
    Ok(Json(state.calls.end_call(&actor, &call_id).await?))
}

/// `PATCH /api/calls/{id}/media`
pub async fn update_media(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(call_id): Path<CallId>,
    Json(body): Json<UpdateMedia>,
) -> ApiResult<Json<CallParticipant>> {
    let changes = [
        (MediaFlag::Muted, body.is_muted),
        (MediaFlag::VideoOff, body.is_video_off),
        (MediaFlag::ScreenSharing, body.is_screen_sharing),
    ];
    if changes.iter().all(|(_, value)| value.is_none()) {
        return Err(ApiError::BadRequest("no media flags to change".into()));
    }

    let mut participant = None;
    for (flag, value) in changes {
        let Some(value) = value else { continue };
        participant = Some(
            state
                .calls
                .toggle_media(&actor, &call_id, flag, value)
                .await?
                .ok_or_else(|| ApiError::Forbidden("not a participant of this call".into()))?,
        );
    }
    // At least one flag was present, so this is always Some.
    participant.map(Json).ok_or_else(|| ApiError::Internal("media update produced no row".into()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::test_util::{app, expect_json, request};
    use parley_core::models::CallStatus;

    #[tokio::test]
    async fn start_accept_end_over_rest() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let call = expect_json(
            &app,
            "POST",
            "/api/calls",
            Some(&alice),
            Some(serde_json::json!({ "conversationId": conv.id, "callType": "video" })),
            StatusCode::OK,
        )
        .await;
        assert_eq!(call["status"], "initiated");
        assert_eq!(call["callType"], "video");
        let call_id = call["id"].as_str().unwrap().to_owned();

        let accepted = expect_json(
            &app,
            "POST",
            &format!("/api/calls/{call_id}/accept"),
            Some(&bob),
            None,
            StatusCode::OK,
        )
        .await;
        assert_eq!(accepted["status"], "active");

        let ended = expect_json(
            &app,
            "POST",
            &format!("/api/calls/{call_id}/end"),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
        assert_eq!(ended["status"], "ended");
        assert!(ended["endedAt"].is_string());
    }

    #[tokio::test]
    async fn starting_a_call_in_a_foreign_conversation_is_400() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let mallory = state.store.create_user("mallory").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();

        let response = request(
            &app,
            "POST",
            "/api/calls",
            Some(&mallory),
            Some(serde_json::json!({ "conversationId": conv.id, "callType": "voice" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepting_a_terminal_call_is_400() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();
        assert!(state.store.decline_call(&call.id).unwrap());

        let response = request(
            &app,
            "POST",
            &format!("/api/calls/{}/accept", call.id),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn declining_an_active_call_changes_nothing() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();
        let _ = state.store.accept_call(&call.id, &bob).unwrap();

        let body = expect_json(
            &app,
            "POST",
            &format!("/api/calls/{}/decline", call.id),
            Some(&bob),
            None,
            StatusCode::OK,
        )
        .await;
        assert_eq!(body["status"], "active");
        let stored = state.store.get_call(&call.id).unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Active);
    }

    #[tokio::test]
    async fn media_patch_flips_only_named_flags() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Video)
            .unwrap();

        let me = expect_json(
            &app,
            "PATCH",
            &format!("/api/calls/{}/media", call.id),
            Some(&alice),
            Some(serde_json::json!({ "isMuted": true, "isScreenSharing": true })),
            StatusCode::OK,
        )
        .await;
        assert_eq!(me["isMuted"], true);
        assert_eq!(me["isVideoOff"], false);
        assert_eq!(me["isScreenSharing"], true);
    }

    #[tokio::test]
    async fn media_patch_from_non_participant_is_403() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();

        // bob never joined the call.
        let response = request(
            &app,
            "PATCH",
            &format!("/api/calls/{}/media", call.id),
            Some(&bob),
            Some(serde_json::json!({ "isMuted": true })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_media_patch_is_400() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();

        let response = request(
            &app,
            "PATCH",
            &format!("/api/calls/{}/media", call.id),
            Some(&alice),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn participants_are_append_only_across_leave() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let bob = state.store.create_user("bob").unwrap().id;
        let (conv, _) = state.store.find_or_create_direct(&alice, &bob).unwrap();
        let call = state
            .store
            .create_call(Some(&conv.id), &alice, parley_core::models::CallType::Voice)
            .unwrap();
        let _ = state.store.accept_call(&call.id, &bob).unwrap();
        assert!(state.store.leave_call(&call.id, &bob).unwrap());

        let rows = expect_json(
            &app,
            "GET",
            &format!("/api/calls/{}/participants", call.id),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let bob_row = rows
            .iter()
            .find(|row| row["userId"] == bob.as_str())
            .unwrap();
        assert!(bob_row["leftAt"].is_string());
    }

    #[tokio::test]
    async fn unknown_call_is_404() {
        let (app, state) = app();
        let alice = state.store.create_user("alice").unwrap().id;
        let response = request(&app, "GET", "/api/calls/no-such-call", Some(&alice), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
