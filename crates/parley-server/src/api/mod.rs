//! REST API: users, conversations, messages, calls.
//!
//! Mutations follow persist → respond → broadcast: the HTTP response is
//! built from the committed row, then the resulting event is pushed to the
//! other members' live connections off the request path.

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::get;

use parley_core::ids::UserId;

use crate::error::ApiError;
use crate::server::AppState;

mod calls;
mod conversations;
mod messages;
mod users;

/// The `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}", get(users::get))
        .route(
            "/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get).patch(conversations::update),
        )
        .route("/conversations/{id}/leave", axum::routing::post(conversations::leave))
        .route("/conversations/{id}/read", axum::routing::post(conversations::mark_read))
        .route(
            "/conversations/{id}/messages",
            get(messages::list).post(messages::create),
        )
        .route(
            "/conversations/{id}/unread",
            get(conversations::unread_count),
        )
        .route(
            "/messages/{id}",
            axum::routing::patch(messages::edit).delete(messages::delete),
        )
        .route("/calls", axum::routing::post(calls::create))
        .route("/calls/{id}", get(calls::get))
        .route("/calls/{id}/participants", get(calls::participants))
        .route("/calls/{id}/accept", axum::routing::post(calls::accept))
        .route("/calls/{id}/decline", axum::routing::post(calls::decline))
        .route("/calls/{id}/end", axum::routing::post(calls::end))
        .route("/calls/{id}/media", axum::routing::patch(calls::update_media))
}

/// The acting user, taken from the `x-user-id` header.
///
/// There is no authentication layer; the header is trusted as-is.
pub struct Actor(pub UserId);

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing x-user-id header".into()))?;
        Ok(Self(UserId::from(user_id)))
    }
}
