//! Endpoints for the signed-in user. Routes here sit behind
//! `require_session`, which puts the caller's [`Session`] in the request
//! extensions.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{admin::unavailable, types::ErrorResponse};
use crate::{
    auth::{authorize_owner, invitation::list_by_creator, AuthState, Session},
    store::{InvitationCode, User, UserId},
};

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The caller's account", body = User),
        (status = 303, description = "No session, redirected to /login"),
        (status = 404, description = "The account behind the session was deleted", body = ErrorResponse)
    ),
    tag = "me"
)]
pub async fn me(
    auth_state: Extension<Arc<AuthState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    match auth_state.store().user(session.user_id).await {
        Ok(Some(user)) => Json::<User>(user).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Account no longer exists")),
        )
            .into_response(),
        Err(err) => {
            error!(user_id = session.user_id, "Failed to load /me: {err}");
            unavailable()
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/invitations",
    params(("user_id" = i64, Path, description = "Creator of the codes")),
    responses(
        (status = 200, description = "Codes the caller created, newest first", body = [InvitationCode]),
        (status = 303, description = "No session, redirected to /login"),
        (status = 403, description = "The codes belong to another user")
    ),
    tag = "me"
)]
pub async fn invitations(
    auth_state: Extension<Arc<AuthState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    if let Err(err) = authorize_owner(&session, user_id) {
        return err.into_response();
    }
    match list_by_creator(auth_state.store(), user_id).await {
        Ok(codes) => Json::<Vec<InvitationCode>>(codes).into_response(),
        Err(err) => {
            error!(user_id, "Failed to list invitation codes: {err}");
            unavailable()
        }
    }
}
