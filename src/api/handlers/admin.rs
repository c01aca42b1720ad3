//! Admin endpoints. Every route here sits behind `require_admin`, which puts
//! the caller's [`Session`] in the request extensions.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use super::types::{CleanUsersResponse, DashboardResponse, ErrorResponse, GenerateCodeRequest};
use crate::{
    auth::{
        invitation::{create_code, list_by_creator},
        AuthState, Clock, Session, Validity,
    },
    store::{InvitationCode, User},
};

pub(super) fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Service temporarily unavailable")),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Stats and the caller's invitation codes", body = DashboardResponse),
        (status = 303, description = "No session, redirected to /login"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn dashboard(
    auth_state: Extension<Arc<AuthState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    let stats = match auth_state.store().stats().await {
        Ok(stats) => stats,
        Err(err) => {
            error!("Failed to load stats: {err}");
            return unavailable();
        }
    };
    let invitations = match list_by_creator(auth_state.store(), session.user_id).await {
        Ok(invitations) => invitations,
        Err(err) => {
            error!("Failed to list invitation codes: {err}");
            return unavailable();
        }
    };

    Json(DashboardResponse {
        user_id: session.user_id,
        stats,
        invitations,
    })
    .into_response()
}

fn requested_validity(request: &GenerateCodeRequest) -> Result<Validity, &'static str> {
    if request.never_expires {
        return Ok(Validity::NeverExpires);
    }
    match request.valid_days {
        None => Ok(Validity::default()),
        Some(days) if days > 0 && days <= 3650 => Ok(Validity::days(days)),
        Some(_) => Err("valid_days must be between 1 and 3650"),
    }
}

#[utoipa::path(
    post,
    path = "/admin/generate-code",
    request_body(content = GenerateCodeRequest, description = "Optional; defaults to a 30 day code"),
    responses(
        (status = 201, description = "Invitation code created", body = InvitationCode),
        (status = 400, description = "Invalid validity window", body = ErrorResponse),
        (status = 303, description = "No session, redirected to /login"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn generate_code(
    auth_state: Extension<Arc<AuthState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<GenerateCodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    // An absent body means the defaults.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => GenerateCodeRequest::default(),
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    let validity = match requested_validity(&request) {
        Ok(validity) => validity,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response();
        }
    };

    let now = auth_state.clock().now();
    match create_code(auth_state.store(), session.user_id, validity, now).await {
        Ok(invitation) => (StatusCode::CREATED, Json(invitation)).into_response(),
        Err(err) => {
            error!(user_id = session.user_id, "Failed to create invitation code: {err}");
            unavailable()
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = [User]),
        (status = 303, description = "No session, redirected to /login"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn users(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    match auth_state.store().users().await {
        Ok(users) => Json::<Vec<User>>(users).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            unavailable()
        }
    }
}

#[utoipa::path(
    post,
    path = "/admin/clean-users",
    responses(
        (status = 200, description = "Non-admin users deleted", body = CleanUsersResponse),
        (status = 303, description = "No session, redirected to /login"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn clean_users(
    auth_state: Extension<Arc<AuthState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    match auth_state.store().delete_non_admin_users().await {
        Ok(deleted) => {
            info!(user_id = session.user_id, deleted, "non-admin users deleted");
            Json(CleanUsersResponse { deleted }).into_response()
        }
        Err(err) => {
            error!("Failed to delete users: {err}");
            unavailable()
        }
    }
}
