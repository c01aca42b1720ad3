//! Authorization gate.
//!
//! The `authorize_*` functions hold the decisions; `require_session` and
//! `require_admin` wrap them as axum middleware so that a protected handler
//! only ever sees an already-validated [`Session`] in its extensions.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, header::COOKIE, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{error::AuthorizationError, session::Session, state::AuthState};
use crate::store::UserId;

pub const SESSION_COOKIE_NAME: &str = "session_token";
pub const LOGIN_PATH: &str = "/login";

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        match self {
            Self::NoSession => Redirect::to(LOGIN_PATH).into_response(),
            Self::NotAdmin | Self::NotOwner => {
                (StatusCode::FORBIDDEN, self.to_string()).into_response()
            }
        }
    }
}

/// Pull the session token from the `session_token` cookie or a bearer header.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == SESSION_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// # Errors
/// `NoSession` when the token is missing, unknown or expired.
pub fn authorize_session(
    state: &AuthState,
    token: Option<&str>,
) -> Result<Session, AuthorizationError> {
    token
        .and_then(|token| state.sessions().lookup(token))
        .ok_or(AuthorizationError::NoSession)
}

/// Require a live session whose user is currently an admin.
///
/// The flag is read from the store on every call so revoked rights apply
/// immediately.
///
/// # Errors
/// `NoSession` as [`authorize_session`]; `NotAdmin` when the flag is false,
/// the user is gone, or the lookup fails.
pub async fn authorize_admin(
    state: &AuthState,
    token: Option<&str>,
) -> Result<Session, AuthorizationError> {
    let session = authorize_session(state, token)?;
    match state.store().user_is_admin(session.user_id).await {
        Ok(Some(true)) => Ok(session),
        Ok(Some(false)) => {
            warn!(user_id = session.user_id, "admin route refused for non-admin");
            Err(AuthorizationError::NotAdmin)
        }
        Ok(None) => {
            warn!(user_id = session.user_id, "session refers to a missing user");
            Err(AuthorizationError::NotAdmin)
        }
        Err(err) => {
            error!(user_id = session.user_id, "Failed to load admin flag: {err}");
            Err(AuthorizationError::NotAdmin)
        }
    }
}

/// # Errors
/// `NotOwner` when `session` does not belong to `owner`.
pub fn authorize_owner(session: &Session, owner: UserId) -> Result<(), AuthorizationError> {
    if session.user_id == owner {
        Ok(())
    } else {
        warn!(user_id = session.user_id, owner, "ownership check failed");
        Err(AuthorizationError::NotOwner)
    }
}

pub async fn require_session(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());
    match authorize_session(&state, token.as_deref()) {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => {
            debug!(path = %request.uri().path(), "request without a session redirected");
            err.into_response()
        }
    }
}

pub async fn require_admin(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());
    match authorize_admin(&state, token.as_deref()).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
