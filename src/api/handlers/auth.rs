//! Signup, login, logout and session endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use super::{
    types::{ErrorResponse, LoginRequest, SessionResponse, SignupRequest, SignupResponse},
    utils::ClientOrigin,
};
use crate::auth::{
    self, authorize_session, extract_session_token, AuthConfig, AuthError, AuthState, Clock,
    Registration, RegistrationError, Session, SESSION_COOKIE_NAME,
};

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn registration_error_response(err: &RegistrationError) -> Response {
    match err {
        RegistrationError::InvalidInput(_) | RegistrationError::Invitation(_) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        RegistrationError::DuplicateIdentity => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        RegistrationError::HashingFailed => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
        RegistrationError::StoreUnavailable => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
        ),
    }
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered", body = SignupResponse),
        (status = 400, description = "Invalid input or invitation code", body = ErrorResponse),
        (status = 409, description = "Username or email already registered", body = ErrorResponse),
        (status = 500, description = "Password hashing failed", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signup(
    auth_state: Extension<Arc<AuthState>>,
    origin: ClientOrigin,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    let registration = Registration {
        username: request.username,
        email: request.email,
        password: SecretString::from(request.password),
        invitation_code: request.invitation_code,
    };

    match auth::register(&auth_state, registration, origin.as_str()).await {
        Ok(user_id) => (StatusCode::CREATED, Json(SignupResponse { user_id })).into_response(),
        Err(err) => registration_error_response(&err),
    }
}

// Placeholder for the HTML login form; gate redirects land here.
pub async fn login_form() -> impl IntoResponse {
    Json(json!({
        "message": "POST a JSON body with username and password to /login",
    }))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued, cookie set", body = SessionResponse),
        (status = 401, description = "Invalid username or password", body = ErrorResponse),
        (status = 503, description = "Store or session table unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    origin: ClientOrigin,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    let session = match auth::authenticate(
        &auth_state,
        &request.username,
        SecretString::from(request.password),
        origin.as_str(),
    )
    .await
    {
        Ok(session) => session,
        // One body for both so usernames cannot be enumerated.
        Err(AuthError::UserNotFound | AuthError::WrongPassword) => {
            return error_response(StatusCode::UNAUTHORIZED, "Invalid username or password");
        }
        Err(AuthError::StoreUnavailable | AuthError::SessionUnavailable) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
            );
        }
    };

    let now = auth_state.clock().now();
    let mut headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &session, now) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            auth_state.sessions().revoke(&session.token);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to issue session",
            );
        }
    }

    let body = SessionResponse {
        user_id: session.user_id,
        expires_at: session.expires_at,
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    origin: ClientOrigin,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        auth::logout(&auth_state, &token, origin.as_str());
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build logout cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let token = extract_session_token(&headers);
    match authorize_session(&auth_state, token.as_deref()) {
        Ok(session) => {
            let response = SessionResponse {
                user_id: session.user_id,
                expires_at: session.expires_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `HttpOnly` cookie carrying the token, expiring with the session.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = (session.expires_at - now).num_seconds().max(0);
    let expires = session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}; Expires={expires}",
        session.token
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
