//! Invitation-gated registration.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use super::{
    audit::AuditEvent,
    error::RegistrationError,
    invitation::{lookup_for_redemption, redeem},
    password::MAX_PASSWORD_BYTES,
    state::AuthState,
};
use crate::store::{NewUser, StoreError, UserId};

pub const MAX_USERNAME_CHARS: usize = 50;

static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub invitation_code: String,
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Returns the trimmed username and normalized email.
pub(crate) fn validate_identity(
    username: &str,
    email: &str,
) -> Result<(String, String), RegistrationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "username is required".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(RegistrationError::InvalidInput(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }

    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(RegistrationError::InvalidInput(
            "email address is invalid".to_string(),
        ));
    }
    Ok((username.to_string(), email))
}

/// Reject passwords the hasher would refuse, before any store work.
pub(crate) fn validate_password(password: &SecretString) -> Result<(), RegistrationError> {
    let password = password.expose_secret();
    if password.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "password is required".to_string(),
        ));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(RegistrationError::InvalidInput(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Create a user by redeeming an invitation code.
///
/// Code validation, user insertion and redemption share one store
/// transaction; any failure leaves the code unused. Exactly one signup audit
/// event is recorded per call.
///
/// # Errors
/// See [`RegistrationError`].
pub async fn register(
    state: &AuthState,
    registration: Registration,
    origin: &str,
) -> Result<UserId, RegistrationError> {
    let username = registration.username.trim().to_string();
    let email = normalize_email(&registration.email);

    let result = register_user(state, registration).await;

    state.audit().record(AuditEvent::Signup {
        username: username.clone(),
        email,
        origin: origin.to_string(),
        success: result.is_ok(),
    });

    match &result {
        Ok(user_id) => info!(user_id, %username, %origin, "user registered"),
        Err(
            err @ (RegistrationError::StoreUnavailable | RegistrationError::HashingFailed),
        ) => error!(%username, %origin, "registration failed: {err}"),
        Err(err) => warn!(%username, %origin, "registration rejected: {err}"),
    }
    result
}

async fn register_user(
    state: &AuthState,
    registration: Registration,
) -> Result<UserId, RegistrationError> {
    let (username, email) = validate_identity(&registration.username, &registration.email)?;
    validate_password(&registration.password)?;
    let code = registration.invitation_code.trim();

    let mut tx = state.store().begin().await.map_err(|err| {
        error!("Failed to open registration transaction: {err}");
        RegistrationError::StoreUnavailable
    })?;
    let now = state.clock().now();

    let invitation = lookup_for_redemption(tx.as_mut(), code, now).await?;

    let password_hash = state
        .hasher()
        .hash_blocking(registration.password)
        .await
        .map_err(|err| {
            error!("Failed to hash password: {err}");
            RegistrationError::HashingFailed
        })?;

    let new_user = NewUser {
        username,
        email,
        password_hash,
        is_admin: false,
        invitation_code: Some(invitation.code.clone()),
        invited_by: Some(invitation.created_by),
        created_at: now,
    };
    let user_id = match tx.insert_user(&new_user).await {
        Ok(user_id) => user_id,
        Err(StoreError::UniqueViolation) => return Err(RegistrationError::DuplicateIdentity),
        Err(err) => {
            error!("Failed to insert user: {err}");
            return Err(RegistrationError::StoreUnavailable);
        }
    };

    redeem(tx.as_mut(), &invitation.code, user_id, now).await?;

    tx.commit().await.map_err(|err| match err {
        StoreError::UniqueViolation => RegistrationError::DuplicateIdentity,
        StoreError::Database(err) => {
            error!("Failed to commit registration: {err}");
            RegistrationError::StoreUnavailable
        }
    })?;
    Ok(user_id)
}
