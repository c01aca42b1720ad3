//! Admin accounts created outside the invitation flow: the operator's
//! `createsuperuser` command and the server's startup bootstrap.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{debug, error, info};

use super::{
    error::RegistrationError,
    password::CredentialHasher,
    register::{validate_identity, validate_password},
    state::AuthState,
};
use crate::store::{NewUser, Store, StoreError, UserId};

#[derive(Debug)]
pub struct AdminAccount {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

/// Validate, hash and insert `account` with the admin flag set.
///
/// # Errors
/// Same input and uniqueness rules as signup; see [`RegistrationError`].
pub async fn create_admin(
    store: &dyn Store,
    hasher: &CredentialHasher,
    account: AdminAccount,
    now: DateTime<Utc>,
) -> Result<UserId, RegistrationError> {
    let (username, email) = validate_identity(&account.username, &account.email)?;
    validate_password(&account.password)?;

    let password_hash = hasher.hash_blocking(account.password).await.map_err(|err| {
        error!("Failed to hash admin password: {err}");
        RegistrationError::HashingFailed
    })?;

    let user = NewUser {
        username,
        email,
        password_hash,
        is_admin: true,
        invitation_code: None,
        invited_by: None,
        created_at: now,
    };
    match store.create_user(&user).await {
        Ok(user_id) => {
            info!(user_id, username = %user.username, "admin created");
            Ok(user_id)
        }
        Err(StoreError::UniqueViolation) => Err(RegistrationError::DuplicateIdentity),
        Err(err) => {
            error!("Failed to create admin: {err}");
            Err(RegistrationError::StoreUnavailable)
        }
    }
}

/// Create `account` unless the store already holds an admin.
///
/// Returns the new id, or `None` when an admin was already present.
///
/// # Errors
/// See [`create_admin`].
pub async fn ensure_admin(
    state: &AuthState,
    account: AdminAccount,
) -> Result<Option<UserId>, RegistrationError> {
    let stats = state.store().stats().await.map_err(|err| {
        error!("Failed to count admins: {err}");
        RegistrationError::StoreUnavailable
    })?;
    if stats.admins > 0 {
        debug!(admins = stats.admins, "admin bootstrap skipped");
        return Ok(None);
    }

    create_admin(state.store(), state.hasher(), account, state.clock().now())
        .await
        .map(Some)
}
