//! Persistent store seam.
//!
//! The relational store (users, invitation codes) is an external dependency;
//! the auth core only talks to it through [`Store`] and the atomic unit of
//! work returned by [`Store::begin`]. A [`Transaction`] that is dropped
//! without [`Transaction::commit`] rolls back.
//!
//! Timestamps are always passed in by the caller so that expiry arithmetic is
//! driven by a single injected clock regardless of the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::password::HashedCredential;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type UserId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::UniqueViolation
        } else {
            Self::Database(err)
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Public view of a user row (no credential material).
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub invitation_code: Option<String>,
    pub invited_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Minimal fields needed to verify a login attempt.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: UserId,
    pub username: String,
    pub password_hash: HashedCredential,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: HashedCredential,
    pub is_admin: bool,
    pub invitation_code: Option<String>,
    pub invited_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InvitationCode {
    pub id: i64,
    pub code: String,
    pub created_by: UserId,
    pub used_by: Option<UserId>,
    pub is_used: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl InvitationCode {
    /// An expiration at or before `now` makes the code unusable.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub code: String,
    pub created_by: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters shown on the admin dashboard.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub users: i64,
    pub admins: i64,
    pub invitations: i64,
    pub invitations_used: i64,
}

/// Atomic unit of work against the store.
#[async_trait]
pub trait Transaction: Send {
    /// Read an invitation row and hold a lock on it until the unit ends.
    async fn lock_invitation(&mut self, code: &str) -> Result<Option<InvitationCode>, StoreError>;

    async fn insert_user(&mut self, user: &NewUser) -> Result<UserId, StoreError>;

    /// Flip `is_used` if it is still unset. Returns `false` when nothing changed.
    async fn mark_invitation_used(
        &mut self,
        invitation_id: i64,
        used_by: UserId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn user_credentials(&self, username: &str)
        -> Result<Option<UserCredentials>, StoreError>;

    /// `None` when the user does not exist.
    async fn user_is_admin(&self, user_id: UserId) -> Result<Option<bool>, StoreError>;

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// All users, newest first.
    async fn users(&self) -> Result<Vec<User>, StoreError>;

    /// Insert a user outside of the invitation workflow (superuser creation).
    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError>;

    async fn insert_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<InvitationCode, StoreError>;

    async fn invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError>;

    /// Codes created by `creator`, newest first.
    async fn invitations_by_creator(
        &self,
        creator: UserId,
    ) -> Result<Vec<InvitationCode>, StoreError>;

    /// Every code, newest first.
    async fn invitations(&self) -> Result<Vec<InvitationCode>, StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;

    /// Remove every non-admin user, returning how many rows were deleted.
    async fn delete_non_admin_users(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_is_detected_by_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::UniqueViolation));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("40001"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::Database(_)));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn invitation_expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let mut invitation = InvitationCode {
            id: 1,
            code: "INV-1-ABC".to_string(),
            created_by: 1,
            used_by: None,
            is_used: false,
            expires_at: Some(now),
            created_at: now - TimeDelta::days(1),
            used_at: None,
        };
        assert!(invitation.is_expired(now));
        assert!(!invitation.is_expired(now - TimeDelta::seconds(1)));

        invitation.expires_at = None;
        assert!(!invitation.is_expired(now + TimeDelta::days(10_000)));
    }
}
