//! Password login and logout.

use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use super::{
    audit::{AuditEvent, LoginFailure},
    error::AuthError,
    session::Session,
    state::AuthState,
};

impl AuthError {
    fn failure(&self) -> LoginFailure {
        match self {
            Self::UserNotFound => LoginFailure::UnknownUser,
            Self::WrongPassword => LoginFailure::WrongPassword,
            Self::StoreUnavailable => LoginFailure::StoreUnavailable,
            Self::SessionUnavailable => LoginFailure::SessionUnavailable,
        }
    }
}

/// Verify `username`/`password` and mint a session.
///
/// Unknown usernames still pay for one hash verification. Every attempt is
/// audited with the precise outcome.
///
/// # Errors
/// See [`AuthError`]. Callers must not reveal which of `UserNotFound` and
/// `WrongPassword` occurred.
pub async fn authenticate(
    state: &AuthState,
    username: &str,
    password: SecretString,
    origin: &str,
) -> Result<Session, AuthError> {
    let result = verify_and_issue(state, username, password).await;

    state.audit().record(AuditEvent::Login {
        username: username.to_string(),
        origin: origin.to_string(),
        success: result.is_ok(),
        failure: result.as_ref().err().map(AuthError::failure),
    });

    match &result {
        Ok(session) => info!(user_id = session.user_id, %username, %origin, "login succeeded"),
        Err(err) => warn!(%username, %origin, "login failed: {err}"),
    }
    result
}

async fn verify_and_issue(
    state: &AuthState,
    username: &str,
    password: SecretString,
) -> Result<Session, AuthError> {
    let credentials = state
        .store()
        .user_credentials(username.trim())
        .await
        .map_err(|err| {
            error!("Failed to load credentials: {err}");
            AuthError::StoreUnavailable
        })?;

    let Some(credentials) = credentials else {
        let _ = state.hasher().verify_blocking(password, None).await;
        return Err(AuthError::UserNotFound);
    };

    if !state
        .hasher()
        .verify_blocking(password, Some(credentials.password_hash))
        .await
    {
        return Err(AuthError::WrongPassword);
    }

    state.sessions().create(credentials.id).map_err(|err| {
        error!("Failed to create session: {err}");
        AuthError::SessionUnavailable
    })
}

/// Revoke `token`. Returns the session that was live, if any.
///
/// An expired entry is still removed but is neither audited nor returned.
pub fn logout(state: &AuthState, token: &str, origin: &str) -> Option<Session> {
    let session = state.sessions().revoke(token)?;
    if !session.is_live(state.clock().now()) {
        debug!(user_id = session.user_id, "expired session dropped on logout");
        return None;
    }
    state.audit().record(AuditEvent::Logout {
        user_id: session.user_id,
        origin: origin.to_string(),
    });
    info!(user_id = session.user_id, %origin, "logged out");
    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        clock::Clock,
        state::testing::{harness, Harness},
    };
    use crate::store::{NewUser, Store, UserId};
    use chrono::TimeDelta;

    async fn seed_user(harness: &Harness, username: &str, password: &str) -> UserId {
        let password_hash = harness
            .state
            .hasher()
            .hash(&SecretString::from(password.to_string()))
            .unwrap();
        harness
            .store
            .create_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash,
                is_admin: false,
                invitation_code: None,
                invited_by: None,
                created_at: harness.clock.now(),
            })
            .await
            .unwrap()
    }

    fn login_events(harness: &Harness) -> Vec<(bool, Option<LoginFailure>)> {
        harness
            .audit
            .events()
            .into_iter()
            .filter_map(|event| match event {
                AuditEvent::Login {
                    success, failure, ..
                } => Some((success, failure)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn correct_credentials_issue_a_session() {
        let harness = harness();
        let user_id = seed_user(&harness, "alice", "s3cret").await;

        let session = authenticate(
            &harness.state,
            "alice",
            SecretString::from("s3cret"),
            "192.0.2.1",
        )
        .await
        .unwrap();

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.expires_at, harness.clock.now() + TimeDelta::hours(24));
        assert_eq!(harness.state.sessions().lookup(&session.token), Some(session));
        assert_eq!(
            harness.audit.events(),
            vec![AuditEvent::Login {
                username: "alice".to_string(),
                origin: "192.0.2.1".to_string(),
                success: true,
                failure: None,
            }]
        );
    }

    #[tokio::test]
    async fn wrong_password_creates_no_session() {
        let harness = harness();
        seed_user(&harness, "alice", "s3cret").await;

        let result = authenticate(
            &harness.state,
            "alice",
            SecretString::from("guess"),
            "192.0.2.1",
        )
        .await;

        assert_eq!(result, Err(AuthError::WrongPassword));
        assert!(harness.state.sessions().is_empty());
        assert_eq!(
            login_events(&harness),
            vec![(false, Some(LoginFailure::WrongPassword))]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_audited_with_its_reason() {
        let harness = harness();

        let result = authenticate(
            &harness.state,
            "ghost",
            SecretString::from("anything"),
            "192.0.2.1",
        )
        .await;

        assert_eq!(result, Err(AuthError::UserNotFound));
        assert!(harness.state.sessions().is_empty());
        assert_eq!(
            login_events(&harness),
            vec![(false, Some(LoginFailure::UnknownUser))]
        );
    }

    #[tokio::test]
    async fn each_login_gets_its_own_session() {
        let harness = harness();
        seed_user(&harness, "alice", "s3cret").await;

        let first = authenticate(&harness.state, "alice", SecretString::from("s3cret"), "a")
            .await
            .unwrap();
        let second = authenticate(&harness.state, "alice", SecretString::from("s3cret"), "b")
            .await
            .unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(harness.state.sessions().len(), 2);
    }

    #[tokio::test]
    async fn logout_revokes_and_audits_once() {
        let harness = harness();
        let user_id = seed_user(&harness, "alice", "s3cret").await;
        let session = authenticate(&harness.state, "alice", SecretString::from("s3cret"), "a")
            .await
            .unwrap();

        let revoked = logout(&harness.state, &session.token, "198.51.100.7");
        assert_eq!(revoked.map(|s| s.user_id), Some(user_id));
        assert!(harness.state.sessions().lookup(&session.token).is_none());

        assert!(logout(&harness.state, &session.token, "198.51.100.7").is_none());

        let logouts: Vec<_> = harness
            .audit
            .events()
            .into_iter()
            .filter(|event| matches!(event, AuditEvent::Logout { .. }))
            .collect();
        assert_eq!(
            logouts,
            vec![AuditEvent::Logout {
                user_id,
                origin: "198.51.100.7".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn logout_after_expiry_is_not_audited() {
        let harness = harness();
        seed_user(&harness, "alice", "s3cret").await;
        let session = authenticate(&harness.state, "alice", SecretString::from("s3cret"), "a")
            .await
            .unwrap();

        harness.clock.advance(TimeDelta::hours(24));
        assert!(logout(&harness.state, &session.token, "198.51.100.7").is_none());
        assert!(harness.state.sessions().is_empty());
        assert!(!harness
            .audit
            .events()
            .iter()
            .any(|event| matches!(event, AuditEvent::Logout { .. })));
    }
}
