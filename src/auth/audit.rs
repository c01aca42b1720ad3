//! Audit trail for signup, login and logout attempts.

use std::fmt::Debug;
use tracing::{info, warn};

use crate::store::UserId;

pub const AUDIT_TARGET: &str = "ghostpost::audit";

/// Why a login was refused. Recorded for operators only, never returned to
/// the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginFailure {
    UnknownUser,
    WrongPassword,
    StoreUnavailable,
    SessionUnavailable,
}

impl LoginFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownUser => "unknown_user",
            Self::WrongPassword => "wrong_password",
            Self::StoreUnavailable => "store_unavailable",
            Self::SessionUnavailable => "session_unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    Signup {
        username: String,
        email: String,
        origin: String,
        success: bool,
    },
    Login {
        username: String,
        origin: String,
        success: bool,
        failure: Option<LoginFailure>,
    },
    Logout {
        user_id: UserId,
        origin: String,
    },
}

pub trait AuditLog: Send + Sync + Debug {
    fn record(&self, event: AuditEvent);
}

/// Emits every event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::Signup {
                username,
                email,
                origin,
                success: true,
            } => info!(target: AUDIT_TARGET, event = "signup", %username, %email, %origin, success = true),
            AuditEvent::Signup {
                username,
                email,
                origin,
                success: false,
            } => warn!(target: AUDIT_TARGET, event = "signup", %username, %email, %origin, success = false),
            AuditEvent::Login {
                username,
                origin,
                success: true,
                ..
            } => info!(target: AUDIT_TARGET, event = "login", %username, %origin, success = true),
            AuditEvent::Login {
                username,
                origin,
                success: false,
                failure,
            } => warn!(
                target: AUDIT_TARGET,
                event = "login",
                %username,
                %origin,
                success = false,
                reason = failure.map_or("unspecified", LoginFailure::as_str)
            ),
            AuditEvent::Logout { user_id, origin } => {
                info!(target: AUDIT_TARGET, event = "logout", user_id, %origin);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reasons_have_stable_names() {
        assert_eq!(LoginFailure::UnknownUser.as_str(), "unknown_user");
        assert_eq!(LoginFailure::WrongPassword.as_str(), "wrong_password");
        assert_eq!(LoginFailure::StoreUnavailable.as_str(), "store_unavailable");
        assert_eq!(
            LoginFailure::SessionUnavailable.as_str(),
            "session_unavailable"
        );
    }

    #[test]
    fn tracing_log_accepts_every_event() {
        let log = TracingAuditLog;
        log.record(AuditEvent::Signup {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            origin: "127.0.0.1".to_string(),
            success: false,
        });
        log.record(AuditEvent::Login {
            username: "alice".to_string(),
            origin: "127.0.0.1".to_string(),
            success: false,
            failure: Some(LoginFailure::WrongPassword),
        });
        log.record(AuditEvent::Logout {
            user_id: 1,
            origin: "127.0.0.1".to_string(),
        });
    }
}
