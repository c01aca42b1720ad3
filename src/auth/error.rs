use thiserror::Error;

use crate::store::StoreError;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvitationError {
    #[error("invitation code not found")]
    NotFound,

    #[error("invitation code already used")]
    AlreadyUsed,

    #[error("invitation code expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error("could not generate a unique invitation code")]
    Exhausted,

    #[error("failed to gather code entropy: {0}")]
    Entropy(#[source] rand::Error),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error("username or email already registered")]
    DuplicateIdentity,

    #[error("password hashing failed")]
    HashingFailed,

    #[error("store unavailable")]
    StoreUnavailable,
}

impl From<LedgerError> for RegistrationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Invitation(err) => Self::Invitation(err),
            LedgerError::Exhausted | LedgerError::Entropy(_) | LedgerError::Store(_) => {
                Self::StoreUnavailable
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("store unavailable")]
    StoreUnavailable,

    #[error("session could not be issued")]
    SessionUnavailable,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("no valid session")]
    NoSession,

    #[error("admin privileges required")]
    NotAdmin,

    #[error("resource belongs to another user")]
    NotOwner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_failures_map_to_registration_errors() {
        assert!(matches!(
            RegistrationError::from(LedgerError::Invitation(InvitationError::Expired)),
            RegistrationError::Invitation(InvitationError::Expired)
        ));
        assert!(matches!(
            RegistrationError::from(LedgerError::Store(StoreError::UniqueViolation)),
            RegistrationError::StoreUnavailable
        ));
    }

    #[test]
    fn invitation_errors_read_plainly() {
        let err = RegistrationError::from(InvitationError::AlreadyUsed);
        assert_eq!(err.to_string(), "invitation code already used");
    }
}
