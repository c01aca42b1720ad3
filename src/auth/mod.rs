//! Session authentication and invitation-gated signup.
//!
//! Flow summary:
//! - `register` validates an invitation code, hashes the password, inserts the
//!   user and marks the code used inside one store transaction.
//! - `authenticate` verifies a password against the stored Argon2id hash and
//!   mints an in-memory session.
//! - `gate` turns the session cookie into a [`Session`] (and, for admin
//!   routes, re-checks the admin flag in the store) before a handler runs.
//!
//! Signup, login and logout attempts are reported through [`AuditLog`].

pub mod audit;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod gate;
pub mod invitation;
pub mod login;
pub mod password;
pub mod register;
pub mod session;
pub mod state;

pub use audit::{AuditEvent, AuditLog, LoginFailure, TracingAuditLog};
pub use bootstrap::{create_admin, ensure_admin, AdminAccount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthorizationError, InvitationError, LedgerError, RegistrationError};
pub use gate::{
    authorize_admin, authorize_owner, authorize_session, extract_session_token, require_admin,
    require_session, SESSION_COOKIE_NAME,
};
pub use invitation::Validity;
pub use login::{authenticate, logout};
pub use password::{CredentialHasher, HashedCredential, HashingConfig, HashingError};
pub use register::{register, Registration};
pub use session::{spawn_sweeper, Session, SessionError, SessionStore};
pub use state::{AuthConfig, AuthState, ConfigError, MAX_SESSION_TTL_SECONDS};
