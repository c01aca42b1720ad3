//! Auth state shared by the workflows and the HTTP layer.

use chrono::TimeDelta;
use std::{fmt, sync::Arc};
use thiserror::Error;

use super::{
    audit::AuditLog,
    clock::Clock,
    password::{CredentialHasher, HashingConfig, HashingError},
    session::SessionStore,
};
use crate::store::Store;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Longest session lifetime accepted from configuration: one year.
pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error("session ttl must be between 1 and {MAX_SESSION_TTL_SECONDS} seconds, got {0}")]
    SessionTtl(i64),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
    hashing: HashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
            hashing: HashingConfig::default(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_hashing(mut self, hashing: HashingConfig) -> Self {
        self.hashing = hashing;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }

    #[must_use]
    pub fn hashing(&self) -> HashingConfig {
        self.hashing
    }
}

pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn Store>,
    hasher: CredentialHasher,
    sessions: Arc<SessionStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// Wire the hasher and session table from `config`.
    ///
    /// # Errors
    /// Returns an error if the hashing parameters are rejected or the session
    /// TTL is outside `1..=MAX_SESSION_TTL_SECONDS`.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self, ConfigError> {
        let seconds = config.session_ttl_seconds();
        let ttl = TimeDelta::try_seconds(seconds)
            .filter(|_| (1..=MAX_SESSION_TTL_SECONDS).contains(&seconds))
            .ok_or(ConfigError::SessionTtl(seconds))?;
        let hasher = CredentialHasher::new(config.hashing())?;
        let sessions = Arc::new(SessionStore::new(ttl, clock.clone()));
        Ok(Self {
            config,
            store,
            hasher,
            sessions,
            audit,
            clock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub fn audit(&self) -> &dyn AuditLog {
        self.audit.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::{audit::testing::RecordingAuditLog, clock::ManualClock};
    use crate::store::MemoryStore;
    use chrono::Utc;

    /// Auth state over an in-memory store with a cheap hasher.
    pub(crate) struct Harness {
        pub(crate) state: AuthState,
        pub(crate) store: MemoryStore,
        pub(crate) clock: Arc<ManualClock>,
        pub(crate) audit: Arc<RecordingAuditLog>,
    }

    pub(crate) fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let audit = Arc::new(RecordingAuditLog::default());
        let config = AuthConfig::new().with_hashing(HashingConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        });
        let state = AuthState::new(
            config,
            Arc::new(store.clone()),
            clock.clone(),
            audit.clone(),
        )
        .unwrap();
        Harness {
            state,
            store,
            clock,
            audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(config.session_ttl_seconds(), 86_400);
        assert!(!config.session_cookie_secure());
        assert_eq!(config.hashing(), HashingConfig::default());

        let config = config
            .with_session_ttl_seconds(60)
            .with_session_cookie_secure(true);
        assert_eq!(config.session_ttl_seconds(), 60);
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn session_ttl_follows_config() {
        let harness = testing::harness();
        assert_eq!(harness.state.sessions().ttl(), TimeDelta::hours(24));
    }

    fn state_with_ttl(seconds: i64) -> Result<AuthState, ConfigError> {
        let config = AuthConfig::new()
            .with_session_ttl_seconds(seconds)
            .with_hashing(HashingConfig {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            });
        AuthState::new(
            config,
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(crate::auth::clock::SystemClock),
            Arc::new(crate::auth::audit::TracingAuditLog),
        )
    }

    #[test]
    fn session_ttl_out_of_range_is_rejected() {
        for seconds in [0, -1, MAX_SESSION_TTL_SECONDS + 1, 10_000_000_000_000, i64::MAX] {
            assert!(
                matches!(state_with_ttl(seconds), Err(ConfigError::SessionTtl(s)) if s == seconds),
                "{seconds} accepted"
            );
        }

        let state = state_with_ttl(MAX_SESSION_TTL_SECONDS).unwrap();
        assert_eq!(state.sessions().ttl(), TimeDelta::days(365));
        assert!(state.sessions().create(1).is_ok());
    }
}
