//! In-memory session table.
//!
//! Tokens are 256 bits from the OS CSPRNG, encoded base64url without padding.
//! Expiry is enforced on every lookup; the background sweeper only reclaims
//! memory.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::clock::Clock;
use crate::store::UserId;

pub const DEFAULT_SESSION_TTL: TimeDelta = TimeDelta::hours(24);

const TOKEN_BYTES: usize = 32;
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to gather token entropy: {0}")]
    Entropy(#[source] rand::Error),

    #[error("could not mint a unique session token")]
    Collision,

    #[error("session expiry is out of range")]
    ExpiryOverflow,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Valid strictly before `expires_at`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(SessionError::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.read().len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Mint a session for `user_id` expiring one TTL from now.
    ///
    /// # Errors
    /// Returns an error if the OS RNG fails, no unused token could be drawn, or
    /// the TTL pushes the expiry past what a timestamp can hold.
    pub fn create(&self, user_id: UserId) -> Result<Session, SessionError> {
        self.create_with(user_id, generate_token)
    }

    fn create_with(
        &self,
        user_id: UserId,
        mut next_token: impl FnMut() -> Result<String, SessionError>,
    ) -> Result<Session, SessionError> {
        for _ in 0..CREATE_ATTEMPTS {
            let token = next_token()?;
            let now = self.clock.now();
            let expires_at = now
                .checked_add_signed(self.ttl)
                .ok_or(SessionError::ExpiryOverflow)?;

            let mut sessions = self.sessions.write();
            // A dead entry under the same token may be overwritten.
            if sessions
                .get(&token)
                .is_some_and(|existing| existing.is_live(now))
            {
                continue;
            }

            let session = Session {
                token: token.clone(),
                user_id,
                expires_at,
            };
            sessions.insert(token, session.clone());
            return Ok(session);
        }

        error!(user_id, "session token collided {CREATE_ATTEMPTS} times");
        Err(SessionError::Collision)
    }

    /// Return the live session for `token`. Expired entries are dropped on sight.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<Session> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read();
            match sessions.get(token) {
                None => return None,
                Some(session) if session.is_live(now) => return Some(session.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write();
        if sessions
            .get(token)
            .is_some_and(|session| !session.is_live(now))
        {
            sessions.remove(token);
        }
        None
    }

    /// Remove `token`, returning the session it held. Absent tokens are fine.
    pub fn revoke(&self, token: &str) -> Option<Session> {
        self.sessions.write().remove(token)
    }

    /// Drop every expired entry and report how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.is_live(now));
        before - sessions.len()
    }

    /// Stored entries, including expired ones not yet reclaimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Periodically reclaim expired sessions.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "expired sessions purged");
            }
        }
    })
}
