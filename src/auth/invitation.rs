//! Invitation ledger: single-use codes that gate registration.
//!
//! Redemption always happens inside a store [`Transaction`] so that marking a
//! code used commits or rolls back together with the new user row.

use chrono::{DateTime, TimeDelta, Utc};
use rand::{rngs::OsRng, RngCore};
use tracing::{info, warn};

use super::error::{InvitationError, LedgerError};
use crate::store::{InvitationCode, NewInvitation, Store, StoreError, Transaction, UserId};

pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

const CODE_PREFIX: &str = "INV";
const CODE_SUFFIX_LEN: usize = 12;
const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INSERT_ATTEMPTS: usize = 3;

/// How long a new code stays redeemable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    For(TimeDelta),
    NeverExpires,
}

impl Default for Validity {
    fn default() -> Self {
        Self::For(TimeDelta::days(DEFAULT_VALIDITY_DAYS))
    }
}

impl Validity {
    #[must_use]
    pub fn days(days: i64) -> Self {
        Self::For(TimeDelta::days(days))
    }

    #[must_use]
    pub fn expires_at(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::For(window) => Some(now + window),
            Self::NeverExpires => None,
        }
    }
}

/// `INV-<unix seconds>-<12 random chars from A-Z0-9>`.
fn generate_code(now: DateTime<Utc>) -> Result<String, LedgerError> {
    let mut suffix = String::with_capacity(CODE_SUFFIX_LEN);
    let mut buf = [0u8; 32];
    while suffix.len() < CODE_SUFFIX_LEN {
        OsRng.try_fill_bytes(&mut buf).map_err(LedgerError::Entropy)?;
        // Rejection sampling keeps every character equally likely.
        for byte in buf.iter().copied().filter(|b| *b < 252) {
            if suffix.len() == CODE_SUFFIX_LEN {
                break;
            }
            suffix.push(char::from(CODE_ALPHABET[usize::from(byte % 36)]));
        }
    }
    Ok(format!("{CODE_PREFIX}-{}-{suffix}", now.timestamp()))
}

/// Persist a fresh unused code for `creator`.
///
/// Privilege checks belong to the caller.
///
/// # Errors
/// Returns an error if the store fails or no unique code could be generated.
pub async fn create_code(
    store: &dyn Store,
    creator: UserId,
    validity: Validity,
    now: DateTime<Utc>,
) -> Result<InvitationCode, LedgerError> {
    create_code_with(store, creator, validity, now, generate_code).await
}

async fn create_code_with(
    store: &dyn Store,
    creator: UserId,
    validity: Validity,
    now: DateTime<Utc>,
    mut next_code: impl FnMut(DateTime<Utc>) -> Result<String, LedgerError> + Send,
) -> Result<InvitationCode, LedgerError> {
    let expires_at = validity.expires_at(now);
    for _ in 0..INSERT_ATTEMPTS {
        let new = NewInvitation {
            code: next_code(now)?,
            created_by: creator,
            expires_at,
            created_at: now,
        };
        match store.insert_invitation(&new).await {
            Ok(invitation) => {
                info!(
                    code = %invitation.code,
                    created_by = creator,
                    expires_at = ?invitation.expires_at,
                    "invitation code created"
                );
                return Ok(invitation);
            }
            Err(StoreError::UniqueViolation) => {
                warn!(code = %new.code, "invitation code collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(LedgerError::Exhausted)
}

fn check_redeemable(
    invitation: Option<InvitationCode>,
    now: DateTime<Utc>,
) -> Result<InvitationCode, InvitationError> {
    let invitation = invitation.ok_or(InvitationError::NotFound)?;
    if invitation.is_expired(now) {
        return Err(InvitationError::Expired);
    }
    if invitation.is_used {
        return Err(InvitationError::AlreadyUsed);
    }
    Ok(invitation)
}

/// Lock `code` for the rest of `tx` and confirm it can still be redeemed.
///
/// # Errors
/// Returns the matching [`InvitationError`] or a store failure.
pub async fn lookup_for_redemption(
    tx: &mut dyn Transaction,
    code: &str,
    now: DateTime<Utc>,
) -> Result<InvitationCode, LedgerError> {
    let invitation = tx.lock_invitation(code).await?;
    Ok(check_redeemable(invitation, now)?)
}

/// Mark `code` used by `redeemer` inside `tx` and return its creator.
///
/// Nothing is durable until `tx` commits.
///
/// # Errors
/// Returns the matching [`InvitationError`] or a store failure.
pub async fn redeem(
    tx: &mut dyn Transaction,
    code: &str,
    redeemer: UserId,
    now: DateTime<Utc>,
) -> Result<UserId, LedgerError> {
    let invitation = lookup_for_redemption(tx, code, now).await?;
    if !tx.mark_invitation_used(invitation.id, redeemer, now).await? {
        return Err(InvitationError::AlreadyUsed.into());
    }
    Ok(invitation.created_by)
}

/// Codes created by `creator`, newest first.
///
/// # Errors
/// Returns an error if the store fails.
pub async fn list_by_creator(
    store: &dyn Store,
    creator: UserId,
) -> Result<Vec<InvitationCode>, LedgerError> {
    Ok(store.invitations_by_creator(creator).await?)
}

/// Every code, newest first.
///
/// # Errors
/// Returns an error if the store fails.
pub async fn list_all(store: &dyn Store) -> Result<Vec<InvitationCode>, LedgerError> {
    Ok(store.invitations().await?)
}
