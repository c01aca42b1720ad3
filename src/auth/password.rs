//! Password hashing and verification using Argon2id.
//!
//! Hashes are stored in PHC string format, so each one carries its own salt
//! and cost parameters; verification always uses the parameters embedded in
//! the stored hash, which lets the work factor be raised without invalidating
//! existing accounts.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// Longest password accepted for hashing, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 1024;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashingError(String);

/// PHC-formatted Argon2id hash. Never holds the clear password.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedCredential(String);

impl HashedCredential {
    #[must_use]
    pub const fn new(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedCredential(..)")
    }
}

/// Argon2 work factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    dummy: HashedCredential,
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish_non_exhaustive()
    }
}

impl CredentialHasher {
    /// Build a hasher for `config`.
    ///
    /// # Errors
    /// Returns an error if the cost parameters are out of range for Argon2.
    pub fn new(config: HashingConfig) -> Result<Self, HashingError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|err| HashingError(format!("invalid cost parameters: {err}")))?;

        let mut hasher = Self {
            params,
            dummy: HashedCredential::new(String::new()),
        };
        // Verified against when the username is unknown so both login failure
        // paths cost one full hash.
        hasher.dummy = hasher.hash(&SecretString::from("ghostpost-dummy-credential"))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if the password is longer than [`MAX_PASSWORD_BYTES`]
    /// or Argon2 rejects the input.
    pub fn hash(&self, password: &SecretString) -> Result<HashedCredential, HashingError> {
        let input = password.expose_secret().as_bytes();
        if input.len() > MAX_PASSWORD_BYTES {
            return Err(HashingError(format!(
                "password exceeds {MAX_PASSWORD_BYTES} bytes"
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(input, &salt)
            .map_err(|err| HashingError(err.to_string()))?;
        Ok(HashedCredential(hash.to_string()))
    }

    /// Check `password` against a stored hash. Mismatches and malformed
    /// hashes both return `false`.
    #[must_use]
    pub fn verify(&self, password: &SecretString, hashed: &HashedCredential) -> bool {
        let parsed = match PasswordHash::new(hashed.as_str()) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("stored password hash is malformed: {err}");
                return false;
            }
        };

        match self
            .argon2()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
        {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(err) => {
                warn!("password verification error: {err}");
                false
            }
        }
    }

    /// Burn one verification against the dummy hash.
    pub fn verify_dummy(&self, password: &SecretString) {
        let _ = self.verify(password, &self.dummy);
    }

    /// [`Self::hash`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::hash`], plus a failure if the blocking task panics.
    pub async fn hash_blocking(
        &self,
        password: SecretString,
    ) -> Result<HashedCredential, HashingError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| HashingError(format!("hashing task failed: {err}")))?
    }

    /// [`Self::verify`] on the blocking pool; `None` hashes against the dummy.
    pub async fn verify_blocking(
        &self,
        password: SecretString,
        hashed: Option<HashedCredential>,
    ) -> bool {
        let hasher = self.clone();
        let task = tokio::task::spawn_blocking(move || match hashed {
            Some(hashed) => hasher.verify(&password, &hashed),
            None => {
                hasher.verify_dummy(&password);
                false
            }
        });

        match task.await {
            Ok(matched) => matched,
            Err(err) => {
                error!("password verification task failed: {err}");
                false
            }
        }
    }
}
