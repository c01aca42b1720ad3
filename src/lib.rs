//! # Ghostpost
//!
//! Invitation-only multi-user blog service. This crate carries the account
//! core of the application:
//!
//! - **Signup** requires a single-use invitation code. Validating the code,
//!   inserting the user and marking the code used happen in one store
//!   transaction, so a failed signup never burns a code.
//! - **Login** verifies an Argon2id password hash and issues an opaque,
//!   256-bit session token carried in an `HttpOnly` cookie.
//! - **Authorization** is enforced by middleware: protected routes see a
//!   validated session; admin routes re-read the admin flag from the store on
//!   every request.
//!
//! Sessions live in process memory and expire lazily on lookup. Users and
//! invitation codes live in PostgreSQL (or an in-memory store for local runs).

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
