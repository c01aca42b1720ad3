//! Operator commands run straight against the store, outside any HTTP
//! session. Output goes to the supplied writer as plain text tables.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use tracing::info;

use crate::{
    auth::{
        create_admin,
        invitation::{create_code, list_all},
        AdminAccount, Clock, CredentialHasher, HashingConfig, SystemClock, Validity,
    },
    store::{Store, UserId},
};

#[derive(Debug)]
pub enum Command {
    CreateSuperuser(AdminAccount),
    ListUsers,
    CleanUsers {
        yes: bool,
    },
    GenerateCode {
        created_by: UserId,
        validity: Validity,
    },
    ListCodes,
}

/// Run `command` against `store`, writing results to `out`.
///
/// # Errors
/// Returns an error if input is invalid, the store fails or `out` cannot be
/// written.
pub async fn execute(store: &dyn Store, command: Command, out: &mut dyn Write) -> Result<()> {
    let now = SystemClock.now();
    match command {
        Command::CreateSuperuser(account) => {
            let username = account.username.trim().to_string();
            let hasher = CredentialHasher::new(HashingConfig::default())?;
            let id = create_admin(store, &hasher, account, now)
                .await
                .map_err(|err| anyhow!("{err}"))?;
            writeln!(out, "Created admin {username} (id {id})")?;
        }
        Command::ListUsers => {
            let users = store.users().await.context("Failed to list users")?;
            writeln!(
                out,
                "{:<6} {:<24} {:<32} {:<6} {:<8} CREATED",
                "ID", "USERNAME", "EMAIL", "ADMIN", "INVITER"
            )?;
            for user in users {
                writeln!(
                    out,
                    "{:<6} {:<24} {:<32} {:<6} {:<8} {}",
                    user.id,
                    user.username,
                    user.email,
                    if user.is_admin { "yes" } else { "no" },
                    user.invited_by.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    user.created_at.to_rfc3339(),
                )?;
            }
        }
        Command::CleanUsers { yes } => {
            if !yes {
                let stats = store.stats().await.context("Failed to load stats")?;
                writeln!(
                    out,
                    "Would delete {} non-admin user(s); rerun with --yes to confirm",
                    stats.users - stats.admins
                )?;
                return Ok(());
            }
            let deleted = store
                .delete_non_admin_users()
                .await
                .context("Failed to delete users")?;
            info!(deleted, "non-admin users deleted");
            writeln!(out, "Deleted {deleted} non-admin user(s)")?;
        }
        Command::GenerateCode {
            created_by,
            validity,
        } => {
            match store
                .user_is_admin(created_by)
                .await
                .context("Failed to look up creator")?
            {
                None => bail!("user {created_by} does not exist"),
                Some(false) => bail!("user {created_by} is not an admin"),
                Some(true) => {}
            }

            let invitation = create_code(store, created_by, validity, now).await?;
            info!(created_by, code = %invitation.code, "invitation code generated");
            writeln!(out, "{}", invitation.code)?;
        }
        Command::ListCodes => {
            let codes = list_all(store).await?;
            writeln!(
                out,
                "{:<36} {:<8} {:<8} {:<26} USED BY",
                "CODE", "CREATOR", "STATUS", "EXPIRES"
            )?;
            for code in codes {
                let status = if code.is_used {
                    "used"
                } else if code.is_expired(now) {
                    "expired"
                } else {
                    "active"
                };
                writeln!(
                    out,
                    "{:<36} {:<8} {:<8} {:<26} {}",
                    code.code,
                    code.created_by,
                    status,
                    code.expires_at
                        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
                    code.used_by.map_or_else(|| "-".to_string(), |id| id.to_string()),
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::HashedCredential;
    use crate::store::{MemoryStore, NewUser};
    use chrono::Utc;
    use secrecy::SecretString;

    async fn run(store: &MemoryStore, command: Command) -> Result<String> {
        let mut out = Vec::new();
        execute(store, command, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    async fn seed_user(store: &MemoryStore, username: &str, is_admin: bool) -> UserId {
        store
            .create_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: HashedCredential::new("$argon2id$stub".to_string()),
                is_admin,
                invitation_code: None,
                invited_by: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn superuser(username: &str, email: &str, password: &str) -> Command {
        Command::CreateSuperuser(AdminAccount {
            username: username.to_string(),
            email: email.to_string(),
            password: SecretString::from(password.to_string()),
        })
    }

    #[tokio::test]
    async fn create_superuser_stores_an_admin() {
        let store = MemoryStore::new();
        let output = run(&store, superuser(" admin ", "Admin@Example.com", "s3cret-pass"))
            .await
            .unwrap();
        assert!(output.starts_with("Created admin admin (id 1)"));

        let users = store.users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin);
        assert_eq!(users[0].email, "admin@example.com");

        let credentials = store.user_credentials("admin").await.unwrap().unwrap();
        assert!(credentials.password_hash.as_str().starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn create_superuser_rejects_bad_input_and_duplicates() {
        let store = MemoryStore::new();
        assert!(run(&store, superuser("admin", "not-an-email", "pw"))
            .await
            .is_err());
        assert!(run(&store, superuser("admin", "admin@example.com", ""))
            .await
            .is_err());

        seed_user(&store, "admin", true).await;
        let err = run(&store, superuser("admin", "other@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn generate_code_requires_an_admin_creator() {
        let store = MemoryStore::new();
        let admin = seed_user(&store, "admin", true).await;
        let member = seed_user(&store, "member", false).await;

        let code = run(
            &store,
            Command::GenerateCode {
                created_by: admin,
                validity: Validity::days(7),
            },
        )
        .await
        .unwrap();
        assert!(code.trim().starts_with("INV-"));

        let err = run(
            &store,
            Command::GenerateCode {
                created_by: member,
                validity: Validity::default(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("is not an admin"));

        let err = run(
            &store,
            Command::GenerateCode {
                created_by: 99,
                validity: Validity::default(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let listing = run(&store, Command::ListCodes).await.unwrap();
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains(code.trim()));
        assert!(listing.contains("active"));
    }

    #[tokio::test]
    async fn clean_users_needs_confirmation() {
        let store = MemoryStore::new();
        seed_user(&store, "admin", true).await;
        seed_user(&store, "alice", false).await;
        seed_user(&store, "bob", false).await;

        let dry_run = run(&store, Command::CleanUsers { yes: false }).await.unwrap();
        assert!(dry_run.contains("Would delete 2"));
        assert_eq!(store.users().await.unwrap().len(), 3);

        let deleted = run(&store, Command::CleanUsers { yes: true }).await.unwrap();
        assert!(deleted.contains("Deleted 2"));

        let listing = run(&store, Command::ListUsers).await.unwrap();
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("admin"));
        assert!(!listing.contains("alice"));
    }
}
