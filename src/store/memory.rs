//! In-process store with the same transactional semantics as Postgres.
//!
//! A transaction takes the table lock for its whole lifetime and works on a
//! staged copy; `commit` publishes the copy, anything else discards it. That
//! makes every unit of work serializable, which is stricter than the
//! `FOR UPDATE` locking the Postgres backend relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    InvitationCode, NewInvitation, NewUser, Stats, Store, StoreError, Transaction, User,
    UserCredentials, UserId,
};
use crate::auth::password::HashedCredential;

#[derive(Clone, Debug)]
struct UserRow {
    user: User,
    password_hash: HashedCredential,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRow>,
    invitations: BTreeMap<i64, InvitationCode>,
    last_user_id: UserId,
    last_invitation_id: i64,
}

impl Tables {
    fn insert_user(&mut self, new: &NewUser) -> Result<UserId, StoreError> {
        let duplicate = self
            .users
            .values()
            .any(|row| row.user.username == new.username || row.user.email == new.email);
        if duplicate {
            return Err(StoreError::UniqueViolation);
        }

        self.last_user_id += 1;
        let id = self.last_user_id;
        self.users.insert(
            id,
            UserRow {
                user: User {
                    id,
                    username: new.username.clone(),
                    email: new.email.clone(),
                    is_admin: new.is_admin,
                    invitation_code: new.invitation_code.clone(),
                    invited_by: new.invited_by,
                    created_at: new.created_at,
                },
                password_hash: new.password_hash.clone(),
            },
        );
        Ok(id)
    }

    fn invitation_by_code(&self, code: &str) -> Option<&InvitationCode> {
        self.invitations.values().find(|invitation| invitation.code == code)
    }

    fn newest_invitations(&self, filter: impl Fn(&InvitationCode) -> bool) -> Vec<InvitationCode> {
        let mut invitations: Vec<InvitationCode> = self
            .invitations
            .values()
            .filter(|invitation| filter(invitation))
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        invitations
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn lock_invitation(&mut self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        Ok(self.staged.invitation_by_code(code).cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<UserId, StoreError> {
        self.staged.insert_user(user)
    }

    async fn mark_invitation_used(
        &mut self,
        invitation_id: i64,
        used_by: UserId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.staged.invitations.get_mut(&invitation_id) {
            Some(invitation) if !invitation.is_used => {
                invitation.is_used = true;
                invitation.used_by = Some(used_by);
                invitation.used_at = Some(used_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn user_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|row| row.user.username == username)
            .map(|row| UserCredentials {
                id: row.user.id,
                username: row.user.username.clone(),
                password_hash: row.password_hash.clone(),
            }))
    }

    async fn user_is_admin(&self, user_id: UserId) -> Result<Option<bool>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&user_id).map(|row| row.user.is_admin))
    }

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&user_id).map(|row| row.user.clone()))
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().map(|row| row.user.clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        self.tables.lock().await.insert_user(user)
    }

    async fn insert_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<InvitationCode, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.invitation_by_code(&invitation.code).is_some() {
            return Err(StoreError::UniqueViolation);
        }

        tables.last_invitation_id += 1;
        let created = InvitationCode {
            id: tables.last_invitation_id,
            code: invitation.code.clone(),
            created_by: invitation.created_by,
            used_by: None,
            is_used: false,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
            used_at: None,
        };
        tables.invitations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.invitation_by_code(code).cloned())
    }

    async fn invitations_by_creator(
        &self,
        creator: UserId,
    ) -> Result<Vec<InvitationCode>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.newest_invitations(move |invitation| invitation.created_by == creator))
    }

    async fn invitations(&self) -> Result<Vec<InvitationCode>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.newest_invitations(|_| true))
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let tables = self.tables.lock().await;
        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(Stats {
            users: count(tables.users.len()),
            admins: count(tables.users.values().filter(|row| row.user.is_admin).count()),
            invitations: count(tables.invitations.len()),
            invitations_used: count(tables.invitations.values().filter(|i| i.is_used).count()),
        })
    }

    async fn delete_non_admin_users(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.users.len();
        tables.users.retain(|_, row| row.user.is_admin);
        let deleted = before - tables.users.len();

        // Mirrors ON DELETE SET NULL on the referencing columns.
        let remaining: Vec<UserId> = tables.users.keys().copied().collect();
        for row in tables.users.values_mut() {
            if row.user.invited_by.is_some_and(|id| !remaining.contains(&id)) {
                row.user.invited_by = None;
            }
        }
        for invitation in tables.invitations.values_mut() {
            if invitation.used_by.is_some_and(|id| !remaining.contains(&id)) {
                invitation.used_by = None;
            }
        }

        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
