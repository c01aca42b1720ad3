//! PostgreSQL implementation of the store seam.
//!
//! Schema lives in `sql/schema.sql` and is applied by an external migration
//! step. Every statement runs inside a `db.query` span.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Connection, PgPool, Postgres, Row};
use std::time::Duration;
use tracing::Instrument;

use super::{
    InvitationCode, NewInvitation, NewUser, Stats, Store, StoreError, Transaction, User,
    UserCredentials, UserId,
};
use crate::auth::password::HashedCredential;

const INVITATION_COLUMNS: &str =
    "id, code, created_by, used_by, is_used, expires_at, created_at, used_at";

const USER_COLUMNS: &str = "id, username, email, is_admin, invitation_code, invited_by, created_at";

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a small pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

const INSERT_USER: &str = r"
    INSERT INTO users
        (username, email, password_hash, is_admin, invitation_code, invited_by, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
    RETURNING id
";

#[async_trait]
impl Transaction for PgTransaction {
    async fn lock_invitation(&mut self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        // FOR UPDATE serializes concurrent redemptions of the same code: the
        // loser blocks here and then observes the committed `is_used`.
        let query = format!("SELECT {INVITATION_COLUMNS} FROM invitation_codes WHERE code = $1 FOR UPDATE");
        let span = query_span("SELECT", &query);
        let invitation = sqlx::query_as::<_, InvitationCode>(&query)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(invitation)
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<UserId, StoreError> {
        let span = query_span("INSERT", INSERT_USER);
        let row = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password_hash.as_str())
            .bind(user.is_admin)
            .bind(user.invitation_code.as_deref())
            .bind(user.invited_by)
            .bind(user.created_at)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(row.try_get("id")?)
    }

    async fn mark_invitation_used(
        &mut self,
        invitation_id: i64,
        used_by: UserId,
        used_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE invitation_codes
            SET is_used = TRUE, used_by = $1, used_at = $2
            WHERE id = $3 AND is_used = FALSE
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(used_by)
            .bind(used_at)
            .bind(invitation_id)
            .execute(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn user_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let query = "SELECT id, username, password_hash FROM users WHERE username = $1";
        let span = query_span("SELECT", query);
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| -> Result<UserCredentials, StoreError> {
            Ok(UserCredentials {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                password_hash: HashedCredential::new(row.try_get::<String, _>("password_hash")?),
            })
        })
        .transpose()
    }

    async fn user_is_admin(&self, user_id: UserId) -> Result<Option<bool>, StoreError> {
        let query = "SELECT is_admin FROM users WHERE id = $1";
        let span = query_span("SELECT", query);
        let flag = sqlx::query_scalar::<_, bool>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(flag)
    }

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = query_span("SELECT", &query);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(user)
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC");
        let span = query_span("SELECT", &query);
        let users = sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        Ok(users)
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        let span = query_span("INSERT", INSERT_USER);
        let row = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password_hash.as_str())
            .bind(user.is_admin)
            .bind(user.invitation_code.as_deref())
            .bind(user.invited_by)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.try_get("id")?)
    }

    async fn insert_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<InvitationCode, StoreError> {
        let query = format!(
            "INSERT INTO invitation_codes (code, created_by, expires_at, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {INVITATION_COLUMNS}"
        );
        let span = query_span("INSERT", &query);
        let created = sqlx::query_as::<_, InvitationCode>(&query)
            .bind(&invitation.code)
            .bind(invitation.created_by)
            .bind(invitation.expires_at)
            .bind(invitation.created_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(created)
    }

    async fn invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        let query = format!("SELECT {INVITATION_COLUMNS} FROM invitation_codes WHERE code = $1");
        let span = query_span("SELECT", &query);
        let invitation = sqlx::query_as::<_, InvitationCode>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(invitation)
    }

    async fn invitations_by_creator(
        &self,
        creator: UserId,
    ) -> Result<Vec<InvitationCode>, StoreError> {
        let query = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitation_codes \
             WHERE created_by = $1 ORDER BY created_at DESC, id DESC"
        );
        let span = query_span("SELECT", &query);
        let invitations = sqlx::query_as::<_, InvitationCode>(&query)
            .bind(creator)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        Ok(invitations)
    }

    async fn invitations(&self) -> Result<Vec<InvitationCode>, StoreError> {
        let query = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitation_codes ORDER BY created_at DESC, id DESC"
        );
        let span = query_span("SELECT", &query);
        let invitations = sqlx::query_as::<_, InvitationCode>(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        Ok(invitations)
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let query = r"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM users WHERE is_admin) AS admins,
                (SELECT COUNT(*) FROM invitation_codes) AS invitations,
                (SELECT COUNT(*) FROM invitation_codes WHERE is_used) AS invitations_used
        ";
        let span = query_span("SELECT", query);
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(Stats {
            users: row.try_get("users")?,
            admins: row.try_get("admins")?,
            invitations: row.try_get("invitations")?,
            invitations_used: row.try_get("invitations_used")?,
        })
    }

    async fn delete_non_admin_users(&self) -> Result<u64, StoreError> {
        let query = "DELETE FROM users WHERE is_admin = FALSE";
        let span = query_span("DELETE", query);
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
