use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::info;

use super::open_store;
use crate::{
    api,
    auth::{
        ensure_admin, spawn_sweeper, AdminAccount, AuthConfig, AuthState, HashingConfig,
        SystemClock, TracingAuditLog,
    },
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_ttl_seconds: i64,
    pub session_sweep_seconds: u64,
    pub cookie_secure: bool,
    pub hashing: HashingConfig,
    pub admin: Option<AdminAccount>,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_session_cookie_secure(self.cookie_secure)
            .with_hashing(self.hashing)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be opened, the auth configuration is
/// rejected, the admin bootstrap fails, or the server fails to start.
pub async fn execute(mut args: Args) -> Result<()> {
    let auth_state = prepare(&mut args).await?;

    info!(
        session_ttl_seconds = args.session_ttl_seconds,
        cookie_secure = args.cookie_secure,
        "auth state ready"
    );

    let sweeper = spawn_sweeper(
        auth_state.sessions().clone(),
        Duration::from_secs(args.session_sweep_seconds),
    );

    let result = api::new(args.port, auth_state).await;
    sweeper.abort();
    result
}

async fn prepare(args: &mut Args) -> Result<Arc<AuthState>> {
    let store = open_store(&args.dsn).await?;

    let auth_state = AuthState::new(
        args.auth_config(),
        store,
        Arc::new(SystemClock),
        Arc::new(TracingAuditLog),
    )
    .context("Invalid auth configuration")?;

    if let Some(account) = args.admin.take() {
        match ensure_admin(&auth_state, account)
            .await
            .context("Failed to bootstrap admin")?
        {
            Some(user_id) => info!(user_id, "bootstrap admin created"),
            None => info!("admin already present, bootstrap skipped"),
        }
    }

    Ok(Arc::new(auth_state))
}
