pub mod manage;
pub mod server;

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::store::{MemoryStore, PgStore, Store};

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Manage {
        dsn: String,
        command: manage::Command,
    },
}

impl Action {
    /// Run the action to completion.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
            Self::Manage { dsn, command } => {
                let store = open_store(&dsn).await?;
                let mut stdout = std::io::stdout();
                manage::execute(store.as_ref(), command, &mut stdout).await
            }
        }
    }
}

/// Open the store named by `dsn`.
///
/// # Errors
/// Returns an error for an unparsable DSN, an unknown scheme or a database
/// that cannot be reached.
pub async fn open_store(dsn: &str) -> Result<Arc<dyn Store>> {
    let url = Url::parse(dsn).context("Invalid DSN")?;
    match url.scheme() {
        "postgres" | "postgresql" => {
            debug!(
                host = url.host_str().unwrap_or("localhost"),
                "connecting to postgres"
            );
            Ok(Arc::new(PgStore::connect(dsn).await?))
        }
        "memory" => {
            debug!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        scheme => bail!("Unsupported DSN scheme: {scheme}"),
    }
}
