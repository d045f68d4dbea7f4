//! Backend selection at startup.

use crate::config::StoreConfig;
use crate::file::FileLedgerStore;
use crate::timeout::TimeoutStore;
use std::sync::Arc;
use tally_core::Result;
use tally_core::ports::LedgerStore;
use tally_db::{Database, PgLedgerStore};
use tracing::{info, warn};

/// Open the configured ledger store.
///
/// With a database URL the remote store is connected and migrated. If that
/// fails and `fallback_to_local` is set, the file store in `data_dir` is used
/// instead for the lifetime of the process. The returned store enforces the
/// configured per-call deadline.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn LedgerStore>> {
    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => match connect_remote(url, config).await {
            Ok(store) => {
                info!("Using PostgreSQL ledger store");
                Arc::new(store)
            }
            Err(e) if config.fallback_to_local => {
                warn!(
                    error = %e,
                    data_dir = %config.data_dir.display(),
                    "Remote ledger store unavailable, falling back to local file store"
                );
                Arc::new(FileLedgerStore::open(&config.data_dir).await?)
            }
            Err(e) => return Err(e),
        },
        None => {
            info!(data_dir = %config.data_dir.display(), "No database configured, using local file store");
            Arc::new(FileLedgerStore::open(&config.data_dir).await?)
        }
    };

    Ok(Arc::new(TimeoutStore::new(store, config.operation_timeout())))
}

async fn connect_remote(url: &str, config: &StoreConfig) -> Result<PgLedgerStore> {
    let db = Database::connect_with(url, config.max_connections, config.connect_timeout()).await?;
    db.migrate().await?;
    Ok(PgLedgerStore::new(db.pool().clone()))
}
