//! Construct store adapters
//!
//! - [`InMemoryConstructStore`]: process-local, for tests and embedding
//! - [`FileConstructStore`]: one checksummed JSON file per construct
//! - [`SqliteConstructStore`]: SQLite database with compare-and-swap updates

pub mod error;
pub mod file;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use retryflow_core::ConstructStore;
use retryflow_domain::{Result as DomainResult, RetryFlowError, StoreBackend, StoreConfig};
use tracing::info;

pub use error::{StoreError, StoreResult};
pub use file::FileConstructStore;
pub use memory::InMemoryConstructStore;
pub use sqlite::SqliteConstructStore;

/// Build the store selected by `config`
///
/// # Errors
/// `RetryFlowError::Config` when a durable backend has no path, or the
/// backend's own error when it cannot be opened.
pub async fn build_store(config: &StoreConfig) -> DomainResult<Arc<dyn ConstructStore>> {
    let store: Arc<dyn ConstructStore> = match (config.backend, &config.path) {
        (StoreBackend::Memory, _) => Arc::new(InMemoryConstructStore::new()),
        (StoreBackend::File, Some(path)) => Arc::new(FileConstructStore::open(path.clone()).await?),
        (StoreBackend::Sqlite, Some(path)) => Arc::new(SqliteConstructStore::open(path)?),
        (backend, None) => {
            return Err(RetryFlowError::Config(format!(
                "store.path is required for the '{backend}' backend"
            )));
        }
    };
    info!(backend = %config.backend, "Construct store ready");
    Ok(store)
}
