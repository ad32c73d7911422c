pub mod memory;
pub mod sqlite;

use std::sync::Arc;

pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;

use crate::{
    config::models::StoreConfig,
    ports::job_store::{JobStore, StoreResult},
};

/// Open the backend selected by configuration.
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn JobStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(InMemoryJobStore::new())),
        StoreConfig::Sqlite {
            url,
            max_connections,
        } => Ok(Arc::new(
            SqliteJobStore::connect_with_options(url, *max_connections).await?,
        )),
    }
}
