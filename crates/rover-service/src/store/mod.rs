//! Plate registry backends.

pub mod memory;
pub mod postgres;

pub use memory::MemoryPlateStore;
pub use postgres::PgPlateStore;

use crate::config::{RoverConfig, StoreType};
use crate::error::PipelineError;
use common::{PlateRecord, PlateStore};
use std::sync::Arc;

/// Open the configured store and verify it answers
pub async fn open_store(config: &RoverConfig) -> Result<Arc<dyn PlateStore>, PipelineError> {
    let store: Arc<dyn PlateStore> = match config.store_type {
        StoreType::Memory => {
            tracing::info!("Using in-memory plate store");
            Arc::new(MemoryPlateStore::new())
        }
        StoreType::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                PipelineError::Connection("DATABASE_URL is required for the postgres store".into())
            })?;
            Arc::new(PgPlateStore::connect(url, config.store_connect_timeout).await?)
        }
    };

    let failure = match store.health_check().await {
        Ok(true) => return Ok(store),
        Ok(false) => PipelineError::Connection("plate store health check failed".into()),
        Err(e) => PipelineError::Connection(format!("{:#}", e)),
    };
    close_store(store.as_ref()).await;
    Err(failure)
}

/// List every registered plate, closing the store whether or not the read succeeds
pub async fn list_plates(store: &dyn PlateStore) -> Result<Vec<PlateRecord>, PipelineError> {
    let listed = store
        .list()
        .await
        .map_err(|e| PipelineError::Connection(format!("{:#}", e)));
    close_store(store).await;
    listed
}

pub(crate) async fn close_store(store: &dyn PlateStore) {
    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "failed to close plate store");
    }
}
