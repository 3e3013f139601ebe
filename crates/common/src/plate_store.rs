use anyhow::Result;
use async_trait::async_trait;

use crate::plates::{PlateRecord, PlateText};

/// Trait for the persistent plate registry.
///
/// Implementations only need per-call consistency; the check-then-insert
/// sequence is serialized by the caller.
#[async_trait]
pub trait PlateStore: Send + Sync {
    /// Look up a plate by its normalized text
    async fn find(&self, plate: &PlateText) -> Result<Option<PlateRecord>>;

    /// Insert the record unless the plate already exists.
    ///
    /// Returns `true` when a new record was written. An existing record is
    /// never modified (first sighting wins).
    async fn upsert(&self, record: &PlateRecord) -> Result<bool>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<PlateRecord>>;

    // Health check
    async fn health_check(&self) -> Result<bool>;

    /// Release the underlying connection; further calls may fail
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
