use crate::error::PipelineError;
use chrono::Utc;
use common::{PlateRecord, PlateStore, PlateText, RecordOutcome};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Map distance along the course to a 1-based parking slot.
///
/// `slot = floor(distance_covered / total_distance * num_slots) + 1`. A slot
/// past `num_slots`, or a result that is not a finite positive number, is a
/// [`PipelineError::SlotOverflow`].
pub fn assign_slot(
    distance_covered: f64,
    total_distance: f64,
    num_slots: u32,
) -> Result<u32, PipelineError> {
    let raw = (distance_covered / total_distance * f64::from(num_slots)).floor() + 1.0;

    if !raw.is_finite() || raw < 1.0 || raw > f64::from(num_slots) {
        let slot = if raw.is_finite() { raw as i64 } else { i64::MAX };
        return Err(PipelineError::SlotOverflow {
            slot,
            capacity: num_slots,
        });
    }

    Ok(raw as u32)
}

/// Deduplicating front of the plate store.
///
/// The find-then-insert sequence runs under one async lock so concurrent
/// callers in this process cannot both insert the same plate.
pub struct RegistryService {
    store: Arc<dyn PlateStore>,
    guard: Mutex<()>,
    inserted: Mutex<Vec<PlateRecord>>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn PlateStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn PlateStore> {
        &self.store
    }

    /// Record the plate unless it is already registered.
    ///
    /// Existing records are left untouched and reported with their stored
    /// slot. Store failures surface as [`PipelineError::Connection`].
    pub async fn record_if_new(
        &self,
        plate: &PlateText,
        distance_covered: f64,
        total_distance: f64,
        num_slots: u32,
    ) -> Result<RecordOutcome, PipelineError> {
        let slot_id = assign_slot(distance_covered, total_distance, num_slots)?;

        let _held = self.guard.lock().await;

        let existing = self
            .store
            .find(plate)
            .await
            .map_err(|e| PipelineError::Connection(format!("{:#}", e)))?;

        if let Some(existing) = existing {
            debug!(plate = %plate, slot = existing.slot_id, "plate already registered");
            return Ok(RecordOutcome {
                slot_id: existing.slot_id,
                inserted: false,
            });
        }

        let record = PlateRecord {
            normalized_text: plate.clone(),
            slot_id,
            first_seen: Utc::now(),
        };

        let inserted = self
            .store
            .upsert(&record)
            .await
            .map_err(|e| PipelineError::Connection(format!("{:#}", e)))?;

        if inserted {
            info!(plate = %plate, slot = slot_id, "new plate registered");
            self.inserted.lock().await.push(record);
        }

        Ok(RecordOutcome { slot_id, inserted })
    }

    /// Plates inserted through this service, in insertion order
    pub async fn recorded(&self) -> Vec<PlateRecord> {
        self.inserted.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPlateStore;

    fn plate(text: &str) -> PlateText {
        PlateText::from_canonical(text).unwrap()
    }

    #[test]
    fn test_assign_slot() {
        assert_eq!(assign_slot(4.0, 10.0, 5).unwrap(), 3);
        assert_eq!(assign_slot(0.0, 10.0, 5).unwrap(), 1);
        assert_eq!(assign_slot(9.99, 10.0, 5).unwrap(), 5);
    }

    #[test]
    fn test_assign_slot_overflow() {
        // the finish line maps one past the last slot
        assert!(matches!(
            assign_slot(10.0, 10.0, 5),
            Err(PipelineError::SlotOverflow {
                slot: 6,
                capacity: 5
            })
        ));
        assert!(matches!(
            assign_slot(1.0, 0.0, 5),
            Err(PipelineError::SlotOverflow { .. })
        ));
        assert!(matches!(
            assign_slot(-3.0, 10.0, 5),
            Err(PipelineError::SlotOverflow { .. })
        ));
        assert!(matches!(
            assign_slot(f64::NAN, 10.0, 5),
            Err(PipelineError::SlotOverflow { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_plate_is_not_reinserted() {
        let store = Arc::new(MemoryPlateStore::new());
        let registry = RegistryService::new(store.clone());
        let text = plate("AB12CD3456");

        let first = registry.record_if_new(&text, 4.0, 10.0, 5).await.unwrap();
        assert_eq!(
            first,
            RecordOutcome {
                slot_id: 3,
                inserted: true
            }
        );

        let second = registry.record_if_new(&text, 8.0, 10.0, 5).await.unwrap();
        assert!(!second.inserted);
        assert_eq!(second.slot_id, 3);

        assert_eq!(store.len().await, 1);
        assert_eq!(registry.recorded().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overflow_does_not_touch_store() {
        let store = Arc::new(MemoryPlateStore::new());
        let registry = RegistryService::new(store.clone());

        let result = registry
            .record_if_new(&plate("AB12CD3456"), 10.0, 10.0, 5)
            .await;
        assert!(matches!(result, Err(PipelineError::SlotOverflow { .. })));
        assert!(store.is_empty().await);
    }
}
