use anyhow::Result;
use async_trait::async_trait;
use common::{PlateRecord, PlateStore, PlateText};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local plate registry for dry runs and tests
#[derive(Default)]
pub struct MemoryPlateStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    by_plate: HashMap<String, PlateRecord>,
    insertion_order: Vec<String>,
}

impl MemoryPlateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_plate.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PlateStore for MemoryPlateStore {
    async fn find(&self, plate: &PlateText) -> Result<Option<PlateRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.by_plate.get(plate.as_str()).cloned())
    }

    async fn upsert(&self, record: &PlateRecord) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let key = record.normalized_text.as_str();
        if inner.by_plate.contains_key(key) {
            return Ok(false);
        }

        inner.by_plate.insert(key.to_string(), record.clone());
        inner.insertion_order.push(key.to_string());
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<PlateRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .insertion_order
            .iter()
            .filter_map(|key| inner.by_plate.get(key).cloned())
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
