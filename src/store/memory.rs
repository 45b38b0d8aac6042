//! In-process store

use super::{BlueprintStore, OptimizationHistoryRecord, OptimizedBlueprintRecord, StoreError};
use crate::graph::Blueprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryStore {
    blueprints: Arc<RwLock<HashMap<String, Blueprint>>>,
    optimized: Arc<RwLock<Vec<OptimizedBlueprintRecord>>>,
    history: Arc<RwLock<Vec<OptimizationHistoryRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_blueprint(&self, blueprint: Blueprint) {
        self.blueprints
            .write()
            .await
            .insert(blueprint.id.clone(), blueprint);
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn optimized_records(&self) -> Vec<OptimizedBlueprintRecord> {
        self.optimized.read().await.clone()
    }

    pub async fn history_records(&self) -> Vec<OptimizationHistoryRecord> {
        self.history.read().await.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlueprintStore for MemoryStore {
    async fn fetch_blueprint(&self, id: &str, user_id: &str) -> Result<Blueprint, StoreError> {
        self.blueprints
            .read()
            .await
            .get(id)
            .filter(|b| b.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert_optimized(&self, record: &OptimizedBlueprintRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.optimized.write().await.push(record.clone());
        Ok(())
    }

    async fn insert_history(&self, record: &OptimizationHistoryRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.history.write().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_is_scoped_to_owner() {
        let store = MemoryStore::new();
        store
            .insert_blueprint(Blueprint {
                id: "bp-1".to_string(),
                user_id: "alice".to_string(),
                name: None,
                nodes: vec![],
                edges: vec![],
            })
            .await;

        assert!(store.fetch_blueprint("bp-1", "alice").await.is_ok());
        assert!(matches!(
            store.fetch_blueprint("bp-1", "bob").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.fetch_blueprint("bp-2", "alice").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
