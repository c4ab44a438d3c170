//! In-memory state store
//!
//! Useful for unit tests and dry runs that must not touch the filesystem.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::{State, StateStore};
use crate::ConfigValues;
use crate::asset::Asset;
use crate::error::{CoreError, Result};
use crate::release::ReleaseMetadata;

/// In-memory state store
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<RwLock<State>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for test assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub loads: usize,
    pub saves: usize,
}

fn poisoned() -> CoreError {
    CoreError::State {
        message: "state lock poisoned".to_string(),
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with previously persisted config values
    pub fn with_config(config: ConfigValues) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            state.v1.config = config;
        }
        store
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> State {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .map(|o| o.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn try_load(&self) -> Result<State> {
        self.operations.write().map_err(|_| poisoned())?.loads += 1;
        Ok(self.state.read().map_err(|_| poisoned())?.clone())
    }

    async fn serialize(
        &self,
        assets: &[Asset],
        metadata: &ReleaseMetadata,
        values: &ConfigValues,
    ) -> Result<()> {
        self.operations.write().map_err(|_| poisoned())?.saves += 1;
        *self.state.write().map_err(|_| poisoned())? =
            State::from_render(assets, metadata, values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_config_and_counts() {
        let mut config = ConfigValues::new();
        config.insert("a".to_string(), "b".to_string());
        let store = MemoryStateStore::with_config(config.clone());

        assert_eq!(store.load_config().await.unwrap(), config);

        store
            .serialize(&[], &ReleaseMetadata::default(), &ConfigValues::new())
            .await
            .unwrap();

        assert!(store.snapshot().config().is_empty());
        assert_eq!(
            store.operation_counts(),
            OperationCounts { loads: 1, saves: 1 }
        );
    }
}
