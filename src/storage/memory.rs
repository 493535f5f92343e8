use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{storage_key, Storage, StoreError};

/// In-process store with the same contract as [`super::JsonDataStore`].
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        let key = storage_key(id, type_name);
        let mut values = self.values.write().await;

        if values.contains_key(&key) {
            return Err(StoreError::Conflict {
                id: key.0,
                type_name: key.1,
            });
        }

        values.insert(key, value);
        Ok(())
    }

    async fn read(&self, id: &str, type_name: &str) -> Result<Value, StoreError> {
        let key = storage_key(id, type_name);

        self.values
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound {
                id: key.0,
                type_name: key.1,
            })
    }

    async fn update(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        let key = storage_key(id, type_name);
        let mut values = self.values.write().await;

        match values.get_mut(&key) {
            Some(current) => {
                *current = value;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                id: key.0,
                type_name: key.1,
            }),
        }
    }

    async fn exists(&self, id: &str, type_name: &str) -> Result<bool, StoreError> {
        let key = storage_key(id, type_name);
        Ok(self.values.read().await.contains_key(&key))
    }
}
