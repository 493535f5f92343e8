//! Entity state persistence.
//!
//! State is stored as JSON documents keyed by the lower-cased pair
//! `(id, type name)`. [`get_or_default`] and [`create_or_update`] layer the
//! typed load/save used by the reconciler on top of the raw [`Storage`] trait.

mod database;
mod memory;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use database::JsonDataStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No {type_name} stored with id {id}")]
    NotFound { id: String, type_name: String },

    #[error("A {type_name} with id {id} already exists")]
    Conflict { id: String, type_name: String },
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError>;
    async fn read(&self, id: &str, type_name: &str) -> Result<Value, StoreError>;
    async fn update(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError>;
    async fn exists(&self, id: &str, type_name: &str) -> Result<bool, StoreError>;
}

/// Normalised storage key.
pub(crate) fn storage_key(id: &str, type_name: &str) -> (String, String) {
    (id.to_lowercase(), type_name.to_lowercase())
}

/// Read and decode a stored value.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if nothing is stored under the key, or any
/// read/decode failure.
pub async fn get<T: DeserializeOwned>(
    store: &dyn Storage,
    id: &str,
    type_name: &str,
) -> Result<T, StoreError> {
    let value = store.read(id, type_name).await?;
    Ok(serde_json::from_value(value)?)
}

/// Read a stored value, or return `default` when none exists yet.
///
/// # Errors
///
/// Returns any failure other than a missing record.
pub async fn get_or_default<T: DeserializeOwned>(
    store: &dyn Storage,
    id: &str,
    type_name: &str,
    default: T,
) -> Result<T, StoreError> {
    match get(store, id, type_name).await {
        Ok(value) => Ok(value),
        Err(StoreError::NotFound { .. }) => Ok(default),
        Err(e) => Err(e),
    }
}

/// Persist `value`, creating the record if it does not exist yet.
///
/// # Errors
///
/// Returns any serialization or store failure.
pub async fn create_or_update<T: Serialize>(
    store: &dyn Storage,
    id: &str,
    type_name: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value)?;

    if store.exists(id, type_name).await? {
        store.update(id, type_name, value).await
    } else {
        store.create(id, type_name, value).await
    }
}
