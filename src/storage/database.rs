use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, SqlErr,
};
use serde_json::Value;

use super::{storage_key, Storage, StoreError};
use crate::entity::cip_fnct;

/// Postgres-backed JSON document store over the `cip_fnct` table.
#[derive(Clone)]
pub struct JsonDataStore {
    db: DatabaseConnection,
}

impl JsonDataStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Storage for JsonDataStore {
    async fn create(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        let (id, type_name) = storage_key(id, type_name);
        let cip_id = format!("urn:diwise:{type_name}:{id}");

        let model = cip_fnct::ActiveModel {
            id: Set(id.clone()),
            type_name: Set(type_name.clone()),
            cip_id: Set(cip_id),
            data: Set(value),
            created_on: Set(Some(Utc::now().fixed_offset())),
            updated_on: Set(None),
        };

        if let Err(e) = model.insert(&self.db).await {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                return Err(StoreError::Conflict { id, type_name });
            }
            return Err(e.into());
        }
        tracing::debug!(id = %id, type_name = %type_name, "Created state");

        Ok(())
    }

    async fn read(&self, id: &str, type_name: &str) -> Result<Value, StoreError> {
        let (id, type_name) = storage_key(id, type_name);

        cip_fnct::Entity::find_by_id((id.clone(), type_name.clone()))
            .one(&self.db)
            .await?
            .map(|m| m.data)
            .ok_or(StoreError::NotFound { id, type_name })
    }

    async fn update(&self, id: &str, type_name: &str, value: Value) -> Result<(), StoreError> {
        let (id, type_name) = storage_key(id, type_name);

        let result = cip_fnct::Entity::update_many()
            .col_expr(cip_fnct::Column::Data, Expr::value(value))
            .col_expr(
                cip_fnct::Column::UpdatedOn,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(cip_fnct::Column::Id.eq(id.as_str()))
            .filter(cip_fnct::Column::TypeName.eq(type_name.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound { id, type_name });
        }

        tracing::debug!(id = %id, type_name = %type_name, "Updated state");
        Ok(())
    }

    async fn exists(&self, id: &str, type_name: &str) -> Result<bool, StoreError> {
        let (id, type_name) = storage_key(id, type_name);

        let n = cip_fnct::Entity::find_by_id((id, type_name))
            .count(&self.db)
            .await?;

        Ok(n > 0)
    }
}
