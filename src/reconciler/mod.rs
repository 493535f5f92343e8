//! The resolve → load → handle → persist → publish pipeline.

mod locks;

use std::sync::Arc;

use crate::error::AppResult;
use crate::functions::EntityKind;
use crate::messaging::{IncomingMessage, Publisher};
use crate::storage::{self, Storage};
use crate::things::{ThingsClient, ThingsError};

pub use locks::{KeyedLockGuard, KeyedLocks};

pub struct Reconciler {
    things: Arc<dyn ThingsClient>,
    store: Arc<dyn Storage>,
    publisher: Arc<dyn Publisher>,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(
        things: Arc<dyn ThingsClient>,
        store: Arc<dyn Storage>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            things,
            store,
            publisher,
            locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Reconcile one message against the `kind` entity related to `subject_id`.
    ///
    /// Returns `Ok(false)` when the subject has no related entity of that kind
    /// or the message did not change it.
    ///
    /// # Errors
    ///
    /// - `AppError::Things` if the registry cannot be queried
    /// - `AppError::Store` if the current state cannot be loaded
    /// - `AppError::Handle` if the message is rejected by the entity
    /// - `AppError::Publish` if the update cannot be published
    pub async fn process(
        &self,
        kind: EntityKind,
        subject_id: &str,
        msg: &IncomingMessage,
    ) -> AppResult<bool> {
        let related = match self.things.find_related_things(subject_id).await {
            Ok(related) => related,
            Err(ThingsError::NotFound) => {
                tracing::debug!(subject_id, entity_type = %kind, "Subject not known to registry");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(related) = related.into_iter().find(|t| t.is_type(kind.type_name())) else {
            tracing::debug!(subject_id, entity_type = %kind, "No related entity of this type");
            return Ok(false);
        };

        let entity = self.things.find_by_id(&related.id).await?;
        let tenant = entity.tenant_or_default();

        let _guard = self.locks.lock(kind, &entity.id).await;

        let mut state = kind
            .load_or_default(self.store.as_ref(), &entity.id, &tenant)
            .await?;

        let changed = match state.handle(msg, self.things.as_ref()).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(
                    entity_id = %entity.id,
                    entity_type = %kind,
                    error = %e,
                    body = %msg.body_lossy(),
                    "Failed to handle message"
                );
                return Err(e.into());
            }
        };

        if !changed {
            tracing::debug!(entity_id = %entity.id, entity_type = %kind, "Entity unchanged");
            return Ok(false);
        }

        if let Err(e) =
            storage::create_or_update(self.store.as_ref(), state.id(), kind.type_name(), &state)
                .await
        {
            // not fatal, the update is still published
            tracing::error!(
                entity_id = %entity.id,
                entity_type = %kind,
                error = %e,
                "Failed to persist entity"
            );
        }

        let outgoing = state.to_message()?;
        self.publisher.publish(&outgoing).await?;

        tracing::info!(
            entity_id = %entity.id,
            entity_type = %kind,
            tenant = %tenant,
            "Entity updated"
        );

        Ok(true)
    }
}
