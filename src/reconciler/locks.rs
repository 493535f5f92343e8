use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::functions::EntityKind;

type Key = (EntityKind, String);
type Table = Arc<Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>>;

/// Per-entity mutual exclusion.
///
/// Entries are created on first use and removed again once the last holder or
/// waiter for a key is gone, so the table only holds entities that are being
/// reconciled right now.
#[derive(Default, Clone)]
pub struct KeyedLocks {
    table: Table,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the entity `(kind, id)`.
    pub async fn lock(&self, kind: EntityKind, id: &str) -> KeyedLockGuard {
        let key = (kind, id.to_lowercase());

        let mutex = match self.table.lock() {
            Ok(mut table) => table.entry(key.clone()).or_default().clone(),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(key.clone())
                .or_default()
                .clone(),
        };

        let entry = Entry {
            key,
            table: self.table.clone(),
            mutex: Some(mutex.clone()),
        };

        let guard = mutex.lock_owned().await;

        KeyedLockGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of entities currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().map_or(0, |t| t.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while an entity is being reconciled.
pub struct KeyedLockGuard {
    // field order matters: the mutex is released before the entry is cleaned up
    _guard: OwnedMutexGuard<()>,
    _entry: Entry,
}

/// A live reference to one table slot. Dropping the last one removes the slot.
struct Entry {
    key: Key,
    table: Table,
    mutex: Option<Arc<AsyncMutex<()>>>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        drop(self.mutex.take());

        let Ok(mut table) = self.table.lock() else {
            return;
        };

        if table
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            table.remove(&self.key);
        }
    }
}
