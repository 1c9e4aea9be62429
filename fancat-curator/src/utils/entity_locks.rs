//! Per-entity write serialization
//!
//! Two curation operations must never mutate the same entity at once. Callers
//! take the entity's lock for the whole read-modify-write unit. Multi-entity
//! operations (duplicate merges) lock in sorted id order so two merges over
//! overlapping groups cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-entity mutexes
#[derive(Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock one entity until the guard is dropped
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = self.entry(id).await;
        entry.lock_owned().await
    }

    /// Lock several entities in ascending id order
    pub async fn lock_many(&self, ids: &[Uuid]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Number of ids currently tracked
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }

    async fn entry(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        // Drop entries nobody holds or waits on
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
