use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use swarm_models::DebateRecord;
use uuid::Uuid;

/// In-memory hot cache of finished debate traces, backed by moka.
///
/// Only terminal debates are ever inserted, so a cached record never goes stale
/// with respect to its votes or decision. Outcome and execution updates
/// invalidate the entry.
pub struct DebateCache {
    inner: Cache<Uuid, Arc<DebateRecord>>,
}

impl DebateCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, debate_id: &Uuid) -> Option<Arc<DebateRecord>> {
        self.inner.get(debate_id).await
    }

    pub async fn insert(&self, record: DebateRecord) {
        self.inner.insert(record.debate.id, Arc::new(record)).await;
    }

    pub async fn invalidate(&self, debate_id: &Uuid) {
        self.inner.invalidate(debate_id).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
