//! In-memory store of the latest snapshot per monitored source.
//!
//! Each source id maps to the most recent [`Snapshot`] received for it.
//! Snapshots are stored behind `Arc` and replaced wholesale, so a reader
//! sees either the old or the new snapshot for a key, never a mix. There is
//! no cross-key consistency: a board build may combine snapshots of
//! slightly different ages.
//!
//! Backed by a `moka` cache for lock-free concurrent reads and an optional
//! expiry for sources that stopped reporting.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;

use crate::domain::Snapshot;

/// Configuration for the snapshot store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Drop snapshots not refreshed within this long. `None` keeps them forever.
    pub ttl: Option<Duration>,

    /// Maximum number of sources kept.
    pub max_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            max_capacity: 10_000,
        }
    }
}

/// Latest snapshot per source id.
///
/// Cheap to clone; clones share the same underlying cache.
#[derive(Clone)]
pub struct SnapshotStore {
    snapshots: MokaCache<String, Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new(config: &StoreConfig) -> Self {
        let mut builder = MokaCache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            snapshots: builder.build(),
        }
    }

    /// Replace the snapshot for `source_id`.
    ///
    /// The stored snapshot's `source_id` is set to the key if it had none.
    pub async fn upsert(&self, source_id: impl Into<String>, mut snapshot: Snapshot) -> Arc<Snapshot> {
        let source_id = source_id.into();
        if snapshot.source_id.is_none() {
            snapshot.source_id = Some(source_id.clone());
        }

        let entry = Arc::new(snapshot);
        debug!(
            source = %source_id,
            monitors = entry.monitors.len(),
            "snapshot stored"
        );
        self.snapshots.insert(source_id, entry.clone()).await;
        entry
    }

    /// Latest snapshot for one source.
    pub async fn get(&self, source_id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(source_id).await
    }

    /// All snapshots with their source ids, ordered by source id.
    ///
    /// The ordering keeps board output stable across builds.
    pub fn entries(&self) -> Vec<(String, Arc<Snapshot>)> {
        let mut entries: Vec<(String, Arc<Snapshot>)> = self
            .snapshots
            .iter()
            .map(|(key, snapshot)| (key.as_ref().clone(), snapshot))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    /// All snapshots, ordered by source id.
    pub fn all(&self) -> Vec<Arc<Snapshot>> {
        self.entries().into_iter().map(|(_, s)| s).collect()
    }

    /// Number of stored sources.
    pub fn len(&self) -> usize {
        self.snapshots.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Monitor;

    fn snapshot_with(monitors: usize) -> Snapshot {
        Snapshot {
            ok: true,
            monitors: vec![Monitor::default(); monitors],
            ..Snapshot::default()
        }
    }

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.ttl, None);
        assert_eq!(config.max_capacity, 10_000);
    }

    #[tokio::test]
    async fn upsert_replaces_wholesale() {
        let store = SnapshotStore::new(&StoreConfig::default());

        store.upsert("4205", snapshot_with(3)).await;
        store.upsert("4205", snapshot_with(1)).await;

        let latest = store.get("4205").await.unwrap();
        assert_eq!(latest.monitors.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn upsert_fills_missing_source_id() {
        let store = SnapshotStore::new(&StoreConfig::default());

        let stored = store.upsert("diva_60200607", snapshot_with(0)).await;
        assert_eq!(stored.source_id.as_deref(), Some("diva_60200607"));

        let mut named = snapshot_with(0);
        named.source_id = Some("original".into());
        let stored = store.upsert("key", named).await;
        assert_eq!(stored.source_id.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn all_is_ordered_by_source_id() {
        let store = SnapshotStore::new(&StoreConfig::default());

        for id in ["c", "a", "b"] {
            store.upsert(id, snapshot_with(0)).await;
        }

        let ids: Vec<String> = store.entries().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.all().len(), 3);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_after_replacement() {
        let store = SnapshotStore::new(&StoreConfig::default());

        store.upsert("x", snapshot_with(2)).await;
        let before = store.all();
        store.upsert("x", snapshot_with(5)).await;

        assert_eq!(before[0].monitors.len(), 2);
        assert_eq!(store.all()[0].monitors.len(), 5);
    }

    #[tokio::test]
    async fn empty_store() {
        let store = SnapshotStore::new(&StoreConfig::default());
        assert!(store.is_empty());
        assert!(store.all().is_empty());
        assert!(store.get("missing").await.is_none());
    }
}
