//! Board builds against the live snapshot store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::store::SnapshotStore;

use super::aggregate::build_board;
use super::document::BoardDocument;
use super::registry::BoardRegistry;
use super::spec::BoardSpec;

/// Builds board documents on demand from the current store contents.
///
/// There is no document cache: every call recomputes from the latest
/// snapshots, so a document is never older than the data behind it.
#[derive(Clone)]
pub struct BoardService {
    registry: Arc<BoardRegistry>,
    store: SnapshotStore,
}

impl BoardService {
    pub fn new(registry: Arc<BoardRegistry>, store: SnapshotStore) -> Self {
        Self { registry, store }
    }

    /// Build a board stamped with the current time.
    pub fn build(&self, board_id: &str) -> BoardDocument {
        self.build_at(board_id, Utc::now().timestamp())
    }

    /// Build a board with an explicit timestamp.
    pub fn build_at(&self, board_id: &str, generated_at: i64) -> BoardDocument {
        let spec = self.registry.get(board_id);
        let snapshots = self.store.all();
        build_board(
            board_id,
            spec.as_deref(),
            snapshots.iter().map(Arc::as_ref),
            generated_at,
        )
    }

    /// Build every configured board.
    pub fn build_all(&self) -> Vec<BoardDocument> {
        self.registry
            .ids()
            .iter()
            .map(|id| self.build(id))
            .collect()
    }

    /// Swap the board specifications.
    pub fn replace_all(&self, specs: BTreeMap<String, BoardSpec>) {
        self.registry.replace_all(specs);
    }

    pub fn registry(&self) -> &BoardRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}
