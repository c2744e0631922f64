//! Application state for the web layer.

use std::sync::Arc;

use crate::boards::BoardService;
use crate::config::HttpConfig;
use crate::discovery::Discovery;
use crate::hub::UpdateHub;
use crate::store::SnapshotStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Board builds over the snapshot store
    pub boards: BoardService,

    /// Live update fan-out
    pub hub: UpdateHub,

    /// Present when discovery is configured
    pub discovery: Option<Discovery>,

    pub http: Arc<HttpConfig>,
}

impl AppState {
    pub fn new(boards: BoardService, hub: UpdateHub, discovery: Option<Discovery>, http: HttpConfig) -> Self {
        Self {
            boards,
            hub,
            discovery,
            http: Arc::new(http),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        self.boards.store()
    }
}
