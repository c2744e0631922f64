//! Data transfer objects for web responses.

use serde::Serialize;

use crate::domain::Snapshot;

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Raw snapshot cache contents.
#[derive(Debug, Serialize)]
pub struct SnapshotListResponse {
    /// Where the snapshots came from; always `bus-cache`.
    pub source: &'static str,

    pub count: usize,

    /// Snapshots ordered by source id
    pub items: Vec<Snapshot>,
}

/// Result of a discovery announcement.
#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub ok: bool,

    /// Boards whose sensors were announced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boards: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnounceResponse {
    pub fn announced(boards: Vec<String>) -> Self {
        Self {
            ok: true,
            boards: Some(boards),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            boards: None,
            error: Some(error.into()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
