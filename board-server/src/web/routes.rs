//! HTTP route handlers.

use std::convert::Infallible;

use askama::Template;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::{Stream, StreamExt, stream};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::boards::BoardDocument;
use crate::hub::StreamEvent;

use super::dto::*;
use super::state::AppState;
use super::templates::*;

/// Create the application router.
///
/// `static_dir` is the path to the static assets directory.
pub fn create_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health))
        .route("/api/wien", get(list_snapshots))
        .route("/api/board/:id", get(board_json))
        .route("/board/:id", get(board_page))
        .route("/api/stream", get(stream_updates))
        .route("/api/ha/announce", post(announce))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Index page listing the configured boards.
async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let boards = state
        .boards
        .registry()
        .titles()
        .into_iter()
        .map(|(id, title)| BoardLink { id, title })
        .collect();

    Html(
        IndexTemplate { boards }
            .render()
            .unwrap_or_else(|e| format!("Template error: {}", e)),
    )
}

/// Every cached snapshot, unaggregated.
async fn list_snapshots(State(state): State<AppState>) -> Json<SnapshotListResponse> {
    let items: Vec<_> = state
        .store()
        .all()
        .iter()
        .map(|snapshot| snapshot.as_ref().clone())
        .collect();

    Json(SnapshotListResponse {
        source: "bus-cache",
        count: items.len(),
        items,
    })
}

/// Board document; unknown boards yield an empty document.
async fn board_json(State(state): State<AppState>, Path(id): Path<String>) -> Json<BoardDocument> {
    Json(state.boards.build(&id))
}

/// Board rendered as HTML.
async fn board_page(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let doc = state.boards.build(&id);
    let template = BoardTemplate {
        board: BoardView::from_document(&doc),
    };

    let html = template.render().map_err(|e| AppError::Internal {
        message: format!("Template error: {}", e),
    })?;
    Ok(Html(html).into_response())
}

/// Server-sent events: an optional full snapshot, then every hub message.
async fn stream_updates(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe first so nothing published while the snapshot is built is lost.
    let updates = state.hub.stream();

    let initial = (state.http.snapshot_on_connect && !state.store().is_empty()).then(|| {
        StreamEvent::Snapshot {
            ts: Utc::now().timestamp(),
            items: state.store().all().iter().map(|s| s.as_ref().clone()).collect(),
        }
        .to_json()
    });

    info!(subscribers = state.hub.subscriber_count(), "stream client connected");

    let events = stream::iter(initial)
        .chain(updates)
        .map(|data| Ok(Event::default().data(data)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.http.keepalive()))
}

/// Publish discovery configs for every board.
async fn announce(State(state): State<AppState>) -> Response {
    let Some(discovery) = state.discovery.as_ref().filter(|d| d.is_enabled()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(AnnounceResponse::failed("discovery disabled")),
        )
            .into_response();
    };

    match discovery.announce_all() {
        Ok(boards) => Json(AnnounceResponse::announced(boards)).into_response(),
        Err(e) => {
            error!(error = %e, "discovery announce failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnnounceResponse::failed(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Internal { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        error!(%status, %message, "request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
