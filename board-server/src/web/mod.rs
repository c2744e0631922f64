//! Web layer for the departure boards.
//!
//! Serves board documents as JSON and HTML, the raw snapshot cache, a live
//! update stream and the discovery trigger.

mod dto;
mod routes;
mod state;
pub mod templates;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
pub use templates::*;
