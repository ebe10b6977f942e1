//! HTTP Module
//!
//! FDSN dataselect-style endpoint over the merge engine.
//!
//! ## Routes
//! - `GET  /fdsnws/dataselect/1/query` selection in query parameters
//! - `POST /fdsnws/dataselect/1/query` selection lines in the body
//! - `GET  /health`
//!
//! ## Status Selection
//! ```text
//! parse ──bad──→ 400
//!   ↓
//! prepare ──too many──→ 413 (found + limit in body)
//!   ↓     ──nothing───→ 204
//! stream into duplex pipe
//!   ↓
//! first chunk? ──none──→ 204 (or the stream's own error)
//!   ↓
//! 200 application/vnd.fdsn.mseed, rest streamed; later errors only logged
//! ```

mod handlers;
mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;

use crate::merge::MergeEngine;

pub use handlers::status_for;
pub use server::HttpServer;

/// Route for dataselect queries
pub const QUERY_PATH: &str = "/fdsnws/dataselect/1/query";

/// Content type of a record stream
pub const MSEED_CONTENT_TYPE: &str = "application/vnd.fdsn.mseed";

/// Shared by every request handler
pub struct AppState {
    pub engine: Arc<MergeEngine>,
    pub request_timeout: Duration,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            QUERY_PATH,
            get(handlers::query_get).post(handlers::query_post),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
}
