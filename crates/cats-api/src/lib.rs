//! cats-api — HTTP surface for the aggregator and the path selector.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/sync` | Latest aggregated snapshot, `{success, data, msg}` |
//! | POST | `/select` | Best instance for `{service_id, max_accept_cost, max_accept_delay}` |
//! | GET | `/api/metrics/all` | Raw `service_id -> [instance]` map |
//! | GET | `/health` | Liveness of this process |
//!
//! `/select` answers 503 when the process runs without a selector
//! (aggregator-only mode). Every route allows any origin, and `OPTIONS`
//! preflights get a 204.

pub mod cors;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use cats_selector::NetSelector;
use cats_state::SnapshotStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: SnapshotStore,
    pub selector: Option<Arc<NetSelector>>,
}

/// Build the complete API router.
pub fn build_router(store: SnapshotStore, selector: Option<Arc<NetSelector>>) -> Router {
    let state = ApiState { store, selector };

    Router::new()
        .route("/sync", get(handlers::sync))
        .route("/select", post(handlers::select))
        .route("/api/metrics/all", get(handlers::all_metrics))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(middleware::from_fn(cors::cors))
}
