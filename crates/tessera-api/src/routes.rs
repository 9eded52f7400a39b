//! Route table for the read API and intake endpoint.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/intents", post(handlers::submit::submit))
        .route("/inventory", get(handlers::inventory::inventory))
        .route("/balance", get(handlers::balance::balance))
        .route("/batch/:id", get(handlers::batch::batch))
        .route("/proof", get(handlers::proof::proof))
        .route("/pending", get(handlers::pending::pending))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
