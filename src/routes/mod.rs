pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::common::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
