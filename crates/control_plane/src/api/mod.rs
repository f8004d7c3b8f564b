//! HTTP API: routing and shared application state.

pub mod admin_routes;
pub mod host_routes;
pub mod middleware;

use crate::actions::ServerActions;
use crate::profiles::ProfileService;
use crate::queue::WorkQueue;
use crate::registration::HostAuthService;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<WorkQueue>,
    pub auth: Arc<HostAuthService>,
    pub profiles: Arc<ProfileService>,
    pub actions: Arc<ServerActions>,
    pub operator_key: Arc<str>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/admin", admin_routes::routes())
        .nest("/api/host", host_routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "weaver-control-plane"
    }))
}
