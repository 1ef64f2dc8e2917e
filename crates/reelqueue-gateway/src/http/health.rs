use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tenants = state.store.list_tenants().map(|t| t.len()).ok();
    Json(json!({
        "status": if tenants.is_some() { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("REELQUEUE_GIT_SHA"),
        "tenants": tenants,
        "clock": state.time.last_reading(),
    }))
}
