use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::server::AppState;

/// Liveness probe: returns 200 OK if the server process is running.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "instances": state.registry.list_instances().len(),
    }))
}
