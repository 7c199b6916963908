use axum::Json;
use serde_json::{json, Value};

/// GET /monitor — liveness probe, returns server metadata.
pub async fn monitor_handler() -> Json<Value> {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
