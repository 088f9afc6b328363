use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "file-server",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage.name(),
    }))
}
