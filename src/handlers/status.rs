use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::metrics::REQUEST_TOTAL;
use crate::state::AppState;

// Informational only: cache sizes, memory, uptime, permits
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    REQUEST_TOTAL.with_label_values(&["status"]).inc();
    Json(serde_json::json!({
        "code": 0,
        "data": state.broker.status(),
    }))
}
