use axum::Json;
use axum::response::IntoResponse;

// legacy liveness route, the recognition clients probe it on startup
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "message": "captcha broker is running"
    }))
}

// health handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
