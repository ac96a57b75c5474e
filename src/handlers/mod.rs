mod feedback;
mod health;
mod metrics;
mod ocr;
mod slide;
mod status;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{BrokerError, Result};
use crate::state::AppState;

pub use feedback::feedback_handler;
pub use health::{health_handler, root_handler};
pub use metrics::metrics_handler;
pub use ocr::ocr_handler;
pub use slide::slide_handler;
pub use status::status_handler;

// Captcha screenshots are small, but base64 inflates them
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ocr", post(ocr_handler))
        .route("/slide", post(slide_handler))
        .route("/feedback", post(feedback_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Decode a base64 image field, tolerating a `data:image/...;base64,` prefix
pub(crate) fn decode_image(field: &str, value: Option<&str>) -> Result<Vec<u8>> {
    let encoded = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BrokerError::Input(format!("missing {} parameter", field)))?;

    let payload = match encoded.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| BrokerError::Input(format!("invalid base64 in {}: {}", field, e)))?;
    if bytes.is_empty() {
        return Err(BrokerError::Input(format!("{} is empty", field)));
    }
    Ok(bytes)
}
