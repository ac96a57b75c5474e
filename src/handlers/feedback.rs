use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use super::decode_image;
use crate::error::{BrokerError, Result};
use crate::metrics::REQUEST_TOTAL;
use crate::models::{FeedbackRequest, MessageResponse};
use crate::state::AppState;

pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    REQUEST_TOTAL.with_label_values(&["feedback"]).inc();

    let Json(payload) = payload.map_err(|e| BrokerError::Input(e.body_text()))?;
    let image = decode_image("image", payload.image.as_deref())?;
    let answer = payload
        .correct_result
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BrokerError::Input("missing correct_result parameter".to_string()))?;

    let key = state.broker.correct(&image, answer);
    Ok(Json(MessageResponse {
        code: 0,
        message: format!("correction recorded for {}", key),
    }))
}
