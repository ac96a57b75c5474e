use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::warn;

use super::decode_image;
use crate::error::{BrokerError, Result};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{DataResponse, OcrRequest};
use crate::state::AppState;

pub async fn ocr_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<OcrRequest>, JsonRejection>,
) -> Result<Json<DataResponse<String>>> {
    REQUEST_TOTAL.with_label_values(&["ocr"]).inc();

    let Json(payload) = payload.map_err(|e| BrokerError::Input(e.body_text()))?;
    let image = decode_image("image", payload.image.as_deref())?;

    let start_time = Instant::now();
    let result = state.broker.recognize(image, payload.enhanced.unwrap_or(true)).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let recognition = result.inspect_err(|e| warn!(error = %e, "ocr request failed"))?;
    Ok(Json(DataResponse::ok(recognition.value, recognition.from_cache)))
}
