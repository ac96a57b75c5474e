use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::warn;

use super::decode_image;
use crate::error::{BrokerError, Result};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{DataResponse, Offset, SlideRequest};
use crate::state::AppState;

// Either the background/piece pair or a single full screenshot
pub async fn slide_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SlideRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Offset>>> {
    REQUEST_TOTAL.with_label_values(&["slide"]).inc();

    let Json(payload) = payload.map_err(|e| BrokerError::Input(e.body_text()))?;
    let start_time = Instant::now();

    let result = match (&payload.bg_image, &payload.slide_image, &payload.full_image) {
        (Some(bg), Some(slide), _) => {
            let background = decode_image("bg_image", Some(bg.as_str()))?;
            let slider = decode_image("slide_image", Some(slide.as_str()))?;
            state.broker.solve_slider(background, slider).await
        }
        (_, _, Some(full)) => {
            let screenshot = decode_image("full_image", Some(full.as_str()))?;
            state.broker.locate_full_image(screenshot).await
        }
        _ => return Err(BrokerError::Input("missing required parameters".to_string())),
    };
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let recognition = result.inspect_err(|e| warn!(error = %e, "slide request failed"))?;
    Ok(Json(DataResponse::ok(recognition.value, recognition.from_cache)))
}
