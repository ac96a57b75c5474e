use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::MessageResponse;

// Pixel-level failures. Callers in detect/preprocess fail open on these.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("image is empty ({0}x{1})")]
    Empty(u32, u32),
}

// Anything that goes wrong while calling into a classifier model.
#[derive(Error, Debug, Clone)]
pub enum ClassifierError {
    #[error("classifier backend error: {0}")]
    Backend(String),

    #[error("no healthy classifier backend available")]
    Unavailable,

    #[error("classifier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier worker failed: {0}")]
    Worker(String),

    #[error("admission controller is closed")]
    Closed,
}

// Persistent cache store failures; always logged, never surfaced.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one backend required for {0}")]
    NoBackends(&'static str),
}

/// Request-level error, mapped onto the legacy `{code, message}` protocol.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Missing or malformed request fields. Code 1, nothing computed.
    #[error("{0}")]
    Input(String),

    /// The classifier failed. Code 2, not retried.
    #[error("recognition failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn code(&self) -> u8 {
        match self {
            BrokerError::Input(_) => 1,
            BrokerError::Classifier(_) | BrokerError::Internal(_) => 2,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        // legacy clients read `code`, so the HTTP status stays 200
        Json(MessageResponse {
            code: self.code(),
            message: self.to_string(),
        })
        .into_response()
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
