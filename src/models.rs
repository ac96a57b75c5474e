use serde::{Deserialize, Serialize};

// Input category picked by the type classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Numeric,
    Alphanumeric,
    Chinese,
    MathExpression,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Numeric => "numeric",
            Category::Alphanumeric => "alphanumeric",
            Category::Chinese => "chinese",
            Category::MathExpression => "math_expression",
            Category::Unknown => "unknown",
        }
    }
}

// Slider target position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

// Cached recognition value: OCR text or slider offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    Text(String),
    Offset(Offset),
}

// Where a cache entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Computed,
    UserCorrected,
}

/// Result of a broker call plus whether it was served from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition<T> {
    pub value: T,
    pub from_cache: bool,
}

// OCR request: {"image": base64, "enhanced": bool}
#[derive(Deserialize, Debug, Default)]
pub struct OcrRequest {
    pub image: Option<String>,
    pub enhanced: Option<bool>,
}

// Slider request: bg_image + slide_image, or full_image alone
#[derive(Deserialize, Debug, Default)]
pub struct SlideRequest {
    pub bg_image: Option<String>,
    pub slide_image: Option<String>,
    pub full_image: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FeedbackRequest {
    pub image: Option<String>,
    pub correct_result: Option<String>,
}

// Success body: {"code": 0, "data": ..., "from_cache": bool}
#[derive(Serialize, Deserialize, Debug)]
pub struct DataResponse<T> {
    pub code: u8,
    pub data: T,
    pub from_cache: bool,
}

impl<T> DataResponse<T> {
    pub fn ok(data: T, from_cache: bool) -> Self {
        Self {
            code: 0,
            data,
            from_cache,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub code: u8,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerStatus {
    pub ocr_cache_size: usize,
    pub slider_cache_size: usize,
    pub memory_rss_bytes: Option<u64>,
    pub uptime_seconds: u64,
    pub max_concurrency: usize,
    pub available_permits: usize,
}
