use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use image::{GrayImage, ImageFormat, Luma};
use serde_json::{Value, json};
use tower::ServiceExt;

use captcha_broker::config::CacheConfig;
use captcha_broker::{
    AdmissionController, AppState, Broker, Classifier, ClassifierError, ClassifierSet, Offset,
    ResultCache, SlideMatcher, build_router,
};

struct Counting {
    reply: Result<String, ClassifierError>,
    calls: AtomicUsize,
}

impl Counting {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(ClassifierError::Backend("model crashed".to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn classify(&self, _image: &[u8]) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

// Offset derived from the input sizes so swapped inputs give a different answer
#[derive(Default)]
struct SizeMatcher {
    calls: AtomicUsize,
}

impl SlideMatcher for SizeMatcher {
    fn slide_match(&self, background: &[u8], slider: &[u8]) -> Result<Offset, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Offset {
            x: background.len() as i32,
            y: slider.len() as i32,
        })
    }
}

fn broker(models: ClassifierSet, slider: Arc<SizeMatcher>, capacity: usize) -> Broker {
    let cache = Arc::new(ResultCache::new(&CacheConfig::default(), None));
    let admission = Arc::new(AdmissionController::new(capacity, None));
    Broker::new(cache, admission, models, slider)
}

fn app(broker: Broker) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(broker));
    (build_router(Arc::clone(&state)), state)
}

fn rects_png(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> Vec<u8> {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    for &(rx, ry, rw, rh) in rects {
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                canvas.put_pixel(x, y, Luma([0]));
            }
        }
    }
    let mut buf = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

async fn post(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn repeated_ocr_request_is_served_from_cache() {
    let model = Counting::ok("abcd");
    let (app, _) = app(broker(ClassifierSet::new(model.clone()), Arc::default(), 4));
    let body = json!({ "image": STANDARD.encode(b"not really an image") }).to_string();

    let (status, first) = post(&app, "/ocr", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["code"], 0);
    assert_eq!(first["data"], "abcd");
    assert_eq!(first["from_cache"], false);
    // undecodable input is fused from two readings of the same model
    assert_eq!(model.calls(), 2);

    let (_, second) = post(&app, "/ocr", body).await;
    assert_eq!(second["data"], "abcd");
    assert_eq!(second["from_cache"], true);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn slider_cache_key_depends_on_input_order() {
    let matcher = Arc::new(SizeMatcher::default());
    let (app, _) = app(broker(ClassifierSet::new(Counting::ok("x")), matcher.clone(), 4));
    let bg = STANDARD.encode(b"background-bytes");
    let piece = STANDARD.encode(b"piece");

    let body = json!({ "bg_image": bg, "slide_image": piece }).to_string();
    let (_, first) = post(&app, "/slide", body.clone()).await;
    assert_eq!(first["code"], 0);
    assert_eq!(first["data"], json!({ "x": 16, "y": 5 }));
    assert_eq!(first["from_cache"], false);

    let (_, second) = post(&app, "/slide", body).await;
    assert_eq!(second["from_cache"], true);
    assert_eq!(matcher.calls.load(Ordering::SeqCst), 1);

    let swapped = json!({ "bg_image": piece, "slide_image": bg }).to_string();
    let (_, third) = post(&app, "/slide", swapped).await;
    assert_eq!(third["from_cache"], false);
    assert_eq!(third["data"], json!({ "x": 5, "y": 16 }));
    assert_eq!(matcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn full_image_mode_returns_default_offset_uncached() {
    let matcher = Arc::new(SizeMatcher::default());
    let (app, state) = app(broker(ClassifierSet::new(Counting::ok("x")), matcher.clone(), 4));
    let body = json!({ "full_image": STANDARD.encode(b"screenshot") }).to_string();

    for _ in 0..2 {
        let (_, reply) = post(&app, "/slide", body.clone()).await;
        assert_eq!(reply["code"], 0);
        assert_eq!(reply["data"], json!({ "x": 150, "y": 0 }));
        assert_eq!(reply["from_cache"], false);
    }
    assert_eq!(matcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.broker.cache().slider().size(), 0);
}

#[tokio::test]
async fn feedback_overrides_cached_answer() {
    let model = Counting::ok("abcd");
    let (app, _) = app(broker(ClassifierSet::new(model.clone()), Arc::default(), 4));
    let image = STANDARD.encode(b"captcha with a wrong answer");

    let (_, first) = post(&app, "/ocr", json!({ "image": image }).to_string()).await;
    assert_eq!(first["data"], "abcd");

    let correction = json!({ "image": image, "correct_result": "7x9k" }).to_string();
    let (_, ack) = post(&app, "/feedback", correction).await;
    assert_eq!(ack["code"], 0);

    let (_, corrected) = post(&app, "/ocr", json!({ "image": image }).to_string()).await;
    assert_eq!(corrected["data"], "7x9k");
    assert_eq!(corrected["from_cache"], true);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn feedback_for_unseen_image_is_served_without_classifying() {
    let model = Counting::ok("abcd");
    let (app, _) = app(broker(ClassifierSet::new(model.clone()), Arc::default(), 4));
    let image = STANDARD.encode(b"never seen before");

    post(&app, "/feedback", json!({ "image": image, "correct_result": "q2w3" }).to_string()).await;
    let (_, reply) = post(&app, "/ocr", json!({ "image": image }).to_string()).await;

    assert_eq!(reply["data"], "q2w3");
    assert_eq!(reply["from_cache"], true);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn malformed_requests_get_code_one() {
    let model = Counting::ok("abcd");
    let matcher = Arc::new(SizeMatcher::default());
    let (app, _) = app(broker(ClassifierSet::new(model.clone()), matcher.clone(), 4));

    let cases = [
        ("/ocr", json!({}).to_string()),
        ("/ocr", json!({ "image": "%%% not base64 %%%" }).to_string()),
        ("/ocr", "{ this is not json".to_string()),
        ("/slide", json!({ "bg_image": STANDARD.encode(b"bg") }).to_string()),
        ("/feedback", json!({ "image": STANDARD.encode(b"img") }).to_string()),
    ];

    for (uri, body) in cases {
        let (status, reply) = post(&app, uri, body).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(reply["code"], 1, "{}", uri);
        assert!(reply["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
    assert_eq!(model.calls(), 0);
    assert_eq!(matcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn classifier_failure_gets_code_two_and_releases_permits() {
    let model = Counting::failing();
    let (app, state) = app(broker(ClassifierSet::new(model.clone()), Arc::default(), 3));
    let body = json!({ "image": STANDARD.encode(b"broken") }).to_string();

    let (status, reply) = post(&app, "/ocr", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["code"], 2);
    assert_eq!(state.broker.admission().available(), 3);

    // failures are not cached
    post(&app, "/ocr", body).await;
    assert_eq!(model.calls(), 4);
    assert_eq!(state.broker.cache().ocr().size(), 0);
}

#[tokio::test]
async fn status_reports_cache_sizes_and_permits() {
    let (app, _) = app(broker(ClassifierSet::new(Counting::ok("abcd")), Arc::default(), 5));
    post(&app, "/ocr", json!({ "image": STANDARD.encode(b"one") }).to_string()).await;
    post(&app, "/ocr", json!({ "image": STANDARD.encode(b"two") }).to_string()).await;

    let (status, reply) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["code"], 0);
    assert_eq!(reply["data"]["ocr_cache_size"], 2);
    assert_eq!(reply["data"]["slider_cache_size"], 0);
    assert_eq!(reply["data"]["max_concurrency"], 5);
    assert_eq!(reply["data"]["available_permits"], 5);
}

#[tokio::test]
async fn liveness_routes_respond() {
    let (app, _) = app(broker(ClassifierSet::new(Counting::ok("x")), Arc::default(), 1));

    let (_, root) = get(&app, "/").await;
    assert_eq!(root["status"], "running");

    let (_, health) = get(&app, "/health").await;
    assert_eq!(health["status"], "healthy");
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn numeric_captcha_uses_default_model_only() {
    let default = Counting::ok("12a34");
    let difficult = Counting::ok("9999");
    let models = ClassifierSet::new(default.clone()).with_difficult(difficult.clone());
    let broker = broker(models, Arc::default(), 2);
    let glyphs = [(10, 14, 3, 12), (40, 14, 3, 12), (70, 14, 3, 12), (100, 14, 3, 12)];
    let png = rects_png(120, 40, &glyphs);

    let recognition = broker.recognize(png, false).await.unwrap();

    assert_eq!(recognition.value, "1234");
    assert!(!recognition.from_cache);
    assert_eq!(default.calls(), 1);
    assert_eq!(difficult.calls(), 0);
}

#[tokio::test]
async fn math_captcha_is_answered_with_the_result() {
    let models = ClassifierSet::new(Counting::ok("3 × 4 = ?"));
    let broker = broker(models, Arc::default(), 2);

    let recognition = broker.recognize(rects_png(200, 40, &[]), true).await.unwrap();

    assert_eq!(recognition.value, "12");
}
