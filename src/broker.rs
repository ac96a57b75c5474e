//! Request pipeline.
//!
//! digest → cache lookup → (miss) detect + enhance on the blocking pool →
//! admitted classifier calls → fusion → normalize → cache put.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::admission::AdmissionController;
use crate::cache::{CacheKey, ResultCache};
use crate::classifier::{ClassifierSet, FullImageLocator, SlideMatcher};
use crate::detect::detect;
use crate::error::{BrokerError, Result};
use crate::feedback::FeedbackStore;
use crate::models::{BrokerStatus, CacheValue, Offset, Recognition};
use crate::postprocess::normalize;
use crate::preprocess::enhance;
use crate::recognize::RecognitionRouter;

// Answer for full-screenshot slider requests when no locator is configured
pub const DEFAULT_FULL_IMAGE_OFFSET: Offset = Offset { x: 150, y: 0 };

pub struct Broker {
    cache: Arc<ResultCache>,
    admission: Arc<AdmissionController>,
    router: RecognitionRouter,
    slider: Arc<dyn SlideMatcher>,
    full_image: Option<Arc<dyn FullImageLocator>>,
    feedback: FeedbackStore,
    started_at: Instant,
}

impl Broker {
    pub fn new(
        cache: Arc<ResultCache>,
        admission: Arc<AdmissionController>,
        models: ClassifierSet,
        slider: Arc<dyn SlideMatcher>,
    ) -> Self {
        Self {
            router: RecognitionRouter::new(models, Arc::clone(&admission)),
            feedback: FeedbackStore::new(Arc::clone(&cache)),
            cache,
            admission,
            slider,
            full_image: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_full_image_locator(mut self, locator: Arc<dyn FullImageLocator>) -> Self {
        self.full_image = Some(locator);
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Recognizes a text captcha. `enhanced` turns category-specific
    /// preprocessing on.
    pub async fn recognize(&self, image: Vec<u8>, enhanced: bool) -> Result<Recognition<String>> {
        let key = CacheKey::digest(&[image.as_slice()]);

        if let Some(CacheValue::Text(text)) = self.cache.ocr().get(&key).map(|e| e.value) {
            debug!(key = %key, "ocr cache hit");
            return Ok(Recognition { value: text, from_cache: true });
        }

        let image: Arc<[u8]> = Arc::from(image);
        let (category, prepared) = tokio::task::spawn_blocking(move || {
            let category = detect(&image);
            let prepared: Arc<[u8]> = if enhanced {
                Arc::from(enhance(&image, category))
            } else {
                image
            };
            (category, prepared)
        })
        .await
        .map_err(|e| BrokerError::Internal(format!("preprocessing worker failed: {}", e)))?;

        debug!(key = %key, category = category.as_str(), enhanced, "ocr cache miss");

        let raw = self.router.recognize(prepared, category).await?;
        let text = normalize(&raw, category);
        // a correction recorded while we were computing wins
        if !self.cache.ocr().put_computed(key, CacheValue::Text(text.clone())) {
            debug!("correction arrived during recognition, computed text not cached");
        }

        Ok(Recognition { value: text, from_cache: false })
    }

    /// Locates the slider piece inside the background. The cache key covers
    /// both images in request order.
    pub async fn solve_slider(
        &self,
        background: Vec<u8>,
        slider: Vec<u8>,
    ) -> Result<Recognition<Offset>> {
        let key = CacheKey::digest(&[background.as_slice(), slider.as_slice()]);

        if let Some(CacheValue::Offset(offset)) = self.cache.slider().get(&key).map(|e| e.value) {
            debug!(key = %key, "slider cache hit");
            return Ok(Recognition { value: offset, from_cache: true });
        }

        let matcher = Arc::clone(&self.slider);
        let offset = self
            .admission
            .run(move || matcher.slide_match(&background, &slider))
            .await?;
        self.cache.slider().put_computed(key, CacheValue::Offset(offset));

        Ok(Recognition { value: offset, from_cache: false })
    }

    // Single-screenshot mode, never cached
    pub async fn locate_full_image(&self, screenshot: Vec<u8>) -> Result<Recognition<Offset>> {
        let offset = match &self.full_image {
            Some(locator) => {
                let locator = Arc::clone(locator);
                self.admission.run(move || locator.locate(&screenshot)).await?
            }
            None => {
                debug!("no full-image locator configured, returning default offset");
                DEFAULT_FULL_IMAGE_OFFSET
            }
        };
        Ok(Recognition { value: offset, from_cache: false })
    }

    /// Records the correct answer for `image`, overriding any cached result.
    pub fn correct(&self, image: &[u8], answer: String) -> CacheKey {
        let key = CacheKey::digest(&[image]);
        self.feedback.correct(key.clone(), CacheValue::Text(answer));
        key
    }

    pub fn status(&self) -> BrokerStatus {
        BrokerStatus {
            ocr_cache_size: self.cache.ocr().size(),
            slider_cache_size: self.cache.slider().size(),
            memory_rss_bytes: resident_memory(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            max_concurrency: self.admission.capacity(),
            available_permits: self.admission.available(),
        }
    }
}

// Resident set size from /proc (VmRSS is reported in kB), None elsewhere
fn resident_memory() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
