//! Per-category recognition strategies.
//!
//! | Category | Strategy |
//! |----------|----------|
//! | `Numeric` | default model, digits only |
//! | `Alphanumeric` | specialized (or default) + difficult, fused, segmentation fallback |
//! | `Chinese` | default model |
//! | `MathExpression` | default model, then evaluate the expression |
//! | `Unknown` | default + difficult in parallel, fused |
//!
//! Every model call goes through [`AdmissionController::run`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::admission::AdmissionController;
use crate::classifier::{Classifier, ClassifierSet};
use crate::codec;
use crate::error::ClassifierError;
use crate::expr;
use crate::fusion;
use crate::models::Category;

const SEGMENT_BINARY_LEVEL: u8 = 150;
const SEGMENT_MIN_WIDTH_SHARE: f64 = 0.05;
const SEGMENT_MIN_HEIGHT_SHARE: f64 = 0.3;
const SEGMENT_COUNT: std::ops::RangeInclusive<usize> = 3..=8;
const SEGMENT_MARGIN: u32 = 2;

pub struct RecognitionRouter {
    models: ClassifierSet,
    admission: Arc<AdmissionController>,
}

impl RecognitionRouter {
    pub fn new(models: ClassifierSet, admission: Arc<AdmissionController>) -> Self {
        Self { models, admission }
    }

    pub async fn recognize(
        &self,
        image: Arc<[u8]>,
        category: Category,
    ) -> Result<String, ClassifierError> {
        match category {
            Category::Numeric => {
                let text = self.invoke(&self.models.default, image).await?;
                Ok(text.chars().filter(char::is_ascii_digit).collect())
            }
            Category::Alphanumeric => self.recognize_alphanumeric(image).await,
            Category::Chinese => self.invoke(&self.models.default, image).await,
            Category::MathExpression => {
                let raw = self.invoke(&self.models.default, image).await?;
                match expr::solve(&raw) {
                    Some(answer) => Ok(answer),
                    None => {
                        debug!(raw = %raw, "not an evaluable expression, keeping raw text");
                        Ok(raw)
                    }
                }
            }
            Category::Unknown => {
                self.fused(&self.models.default, &self.models.difficult, image).await
            }
        }
    }

    async fn recognize_alphanumeric(&self, image: Arc<[u8]>) -> Result<String, ClassifierError> {
        let primary = self.models.alphanumeric_or_default();
        let fused = self.fused(primary, &self.models.difficult, Arc::clone(&image)).await?;

        let suspicious = fused.chars().count() > 2 && fused.chars().any(|c| !c.is_alphanumeric());
        if !suspicious {
            return Ok(fused);
        }

        match self.segmented(primary, image).await {
            Some(segmented) => {
                debug!(fused = %fused, segmented = %segmented, "using per-character reading");
                Ok(segmented)
            }
            None => Ok(fused),
        }
    }

    // Two models in parallel; a single failure leaves the other candidate
    async fn fused(
        &self,
        first: &Arc<dyn Classifier>,
        second: &Arc<dyn Classifier>,
        image: Arc<[u8]>,
    ) -> Result<String, ClassifierError> {
        let (a, b) = tokio::join!(
            self.invoke(first, Arc::clone(&image)),
            self.invoke(second, image)
        );
        match (a, b) {
            (Ok(a), Ok(b)) => Ok(fusion::choose(&a, &b).to_string()),
            (Ok(text), Err(e)) | (Err(e), Ok(text)) => {
                warn!(error = %e, "one fusion candidate failed, using the other");
                Ok(text)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn segmented(&self, model: &Arc<dyn Classifier>, image: Arc<[u8]>) -> Option<String> {
        let segments = tokio::task::spawn_blocking(move || segment_characters(&image))
            .await
            .ok()??;

        let mut text = String::new();
        for segment in segments {
            match self.invoke(model, Arc::from(segment)).await {
                Ok(reading) => {
                    let reading = reading.trim();
                    if reading.chars().count() == 1 {
                        text.push_str(reading);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "segment recognition failed, abandoning fallback");
                    return None;
                }
            }
        }

        let adoptable = SEGMENT_COUNT.contains(&text.chars().count())
            && text.chars().all(char::is_alphanumeric);
        adoptable.then_some(text)
    }

    async fn invoke(
        &self,
        model: &Arc<dyn Classifier>,
        image: Arc<[u8]>,
    ) -> Result<String, ClassifierError> {
        let model = Arc::clone(model);
        self.admission.run(move || model.classify(&image)).await
    }
}

/// Character-sized regions, left to right, each encoded as its own PNG.
/// `None` when the image does not decode or the region count is implausible.
fn segment_characters(image: &[u8]) -> Option<Vec<Vec<u8>>> {
    let gray = codec::decode_gray(image).ok()?;
    let (width, height) = gray.dimensions();
    let binary = codec::threshold(&gray, SEGMENT_BINARY_LEVEL, true);

    let mut blobs: Vec<_> = codec::external_contours(&binary)
        .into_iter()
        .filter(|b| {
            b.width as f64 >= width as f64 * SEGMENT_MIN_WIDTH_SHARE
                && b.height as f64 >= height as f64 * SEGMENT_MIN_HEIGHT_SHARE
        })
        .collect();
    if !SEGMENT_COUNT.contains(&blobs.len()) {
        return None;
    }

    blobs.sort_by_key(|b| b.x);
    blobs
        .iter()
        .map(|b| codec::encode_png(&codec::crop(&gray, b, SEGMENT_MARGIN)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_images::rects_png;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(text: &'static str) -> Arc<Self> {
            Arc::new(Self { text, calls: AtomicUsize::new(0) })
        }
    }

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn classify(&self, _image: &[u8]) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn classify(&self, _image: &[u8]) -> Result<String, ClassifierError> {
            Err(ClassifierError::Backend("model not loaded".into()))
        }
    }

    // Reads whole images as `whole`, and crops (narrow images) one letter at a time
    struct Segmenting {
        whole: &'static str,
        letters: Mutex<Vec<&'static str>>,
    }

    impl Classifier for Segmenting {
        fn name(&self) -> &str {
            "segmenting"
        }

        fn classify(&self, image: &[u8]) -> Result<String, ClassifierError> {
            let width = codec::decode_gray(image).map(|g| g.width()).unwrap_or(0);
            if width > 40 {
                return Ok(self.whole.to_string());
            }
            let mut letters = self.letters.lock().unwrap();
            Ok(if letters.is_empty() { String::new() } else { letters.remove(0).to_string() })
        }
    }

    fn router(models: ClassifierSet) -> RecognitionRouter {
        RecognitionRouter::new(models, Arc::new(AdmissionController::new(4, None)))
    }

    fn image(bytes: &[u8]) -> Arc<[u8]> {
        Arc::from(bytes)
    }

    fn four_glyphs() -> Vec<u8> {
        rects_png(120, 40, &[(10, 10, 8, 20), (35, 10, 8, 20), (60, 10, 8, 20), (85, 10, 8, 20)])
    }

    #[tokio::test]
    async fn numeric_uses_one_call_and_keeps_digits() {
        let default = Fixed::new("12a34");
        let difficult = Fixed::new("9999");
        let router = router(ClassifierSet::new(default.clone()).with_difficult(difficult.clone()));

        let text = router.recognize(image(b"x"), Category::Numeric).await.unwrap();
        assert_eq!(text, "1234");
        assert_eq!(default.calls.load(Ordering::SeqCst), 1);
        assert_eq!(difficult.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn math_expressions_are_evaluated() {
        let router = router(ClassifierSet::new(Fixed::new("3×4=?")));
        assert_eq!(router.recognize(image(b"x"), Category::MathExpression).await.unwrap(), "12");
    }

    #[tokio::test]
    async fn unevaluable_math_keeps_raw_text() {
        let router = router(ClassifierSet::new(Fixed::new("3+?a")));
        assert_eq!(router.recognize(image(b"x"), Category::MathExpression).await.unwrap(), "3+?a");
    }

    #[tokio::test]
    async fn unknown_fuses_default_and_difficult() {
        let models = ClassifierSet::new(Fixed::new("AB#2")).with_difficult(Fixed::new("AB12"));
        let router = router(models);
        assert_eq!(router.recognize(image(b"x"), Category::Unknown).await.unwrap(), "AB12");
    }

    #[tokio::test]
    async fn alphanumeric_prefers_specialized_model() {
        let default = Fixed::new("zzzz");
        let special = Fixed::new("k7m2");
        let router = router(
            ClassifierSet::new(default.clone())
                .with_alphanumeric(special.clone())
                .with_difficult(Fixed::new("ABCDEFGHIJ")),
        );

        assert_eq!(router.recognize(image(b"x"), Category::Alphanumeric).await.unwrap(), "k7m2");
        assert_eq!(default.calls.load(Ordering::SeqCst), 0);
        assert_eq!(special.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failed_candidate_is_tolerated() {
        let models = ClassifierSet::new(Fixed::new("ab12")).with_difficult(Arc::new(Failing));
        let router = router(models);
        assert_eq!(router.recognize(image(b"x"), Category::Unknown).await.unwrap(), "ab12");
    }

    #[tokio::test]
    async fn classifier_failure_surfaces() {
        let router = router(ClassifierSet::new(Arc::new(Failing)));
        let err = router.recognize(image(b"x"), Category::Chinese).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Backend(_)));
    }

    #[tokio::test]
    async fn suspicious_reading_falls_back_to_segments() {
        let model = Arc::new(Segmenting {
            whole: "A#BC",
            letters: Mutex::new(vec!["W", "X", "Y", "Z"]),
        });
        let router = router(ClassifierSet::new(model));

        let image = Arc::from(four_glyphs());
        let text = router.recognize(image, Category::Alphanumeric).await.unwrap();
        assert_eq!(text, "WXYZ");
    }

    #[tokio::test]
    async fn segment_result_is_rejected_when_too_short() {
        let model = Arc::new(Segmenting {
            whole: "A#BC",
            letters: Mutex::new(vec!["W", "", "", "Z"]),
        });
        let router = router(ClassifierSet::new(model));

        let image = Arc::from(four_glyphs());
        let text = router.recognize(image, Category::Alphanumeric).await.unwrap();
        assert_eq!(text, "A#BC");
    }

    #[test]
    fn segmentation_needs_three_to_eight_regions() {
        assert_eq!(segment_characters(&four_glyphs()).map(|s| s.len()), Some(4));
        let two = rects_png(120, 40, &[(10, 10, 8, 20), (35, 10, 8, 20)]);
        assert!(segment_characters(&two).is_none());
        // too thin to count as characters
        let thin = rects_png(120, 40, &[(10, 10, 2, 20), (35, 10, 2, 20), (60, 10, 2, 20)]);
        assert!(segment_characters(&thin).is_none());
        assert!(segment_characters(b"garbage").is_none());
    }
}
