//! Seams to the recognition engine. Implementations are blocking and are
//! always invoked on the blocking pool through the admission controller.

use std::sync::Arc;

use crate::error::ClassifierError;
use crate::models::Offset;

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, image: &[u8]) -> Result<String, ClassifierError>;
}

pub trait SlideMatcher: Send + Sync {
    // Target position of `slider` inside `background`
    fn slide_match(&self, background: &[u8], slider: &[u8]) -> Result<Offset, ClassifierError>;
}

/// Optional heuristic for single-screenshot slider captchas.
pub trait FullImageLocator: Send + Sync {
    fn locate(&self, screenshot: &[u8]) -> Result<Offset, ClassifierError>;
}

/// The model variants the router can dispatch to.
#[derive(Clone)]
pub struct ClassifierSet {
    pub default: Arc<dyn Classifier>,
    // specialized model, may be absent
    pub alphanumeric: Option<Arc<dyn Classifier>>,
    pub difficult: Arc<dyn Classifier>,
}

impl ClassifierSet {
    // Every variant falls back to `default` until configured
    pub fn new(default: Arc<dyn Classifier>) -> Self {
        Self {
            difficult: Arc::clone(&default),
            alphanumeric: None,
            default,
        }
    }

    pub fn with_alphanumeric(mut self, model: Arc<dyn Classifier>) -> Self {
        self.alphanumeric = Some(model);
        self
    }

    pub fn with_difficult(mut self, model: Arc<dyn Classifier>) -> Self {
        self.difficult = model;
        self
    }

    pub fn alphanumeric_or_default(&self) -> &Arc<dyn Classifier> {
        self.alphanumeric.as_ref().unwrap_or(&self.default)
    }
}
