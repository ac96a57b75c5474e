//! Recognition-request broker for text and slider captchas.
//!
//! Sits in front of an expensive classification engine: identical inputs are
//! served from a content-addressed cache, concurrent engine load is bounded by
//! an admission controller, and ambiguous readings are fused from several
//! model variants.

pub mod admission;
pub mod broker;
pub mod cache;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod expr;
pub mod feedback;
pub mod fusion;
pub mod handlers;
pub mod janitor;
pub mod load_balancer;
pub mod metrics;
pub mod models;
pub mod postprocess;
pub mod preprocess;
pub mod recognize;
pub mod remote;
pub mod state;

pub use admission::AdmissionController;
pub use broker::Broker;
pub use cache::{CacheKey, ResultCache};
pub use classifier::{Classifier, ClassifierSet, FullImageLocator, SlideMatcher};
pub use error::{BrokerError, ClassifierError};
pub use handlers::build_router;
pub use janitor::CacheJanitor;
pub use models::{CacheValue, Category, Offset, Origin, Recognition};
pub use state::AppState;
