use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheKey, ResultCache};
use crate::models::{CacheValue, Origin};

// Authoritative corrections. A correction replaces whatever is cached for the
// key and lives until the next correction or normal TTL expiry.
pub struct FeedbackStore {
    cache: Arc<ResultCache>,
}

impl FeedbackStore {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }

    pub fn correct(&self, key: CacheKey, value: CacheValue) {
        let partition = self.cache.partition_for(&value);
        info!(partition = partition.name(), key = %key, "recording user correction");
        partition.put(key, value, Origin::UserCorrected);
    }
}
