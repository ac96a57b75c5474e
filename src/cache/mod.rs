//! Content-addressed result cache.
//!
//! Two independently bounded partitions (OCR text, slider offsets) share one
//! TTL. Entries are keyed by the SHA-256 of the request's image bytes. Eviction
//! under capacity pressure is least-recently-accessed; TTL expiry is based on
//! creation time only. An optional [`DiskStore`] keeps a write-through copy so
//! results survive restarts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::models::{CacheValue, Origin};

pub mod disk;

pub use disk::{DiskStore, StoredEntry};

// Hex SHA-256 of the request inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    // Hash of all parts concatenated in the order given (bg ++ slide for sliders)
    pub fn digest(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        CacheKey(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: CacheValue,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub hit_count: u64,
    pub origin: Origin,
    // monotonic access order, wall clock is too coarse to rank touches
    access_seq: u64,
}

/// One capacity-bound slice of the cache.
pub struct CachePartition {
    name: &'static str,
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: chrono::Duration,
    max_entries: usize,
    access_clock: AtomicU64,
    // serializes evict-then-insert so the bound holds under concurrent puts
    insert_lock: Mutex<()>,
    disk: Option<Arc<DiskStore>>,
}

impl CachePartition {
    pub fn new(
        name: &'static str,
        ttl: Duration,
        max_entries: usize,
        disk: Option<Arc<DiskStore>>,
    ) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            max_entries: max_entries.max(1),
            access_clock: AtomicU64::new(0),
            insert_lock: Mutex::new(()),
            disk,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Looks up `key`, touching `last_access_at` and `hit_count` on a hit.
    /// Expired entries are dropped and reported as a miss. On a memory miss
    /// the disk copy, if any, is promoted back into memory.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Utc::now();
        let mut expired = false;

        if let Some(mut entry) = self.entries.get_mut(key) {
            if self.is_expired(entry.created_at, now) {
                expired = true;
            } else {
                entry.last_access_at = now;
                entry.hit_count += 1;
                entry.access_seq = self.next_seq();
                CACHE_HITS.with_label_values(&[self.name]).inc();
                return Some(entry.clone());
            }
        }

        // guard is released here, safe to touch the shard again
        if expired {
            self.entries.remove_if(key, |_, e| self.is_expired(e.created_at, now));
            self.record_size();
        } else if let Some(entry) = self.promote_from_disk(key, now) {
            CACHE_HITS.with_label_values(&[self.name]).inc();
            return Some(entry);
        }

        CACHE_MISSES.with_label_values(&[self.name]).inc();
        None
    }

    /// Inserts or unconditionally overwrites the entry for `key`.
    pub fn put(&self, key: CacheKey, value: CacheValue, origin: Origin) {
        self.write(self.new_entry(key, value, origin), false);
    }

    /// Stores a freshly computed result unless a live user correction already
    /// holds the key. Returns whether the value was stored.
    pub fn put_computed(&self, key: CacheKey, value: CacheValue) -> bool {
        self.write(self.new_entry(key, value, Origin::Computed), true)
    }

    fn new_entry(&self, key: CacheKey, value: CacheValue, origin: Origin) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key,
            value,
            created_at: now,
            last_access_at: now,
            hit_count: 0,
            origin,
            access_seq: self.next_seq(),
        }
    }

    fn write(&self, entry: CacheEntry, keep_corrections: bool) -> bool {
        let _guard = self.insert_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if keep_corrections && self.holds_correction(&entry.key, entry.created_at) {
            debug!(
                partition = self.name,
                key = %entry.key,
                "keeping user correction over computed result"
            );
            return false;
        }

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.store(self.name, &entry) {
                warn!(
                    partition = self.name,
                    error = %e,
                    "persisting cache entry failed, keeping it in memory only"
                );
            }
        }
        self.insert_locked(entry);
        true
    }

    fn holds_correction(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| {
                e.origin == Origin::UserCorrected && !self.is_expired(e.created_at, now)
            })
    }

    /// Removes every entry older than the TTL. Returns how many were dropped.
    pub fn expire_now(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry.created_at, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.record_size();
        removed
    }

    /// Evicts the `count` least-recently-accessed entries.
    pub fn evict_lru(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut order: Vec<(u64, CacheKey)> = self
            .entries
            .iter()
            .map(|entry| (entry.access_seq, entry.key().clone()))
            .collect();
        order.sort_unstable_by_key(|(seq, _)| *seq);

        let evicted = order
            .into_iter()
            .take(count)
            .filter(|(_, key)| self.entries.remove(key).is_some())
            .count();
        self.record_size();
        evicted
    }

    /// Drops the oldest-by-access `fraction` of entries, repeatedly, until the
    /// partition holds at most `mark` entries.
    pub fn trim_to(&self, mark: usize, fraction: f64) -> usize {
        let mut evicted = 0;
        while self.size() > mark {
            let batch = ((self.size() as f64) * fraction).ceil().max(1.0) as usize;
            let removed = self.evict_lru(batch);
            if removed == 0 {
                break;
            }
            evicted += removed;
        }
        evicted
    }

    // a write that raced the disk read wins over the promoted copy
    fn insert_if_absent(&self, entry: CacheEntry) -> CacheEntry {
        let _guard = self.insert_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = self.entries.get(&entry.key) {
            return current.clone();
        }
        self.insert_locked(entry.clone());
        entry
    }

    // caller holds `insert_lock`
    fn insert_locked(&self, entry: CacheEntry) {
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.max_entries {
            let excess = self.entries.len() + 1 - self.max_entries;
            let evicted = self.evict_lru(excess);
            debug!(partition = self.name, evicted, "cache full, evicted least recently used");
        }
        self.entries.insert(entry.key.clone(), entry);
        self.record_size();
    }

    fn promote_from_disk(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let disk = self.disk.as_ref()?;
        let stored = match disk.load(self.name, key) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(partition = self.name, error = %e, "reading persisted cache entry failed");
                return None;
            }
        };
        if self.is_expired(stored.created_at, now) {
            return None;
        }

        let entry = CacheEntry {
            key: key.clone(),
            value: stored.value,
            created_at: stored.created_at,
            last_access_at: now,
            hit_count: 1,
            origin: stored.origin,
            access_seq: self.next_seq(),
        };
        let entry = self.insert_if_absent(entry);
        debug!(partition = self.name, key = %key, "promoted persisted cache entry");
        Some(entry)
    }

    fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(created_at) > self.ttl
    }

    fn next_seq(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    fn record_size(&self) {
        CACHE_SIZE.with_label_values(&[self.name]).set(self.entries.len() as i64);
    }
}

/// The broker's cache: OCR text and slider offsets, bounded separately.
pub struct ResultCache {
    ocr: CachePartition,
    slider: CachePartition,
}

impl ResultCache {
    pub fn new(config: &CacheConfig, disk: Option<Arc<DiskStore>>) -> Self {
        Self {
            ocr: CachePartition::new("ocr", config.ttl, config.ocr_max_entries, disk.clone()),
            slider: CachePartition::new("slider", config.ttl, config.slider_max_entries, disk),
        }
    }

    pub fn ocr(&self) -> &CachePartition {
        &self.ocr
    }

    pub fn slider(&self) -> &CachePartition {
        &self.slider
    }

    pub fn partitions(&self) -> [&CachePartition; 2] {
        [&self.ocr, &self.slider]
    }

    // Partition responsible for this kind of value
    pub fn partition_for(&self, value: &CacheValue) -> &CachePartition {
        match value {
            CacheValue::Text(_) => &self.ocr,
            CacheValue::Offset(_) => &self.slider,
        }
    }
}
