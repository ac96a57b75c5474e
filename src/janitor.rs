//! Periodic cache maintenance.
//!
//! Two supervised loops share the cache with request traffic: the memory
//! sweep (TTL expiry, then high-water eviction) and, when persistence is
//! enabled, the disk sweep (retention and file cap). Both stop when the
//! shutdown token is cancelled. A failing sweep is logged and the loop keeps
//! its schedule.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{CachePartition, DiskStore, ResultCache};
use crate::config::JanitorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub partition: &'static str,
    pub expired: usize,
    pub evicted: usize,
    pub remaining: usize,
}

pub struct CacheJanitor {
    cache: Arc<ResultCache>,
    config: JanitorConfig,
}

impl CacheJanitor {
    pub fn new(cache: Arc<ResultCache>, config: JanitorConfig) -> Self {
        Self { cache, config }
    }

    pub fn sweep(&self) -> Vec<SweepReport> {
        self.cache
            .partitions()
            .into_iter()
            .map(|partition| self.sweep_partition(partition))
            .collect()
    }

    fn sweep_partition(&self, partition: &CachePartition) -> SweepReport {
        let expired = partition.expire_now();
        let mark = (partition.max_entries() as f64 * self.config.high_water).floor() as usize;
        let evicted = partition.trim_to(mark, self.config.evict_fraction);
        SweepReport {
            partition: partition.name(),
            expired,
            evicted,
            remaining: partition.size(),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval.max(Duration::from_millis(1)));
        // the first tick completes immediately
        ticker.tick().await;
        info!(interval = ?self.config.interval, "cache janitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cache janitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match panic::catch_unwind(AssertUnwindSafe(|| self.sweep())) {
                        Ok(reports) => {
                            for r in reports {
                                info!(
                                    partition = r.partition,
                                    expired = r.expired,
                                    evicted = r.evicted,
                                    size = r.remaining,
                                    "cache swept"
                                );
                            }
                        }
                        Err(_) => error!("cache sweep panicked, retrying on next tick"),
                    }
                }
            }
        }
    }
}

pub async fn run_disk_janitor(disk: Arc<DiskStore>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    info!(interval = ?every, dir = %disk.dir().display(), "disk cache janitor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("disk cache janitor stopped");
                break;
            }
            _ = ticker.tick() => {
                let store = Arc::clone(&disk);
                match tokio::task::spawn_blocking(move || store.sweep(SystemTime::now())).await {
                    Ok(Ok(r)) => info!(
                        expired = r.expired,
                        pruned = r.pruned,
                        files = r.remaining,
                        "disk cache swept"
                    ),
                    Ok(Err(e)) => error!(error = %e, "disk cache sweep failed"),
                    Err(e) => error!(error = %e, "disk cache sweep panicked"),
                }
            }
        }
    }
}
