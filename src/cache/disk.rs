// Write-through on-disk copy of the cache, one JSON file per entry
// named `{partition}_{digest}.json`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheEntry, CacheKey};
use crate::config::DiskConfig;
use crate::error::StoreError;
use crate::models::{CacheValue, Origin};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: CacheValue,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskSweep {
    pub expired: usize,
    pub pruned: usize,
    pub remaining: usize,
}

pub struct DiskStore {
    dir: PathBuf,
    retention: Duration,
    max_files: usize,
}

impl DiskStore {
    pub fn open(config: DiskConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir,
            retention: config.retention,
            max_files: config.max_files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self, partition: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let stored = StoredEntry {
            value: entry.value.clone(),
            origin: entry.origin,
            created_at: entry.created_at,
        };
        let path = self.path(partition, &entry.key);
        // write aside then rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&stored)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load(&self, partition: &str, key: &CacheKey) -> Result<Option<StoredEntry>, StoreError> {
        match fs::read(self.path(partition, key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes files older than the retention window, then prunes the oldest
    /// files until at most `max_files` remain.
    pub fn sweep(&self, now: SystemTime) -> Result<DiskSweep, StoreError> {
        let mut report = DiskSweep::default();
        let mut kept = Vec::new();

        for (path, modified) in self.entry_files()? {
            let age = now.duration_since(modified).unwrap_or_default();
            if age > self.retention {
                if remove_quietly(&path) {
                    report.expired += 1;
                }
            } else {
                kept.push((path, modified));
            }
        }

        if kept.len() > self.max_files {
            kept.sort_by_key(|(_, modified)| *modified);
            let excess = kept.len() - self.max_files;
            for (path, _) in kept.drain(..excess) {
                if remove_quietly(&path) {
                    report.pruned += 1;
                }
            }
        }

        report.remaining = kept.len();
        debug!(?report, dir = %self.dir.display(), "disk cache swept");
        Ok(report)
    }

    fn path(&self, partition: &str, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}_{}.json", partition, key))
    }

    fn entry_files(&self) -> Result<Vec<(PathBuf, SystemTime)>, StoreError> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let metadata = dir_entry.metadata()?;
            if metadata.is_file() {
                files.push((path, metadata.modified()?));
            }
        }
        Ok(files)
    }
}

fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove cache file");
            false
        }
    }
}
