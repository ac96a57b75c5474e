use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "captcha-broker")]
#[command(about = "Caching, admission-controlled broker for captcha recognition")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 9898, env = "CAPTCHA_BROKER_PORT")]
    pub port: u16,

    // Default model backends (comma-separated)
    // Example: "localhost:9899,localhost:9900"
    #[arg(short, long, default_value = "localhost:9899", env = "CAPTCHA_BROKER_BACKENDS")]
    pub backends: String,

    // Specialized alphanumeric model backends, optional
    #[arg(long, env = "CAPTCHA_BROKER_ALNUM_BACKENDS")]
    pub alnum_backends: Option<String>,

    // "Difficult" model variant backends, defaults to the main pool
    #[arg(long, env = "CAPTCHA_BROKER_DIFFICULT_BACKENDS")]
    pub difficult_backends: Option<String>,

    // Slide matching backends, defaults to the main pool
    #[arg(long, env = "CAPTCHA_BROKER_SLIDE_BACKENDS")]
    pub slide_backends: Option<String>,

    // Cache TTL in seconds
    #[arg(short, long, default_value_t = 3600, env = "CAPTCHA_BROKER_CACHE_TTL")]
    pub cache_ttl: u64,

    #[arg(long, default_value_t = 500, env = "CAPTCHA_BROKER_OCR_CACHE_MAX")]
    pub ocr_cache_max: usize,

    #[arg(long, default_value_t = 200, env = "CAPTCHA_BROKER_SLIDER_CACHE_MAX")]
    pub slider_cache_max: usize,

    // Max concurrent classifier calls
    #[arg(long, default_value_t = 10, env = "CAPTCHA_BROKER_MAX_CONCURRENCY")]
    pub max_concurrency: usize,

    // Blocking worker pool size
    #[arg(long, default_value_t = 16, env = "CAPTCHA_BROKER_WORKER_THREADS")]
    pub worker_threads: usize,

    // Seconds a request waits on one classifier call, 0 = forever
    #[arg(long, default_value_t = 30, env = "CAPTCHA_BROKER_CLASSIFY_TIMEOUT")]
    pub classify_timeout: u64,

    // Health check interval
    #[arg(long, default_value_t = 30, env = "CAPTCHA_BROKER_HEALTH_INTERVAL")]
    pub health_interval: u64,

    // In-memory cache sweep interval
    #[arg(long, default_value_t = 1800, env = "CAPTCHA_BROKER_JANITOR_INTERVAL")]
    pub janitor_interval: u64,

    // Enables the on-disk cache copy when set
    #[arg(long, env = "CAPTCHA_BROKER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 7, env = "CAPTCHA_BROKER_DISK_RETENTION_DAYS")]
    pub disk_retention_days: u64,

    #[arg(long, default_value_t = 10_000, env = "CAPTCHA_BROKER_DISK_MAX_FILES")]
    pub disk_max_files: usize,

    #[arg(long, default_value_t = 21_600, env = "CAPTCHA_BROKER_DISK_JANITOR_INTERVAL")]
    pub disk_janitor_interval: u64,
}

/// Sizing for the two cache partitions.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub ocr_max_entries: usize,
    pub slider_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            ocr_max_entries: 500,
            slider_max_entries: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskConfig {
    pub dir: PathBuf,
    pub retention: Duration,
    pub max_files: usize,
}

/// Janitor schedule. `high_water` is a fraction of each partition's capacity,
/// `evict_fraction` the share of entries dropped per pressure round.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub disk_interval: Duration,
    pub high_water: f64,
    pub evict_fraction: f64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            disk_interval: Duration::from_secs(6 * 60 * 60),
            high_water: 0.8,
            evict_fraction: 0.3,
        }
    }
}

impl Args {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl),
            ocr_max_entries: self.ocr_cache_max,
            slider_max_entries: self.slider_cache_max,
        }
    }

    pub fn disk_config(&self) -> Option<DiskConfig> {
        self.cache_dir.as_ref().map(|dir| DiskConfig {
            dir: dir.clone(),
            retention: Duration::from_secs(self.disk_retention_days * 24 * 60 * 60),
            max_files: self.disk_max_files,
        })
    }

    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            interval: Duration::from_secs(self.janitor_interval),
            disk_interval: Duration::from_secs(self.disk_janitor_interval),
            ..JanitorConfig::default()
        }
    }

    pub fn classify_timeout(&self) -> Option<Duration> {
        (self.classify_timeout > 0).then(|| Duration::from_secs(self.classify_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_legacy_service() {
        let args = Args::parse_from(["captcha-broker"]);
        assert_eq!(args.port, 9898);
        assert_eq!(args.max_concurrency, 10);
        assert_eq!(args.cache_config().ttl, Duration::from_secs(3600));
        assert!(args.disk_config().is_none());
        assert!(args.alnum_backends.is_none());
    }

    #[test]
    fn zero_timeout_disables_it() {
        let args = Args::parse_from(["captcha-broker", "--classify-timeout", "0"]);
        assert_eq!(args.classify_timeout(), None);
    }

    #[test]
    fn cache_dir_enables_disk_store() {
        let args = Args::parse_from([
            "captcha-broker",
            "--cache-dir",
            "/tmp/cb",
            "--disk-retention-days",
            "2",
        ]);
        let disk = args.disk_config().unwrap();
        assert_eq!(disk.dir, PathBuf::from("/tmp/cb"));
        assert_eq!(disk.retention, Duration::from_secs(2 * 86_400));
    }
}
