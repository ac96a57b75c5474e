use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ConfigError;

// Single recognition backend replica
pub struct Backend {
    pub url: String,
    healthy: AtomicBool,
}

impl Backend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Round-robin pool of replicas serving one model variant
pub struct LoadBalancer {
    name: &'static str,
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl LoadBalancer {
    // Create from comma-separated urls "localhost:9899, localhost:9900"
    pub fn new(name: &'static str, backends_str: &str) -> Result<Self, ConfigError> {
        let backends: Vec<Arc<Backend>> = backends_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|url| {
                // add http:// if not present
                let full_url = if url.starts_with("http") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Backend::new(full_url))
            })
            .collect();
        if backends.is_empty() {
            return Err(ConfigError::NoBackends(name));
        }

        info!(pool = name, count = backends.len(), "load balancer initialized");
        for (i, b) in backends.iter().enumerate() {
            info!(pool = name, "  [{}]  {}", i + 1, b.url);
        }

        Ok(Self {
            name,
            backends,
            current: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // Get next healthy backend (round-robin)
    pub fn get_backend(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        for i in 0..len {
            let idx = (start + i) % len;
            let backend = &self.backends[idx];

            if backend.is_healthy() {
                return Some(Arc::clone(backend));
            }
        }
        // No healthy backends
        None
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}

// Health check loop, probes every replica's liveness route until cancelled
pub async fn health_checker(
    load_balancer: Arc<LoadBalancer>,
    client: reqwest::Client,
    check_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(check_interval);

    info!(pool = load_balancer.name(), ?check_interval, "health checker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(pool = load_balancer.name(), "health checker stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        for backend in load_balancer.all_backends() {
            let url = format!("{}/", backend.url);

            let was_healthy = backend.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            backend.set_healthy(is_healthy);

            // Log status changes
            if was_healthy != is_healthy {
                if is_healthy {
                    info!(
                        pool = load_balancer.name(),
                        backend = %backend.url,
                        "backend is now healthy"
                    );
                } else {
                    warn!(
                        pool = load_balancer.name(),
                        backend = %backend.url,
                        "backend is now unhealthy"
                    );
                }
            }
        }
    }
}
