use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser; // for cli
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use captcha_broker::cache::DiskStore;
use captcha_broker::config::Args;
use captcha_broker::janitor::run_disk_janitor;
use captcha_broker::load_balancer::{LoadBalancer, health_checker};
use captcha_broker::remote::RemoteClassifier;
use captcha_broker::{
    AdmissionController, AppState, Broker, CacheJanitor, ClassifierSet, ResultCache, build_router,
};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "captcha_broker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();

    // classifier calls run on the blocking pool, size it explicitly
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(args.worker_threads.max(1))
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let cancel = CancellationToken::new();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build http client")?;

    // one pool per model variant, optional pools fall back to the default one
    let default_pool = Arc::new(LoadBalancer::new("default", &args.backends)?);
    let pool_or_default =
        |name: &'static str, urls: &Option<String>| -> Result<Arc<LoadBalancer>> {
            Ok(match urls {
                Some(urls) => Arc::new(LoadBalancer::new(name, urls)?),
                None => Arc::clone(&default_pool),
            })
        };
    let difficult_pool = pool_or_default("difficult", &args.difficult_backends)?;
    let slide_pool = pool_or_default("slide", &args.slide_backends)?;
    let alnum_pool = match &args.alnum_backends {
        Some(urls) => Some(Arc::new(LoadBalancer::new("alphanumeric", urls)?)),
        None => None,
    };

    let remote = |pool: &Arc<LoadBalancer>| {
        Arc::new(RemoteClassifier::new(Arc::clone(pool), client.clone(), Handle::current()))
    };
    let mut models =
        ClassifierSet::new(remote(&default_pool)).with_difficult(remote(&difficult_pool));
    if let Some(pool) = &alnum_pool {
        models = models.with_alphanumeric(remote(pool));
    } else {
        info!("no alphanumeric model configured, using the default model");
    }

    // cache, optionally backed by disk
    let disk = match args.disk_config().map(DiskStore::open) {
        Some(Ok(store)) => Some(Arc::new(store)),
        Some(Err(e)) => {
            warn!(error = %e, "cache directory unavailable, running memory-only");
            None
        }
        None => None,
    };
    let cache = Arc::new(ResultCache::new(&args.cache_config(), disk.clone()));
    let admission = Arc::new(AdmissionController::new(
        args.max_concurrency,
        args.classify_timeout(),
    ));
    let broker = Broker::new(Arc::clone(&cache), admission, models, remote(&slide_pool));
    let state = Arc::new(AppState::new(broker));

    // background loops
    let mut tasks = Vec::new();
    let janitor = CacheJanitor::new(Arc::clone(&cache), args.janitor_config());
    tasks.push(tokio::spawn(janitor.run(cancel.clone())));
    if let Some(disk) = disk {
        let every = args.janitor_config().disk_interval;
        tasks.push(tokio::spawn(run_disk_janitor(disk, every, cancel.clone())));
    }

    let mut pools = vec![Arc::clone(&default_pool)];
    for pool in [&difficult_pool, &slide_pool].into_iter().chain(alnum_pool.as_ref()) {
        if !pools.iter().any(|p| Arc::ptr_eq(p, pool)) {
            pools.push(Arc::clone(pool));
        }
    }
    for pool in pools {
        let interval = Duration::from_secs(args.health_interval.max(1));
        let checker = health_checker(pool, client.clone(), interval, cancel.clone());
        tasks.push(tokio::spawn(checker));
    }

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Captcha broker running on http://localhost:{}", args.port);
    info!("Cache TTL: {} seconds", args.cache_ttl);
    info!("Max concurrent classifier calls: {}", args.max_concurrency);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("captcha broker stopped");
    Ok(())
}
