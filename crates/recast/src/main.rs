//! Pipeline worker binary: wires the store, cache, relay client,
//! Telegram publisher, scheduler loop, and admin HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use recast::config::Config;
use recast::dedup::{DedupCache, SystemClock};
use recast::publish::PublishStage;
use recast::relay::{HttpRewriter, RelayStage};
use recast::retry::RetryClassifier;
use recast::scheduler::Scheduler;
use recast::server::{AppState, build_app};
use recast::store::MemoryStore;
use recast::{TelegramConfig, TelegramPublisher};

#[derive(Parser)]
#[command(name = "recast", version, about = "Channel repost pipeline worker")]
struct Args {
    /// Path to the YAML config file.
    #[arg(long, default_value = "recast.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).await.context("loading config")?;

    let bot_token =
        std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;
    let publisher = Arc::new(
        TelegramPublisher::connect(TelegramConfig { bot_token })
            .await
            .context("connecting Telegram publisher")?,
    );

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock);
    let cache = Arc::new(DedupCache::new(config.dedup.ttl_hours, clock.clone()));

    let endpoint: Url = config
        .relay
        .endpoint_url
        .parse()
        .context("invalid relay endpoint URL")?;
    let rewriter = Arc::new(HttpRewriter::new(
        reqwest::Client::new(),
        endpoint,
        Duration::from_secs(config.relay.timeout_seconds),
    ));

    let relay = RelayStage::new(
        store.clone(),
        rewriter,
        cache.clone(),
        clock,
        config.relay.batch_size,
        Duration::from_millis(config.relay.item_delay_ms),
    );
    let publish = PublishStage::new(
        store.clone(),
        publisher,
        config.publish.batch_size,
        Duration::from_millis(config.publish.item_delay_ms),
    );
    let retry = RetryClassifier::new(store.clone(), config.retry.ceiling, config.retry.batch_size);
    let (scheduler, handle) = Scheduler::new(
        store.clone(),
        relay,
        publish,
        retry,
        Duration::from_secs(config.scheduler.idle_interval_seconds),
        Duration::from_millis(config.publish.destination_delay_ms),
    );

    let state = AppState {
        cache,
        store,
        scheduler: handle.clone(),
    };
    let app = build_app(state, config.server.request_timeout_seconds);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "admin API listening");

    let scheduler_task = tokio::spawn(scheduler.run());

    let shutdown_handle = handle.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_handle.shutdown();
        })
        .await
        .context("admin server failed")?;

    handle.shutdown();
    scheduler_task.await.context("scheduler task panicked")?;
    Ok(())
}
