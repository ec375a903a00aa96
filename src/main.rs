//! Signal bot: binary entrypoint.
//! Loads config, wires the poll loop to the signal pipeline, and runs until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_signal_bot::enrich::{Enricher, HttpEnricher};
use crypto_signal_bot::ingest::providers::TwitterProvider;
use crypto_signal_bot::ingest::{PollScheduler, SourceProvider};
use crypto_signal_bot::metrics::Metrics;
use crypto_signal_bot::{BotConfig, LogSink, Pipeline, SignalFactory};

/// Compact logs by default, JSON when LOG_FORMAT=json. Level via RUST_LOG.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ingest=info,signals=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().compact()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::load_default().context("loading bot config")?;
    let sources = cfg.active_sources();

    let provider: Arc<dyn SourceProvider> = Arc::new(TwitterProvider::from_env()?);
    let enricher: Arc<dyn Enricher> = Arc::new(HttpEnricher::from_env()?);
    let store = Arc::new(cfg.signal_history());

    let scheduler = PollScheduler::new(
        provider,
        Arc::new(cfg.rate_limiter()),
        Arc::new(cfg.deduplicator()),
        cfg.scheduler_cfg(),
    );
    let stop = scheduler.stop_handle();

    let metrics_addr = std::env::var("METRICS_ADDR")
        .ok()
        .or_else(|| cfg.metrics_addr.clone());
    let metrics_task = match metrics_addr {
        Some(addr) => {
            let metrics = Metrics::init()?;
            let stop = stop.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = metrics.serve(&addr, stop).await {
                    tracing::error!(error = %e, "metrics server failed");
                }
            }))
        }
        None => None,
    };

    let (tx, rx) = mpsc::channel(cfg.scheduler.queue_capacity);
    let pipeline = Pipeline::new(
        enricher,
        SignalFactory::new(cfg.signals.clone()),
        store.clone(),
        Arc::new(LogSink),
    );
    let pipeline_task = pipeline.spawn(rx);
    let poll_task = scheduler.spawn(sources, tx);

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, stopping");
                stop.stop();
            }
        });
    }

    // The sender is dropped with the poll task, which lets the pipeline drain.
    let polled = poll_task.await.context("poll task panicked")?;
    if polled.is_err() {
        stop.stop();
    }
    let stats = pipeline_task.await.context("pipeline task panicked")?;
    if let Some(t) = metrics_task {
        let _ = t.await;
    }
    polled.context("poll loop failed to start")?;

    tracing::info!(
        processed = stats.processed,
        accepted = stats.accepted,
        rejected = stats.rejected,
        stored = store.signal_count(),
        "shutdown complete"
    );
    Ok(())
}
