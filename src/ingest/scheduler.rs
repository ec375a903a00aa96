// src/ingest/scheduler.rs
//! Cursor-based poll loop: one rate-limited fetch per source per cycle,
//! failures isolated per source, new items handed off through a bounded queue.

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TrySendError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::ingest::dedup::Deduplicator;
use crate::ingest::ensure_metrics_described;
use crate::ingest::rate_limit::{Acquire, RateLimiter};
use crate::ingest::types::{RawItem, SourceId, SourceProvider};

/// Cooperative stop flag shared between the poll task and its owner.
///
/// Stopping is sticky and idempotent; it may happen before the loop starts.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `stop()` has been called (immediately if it already was).
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerCfg {
    pub poll_interval: Duration,
    /// How far back a newly added source starts.
    pub backfill: Duration,
    pub max_results: usize,
    /// How long delivery may block on a full queue before the item is dropped.
    pub backpressure_timeout: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            backfill: Duration::from_secs(5 * 60),
            max_results: 10,
            backpressure_timeout: Duration::from_millis(500),
        }
    }
}

/// What happened during one pass over all sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub failed_sources: Vec<SourceId>,
    /// Stop was observed (or the queue closed) before every source was checked.
    pub interrupted: bool,
}

enum Delivery {
    Sent,
    Dropped,
    Closed,
}

pub struct PollScheduler {
    provider: Arc<dyn SourceProvider>,
    limiter: Arc<RateLimiter>,
    dedup: Arc<dyn Deduplicator>,
    cfg: SchedulerCfg,
    sources: Vec<SourceId>,
    cursors: HashMap<SourceId, DateTime<Utc>>,
    stop: StopHandle,
}

impl PollScheduler {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        limiter: Arc<RateLimiter>,
        dedup: Arc<dyn Deduplicator>,
        cfg: SchedulerCfg,
    ) -> Self {
        ensure_metrics_described();
        Self {
            provider,
            limiter,
            dedup,
            cfg,
            sources: Vec::new(),
            cursors: HashMap::new(),
            stop: StopHandle::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Fresh stop handle for another `start()` after a stop. Handles handed out
    /// earlier stay stopped.
    pub fn rearm(&mut self) -> StopHandle {
        self.stop = StopHandle::new();
        self.stop.clone()
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    pub fn cursor(&self, source: &SourceId) -> Option<DateTime<Utc>> {
        self.cursors.get(source).copied()
    }

    /// Register a source. New sources start at `now - backfill`; a known source
    /// keeps its cursor. A backfill that runs off the calendar is a config error.
    pub fn add_source(&mut self, source: SourceId, now: DateTime<Utc>) -> Result<(), ConfigError> {
        if !self.cursors.contains_key(&source) {
            let start = TimeDelta::from_std(self.cfg.backfill)
                .ok()
                .and_then(|b| now.checked_sub_signed(b))
                .ok_or_else(|| ConfigError::invalid("backfill_secs", "out of range"))?;
            self.cursors.insert(source.clone(), start);
        }
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        Ok(())
    }

    /// Run on a dedicated task. The scheduler comes back when the loop exits so
    /// its cursors survive a restart.
    pub fn spawn(
        self,
        sources: Vec<SourceId>,
        tx: mpsc::Sender<RawItem>,
    ) -> JoinHandle<Result<PollScheduler, ConfigError>> {
        tokio::spawn(self.start(sources, tx))
    }

    /// Poll until stopped. Fails only on startup problems.
    pub async fn start(
        mut self,
        sources: Vec<SourceId>,
        tx: mpsc::Sender<RawItem>,
    ) -> Result<PollScheduler, ConfigError> {
        let Some(first) = sources.first() else {
            return Err(ConfigError::NoSources);
        };
        if self.cfg.max_results == 0 {
            return Err(ConfigError::invalid("max_results", "must be > 0"));
        }
        self.provider
            .probe(first)
            .await
            .map_err(ConfigError::SourceUnreachable)?;

        let now = Utc::now();
        for s in sources {
            self.add_source(s, now)?;
        }

        tracing::info!(
            target: "ingest",
            provider = self.provider.name(),
            sources = self.sources.len(),
            interval_secs = self.cfg.poll_interval.as_secs(),
            "poll loop started"
        );

        let stop = self.stop.clone();
        while !stop.is_stopped() {
            let report = self.poll_cycle(&tx).await;
            counter!("ingest_cycles_total").increment(1);
            gauge!("ingest_last_cycle_ts").set(Utc::now().timestamp() as f64);
            tracing::debug!(
                target: "ingest",
                fetched = report.fetched,
                delivered = report.delivered,
                duplicates = report.duplicates,
                dropped = report.dropped,
                failed = report.failed_sources.len(),
                "poll cycle done"
            );
            if report.interrupted {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = stop.stopped() => break,
            }
        }

        tracing::info!(target: "ingest", "poll loop stopped");
        Ok(self)
    }

    /// One pass over every source, in registration order.
    pub async fn poll_cycle(&mut self, tx: &mpsc::Sender<RawItem>) -> CycleReport {
        let mut report = CycleReport::default();
        let sources = self.sources.clone();

        for source in &sources {
            if self.stop.is_stopped() {
                report.interrupted = true;
                break;
            }
            if self.limiter.acquire(&self.stop).await == Acquire::Stopped {
                report.interrupted = true;
                break;
            }
            if !self.poll_source(source, tx, &mut report).await {
                tracing::error!(target: "ingest", "item queue closed, stopping poll loop");
                self.stop.stop();
                report.interrupted = true;
                break;
            }
        }

        report
    }

    /// Returns `false` when the downstream queue is gone.
    async fn poll_source(
        &mut self,
        source: &SourceId,
        tx: &mpsc::Sender<RawItem>,
        report: &mut CycleReport,
    ) -> bool {
        let Some(since) = self.cursor(source) else {
            return true;
        };

        let t0 = std::time::Instant::now();
        let fetched = self
            .provider
            .fetch_since(source, since, self.cfg.max_results)
            .await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_fetch_total").increment(1);

        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(target: "ingest", source = %source, error = %e, "fetch failed");
                counter!("ingest_fetch_errors_total").increment(1);
                report.failed_sources.push(source.clone());
                return true;
            }
        };

        report.fetched += items.len();
        let newest = items.iter().map(|it| it.created_at).max();

        let mut open = true;
        for item in items {
            if !open {
                break;
            }
            if !self.dedup.check_and_mark(&item.id) {
                report.duplicates += 1;
                counter!("ingest_duplicates_total").increment(1);
                continue;
            }
            match self.deliver(tx, item).await {
                Delivery::Sent => {
                    report.delivered += 1;
                    counter!("ingest_items_delivered_total").increment(1);
                }
                Delivery::Dropped => report.dropped += 1,
                Delivery::Closed => open = false,
            }
        }

        // Empty batches leave the cursor alone; it only ever moves forward.
        if let Some(newest) = newest {
            let cursor = self.cursors.entry(source.clone()).or_insert(newest);
            if newest > *cursor {
                *cursor = newest;
            }
            gauge!("ingest_cursor_ts", "source" => source.to_string())
                .set(cursor.timestamp() as f64);
        }

        open
    }

    async fn deliver(&self, tx: &mpsc::Sender<RawItem>, item: RawItem) -> Delivery {
        match tx.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
            Err(TrySendError::Full(item)) => {
                match tx.send_timeout(item, self.cfg.backpressure_timeout).await {
                    Ok(()) => Delivery::Sent,
                    Err(SendTimeoutError::Timeout(item)) => {
                        tracing::warn!(
                            target: "ingest",
                            item_id = %item.id,
                            source = %item.source,
                            "item queue full, dropping item"
                        );
                        counter!("ingest_queue_dropped_total").increment(1);
                        Delivery::Dropped
                    }
                    Err(SendTimeoutError::Closed(_)) => Delivery::Closed,
                }
            }
        }
    }
}
