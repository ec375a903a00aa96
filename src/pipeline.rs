// src/pipeline.rs
//! Consumer side of the item queue: enrich each new post, build a signal,
//! store it, and report the outcome.

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::enrich::Enricher;
use crate::history::SignalStore;
use crate::ingest::RawItem;
use crate::signals::{Rejection, Signal, SignalFactory};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("signals_accepted_total", "Candidates that became signals.");
        describe_counter!(
            "signals_rejected_total",
            "Candidates turned down, labelled by reason code."
        );
        describe_counter!("signals_no_candidate_total", "Posts without any candidate.");
        describe_counter!("pipeline_errors_total", "Enrichment or store failures.");
        describe_counter!(
            "pipeline_skipped_total",
            "Posts already processed by an earlier run."
        );
    });
}

/// Where accepted signals and rejections go (notifier, log, test probe...).
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn on_signal(&self, signal: &Signal);
    async fn on_rejected(&self, item_id: &str, rejection: &Rejection);
}

/// Writes outcomes to the `signals` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl OutcomeSink for LogSink {
    async fn on_signal(&self, s: &Signal) {
        tracing::info!(
            target: "signals",
            item_id = s.item_id(),
            symbol = s.symbol(),
            direction = %s.direction(),
            entry = s.entry_price(),
            stop = s.stop_loss(),
            take_profit = ?s.take_profit(),
            confidence = s.confidence(),
            timeframe = s.timeframe(),
            "signal accepted"
        );
    }

    async fn on_rejected(&self, item_id: &str, r: &Rejection) {
        tracing::info!(
            target: "signals",
            item_id,
            reason = r.reason.code(),
            detail = %r.detail,
            "signal rejected"
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    AlreadyProcessed,
    NoCandidate,
    Accepted(Signal),
    Rejected(Rejection),
    /// Enrichment failed; the post is not retried.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub no_candidate: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PipelineStats {
    fn record(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::AlreadyProcessed => self.skipped += 1,
            ItemOutcome::NoCandidate => self.no_candidate += 1,
            ItemOutcome::Accepted(_) => self.accepted += 1,
            ItemOutcome::Rejected(_) => self.rejected += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

pub struct Pipeline {
    enricher: Arc<dyn Enricher>,
    factory: SignalFactory,
    store: Arc<dyn SignalStore>,
    sink: Arc<dyn OutcomeSink>,
}

impl Pipeline {
    pub fn new(
        enricher: Arc<dyn Enricher>,
        factory: SignalFactory,
        store: Arc<dyn SignalStore>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            enricher,
            factory,
            store,
            sink,
        }
    }

    pub fn spawn(self, rx: mpsc::Receiver<RawItem>) -> JoinHandle<PipelineStats> {
        tokio::spawn(self.run(rx))
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<RawItem>) -> PipelineStats {
        let mut stats = PipelineStats::default();
        while let Some(item) = rx.recv().await {
            let outcome = self.process(&item).await;
            stats.record(&outcome);
        }
        tracing::info!(
            target: "pipeline",
            processed = stats.processed,
            accepted = stats.accepted,
            rejected = stats.rejected,
            "item queue closed, pipeline done"
        );
        stats
    }

    pub async fn process(&self, item: &RawItem) -> ItemOutcome {
        match self.store.lookup(&item.id).await {
            Ok(true) => {
                tracing::debug!(target: "pipeline", item_id = %item.id, "already processed");
                counter!("pipeline_skipped_total").increment(1);
                return ItemOutcome::AlreadyProcessed;
            }
            Ok(false) => {}
            Err(e) => {
                // The in-process deduplicator still guards this run.
                tracing::warn!(target: "pipeline", item_id = %item.id, error = %e, "store lookup failed");
                counter!("pipeline_errors_total").increment(1);
            }
        }
        if let Err(e) = self.store.mark_processed(&item.id).await {
            tracing::warn!(target: "pipeline", item_id = %item.id, error = %e, "mark processed failed");
            counter!("pipeline_errors_total").increment(1);
        }

        let fields = match self.enricher.enrich(item).await {
            Ok(Some(f)) if !f.is_empty() => f,
            Ok(_) => {
                tracing::debug!(target: "pipeline", item_id = %item.id, "no candidate");
                counter!("signals_no_candidate_total").increment(1);
                return ItemOutcome::NoCandidate;
            }
            Err(e) => {
                tracing::warn!(
                    target: "pipeline",
                    item_id = %item.id,
                    enricher = self.enricher.name(),
                    error = %e,
                    "enrichment failed"
                );
                counter!("pipeline_errors_total").increment(1);
                return ItemOutcome::Failed(e.to_string());
            }
        };

        match self.factory.build(&fields, &item.id, Utc::now()) {
            Ok(signal) => {
                if let Err(e) = self.store.persist(&signal).await {
                    tracing::warn!(target: "pipeline", item_id = %item.id, error = %e, "persist failed");
                    counter!("pipeline_errors_total").increment(1);
                }
                counter!("signals_accepted_total").increment(1);
                self.sink.on_signal(&signal).await;
                ItemOutcome::Accepted(signal)
            }
            Err(rejection) => {
                counter!("signals_rejected_total", "reason" => rejection.reason.code())
                    .increment(1);
                self.sink.on_rejected(&item.id, &rejection).await;
                ItemOutcome::Rejected(rejection)
            }
        }
    }
}
