//! history.rs: durable-ish record of processed posts and accepted signals.
//!
//! The in-memory [`SignalHistory`] is the default store; anything that can
//! answer "was this post already handled?" can stand in via [`SignalStore`].

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::signals::Signal;

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// True when `item_id` was processed before (possibly by a previous run).
    async fn lookup(&self, item_id: &str) -> Result<bool>;
    async fn mark_processed(&self, item_id: &str) -> Result<()>;
    async fn persist(&self, signal: &Signal) -> Result<()>;
}

#[derive(Debug, Default)]
struct Inner {
    processed: HashSet<String>,
    processed_order: VecDeque<String>,
    signals: VecDeque<Signal>,
}

/// Capped in-memory store. Oldest entries fall off first.
#[derive(Debug)]
pub struct SignalHistory {
    inner: Mutex<Inner>,
    cap: usize,
}

impl SignalHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cap: cap.clamp(1, 100_000),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last `n` accepted signals, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Signal> {
        let g = self.lock();
        let start = g.signals.len().saturating_sub(n);
        g.signals.iter().skip(start).cloned().collect()
    }

    pub fn signal_count(&self) -> usize {
        self.lock().signals.len()
    }

    pub fn processed_count(&self) -> usize {
        self.lock().processed.len()
    }
}

#[async_trait]
impl SignalStore for SignalHistory {
    async fn lookup(&self, item_id: &str) -> Result<bool> {
        let g = self.lock();
        Ok(g.processed.contains(item_id))
    }

    async fn mark_processed(&self, item_id: &str) -> Result<()> {
        let mut g = self.lock();
        if g.processed.insert(item_id.to_string()) {
            g.processed_order.push_back(item_id.to_string());
        }
        while g.processed_order.len() > self.cap {
            if let Some(old) = g.processed_order.pop_front() {
                g.processed.remove(&old);
            }
        }
        Ok(())
    }

    async fn persist(&self, signal: &Signal) -> Result<()> {
        let mut g = self.lock();
        g.signals.push_back(signal.clone());
        while g.signals.len() > self.cap {
            g.signals.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{ExtractedFields, SignalFactory, ValidationCfg};
    use chrono::Utc;
    use serde_json::json;

    fn signal(id: &str) -> Signal {
        let f = ExtractedFields::new()
            .with("symbol", "BTC/USDT")
            .with("direction", "LONG")
            .with("entry_price", 50_000.0)
            .with("stop_loss", 49_000.0)
            .with("take_profit", json!([52_000.0]))
            .with("confidence", 0.9)
            .with("timeframe", "1h")
            .with("reasoning", "breakout");
        SignalFactory::new(ValidationCfg::default())
            .build(&f, id, Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn lookup_reflects_mark_processed() {
        let h = SignalHistory::with_capacity(10);
        assert!(!h.lookup("a").await.unwrap());
        h.mark_processed("a").await.unwrap();
        h.mark_processed("a").await.unwrap();
        assert!(h.lookup("a").await.unwrap());
        assert_eq!(h.processed_count(), 1);
    }

    #[tokio::test]
    async fn cap_drops_oldest() {
        let h = SignalHistory::with_capacity(2);
        for id in ["a", "b", "c"] {
            h.mark_processed(id).await.unwrap();
            h.persist(&signal(id)).await.unwrap();
        }
        assert!(!h.lookup("a").await.unwrap());
        assert!(h.lookup("c").await.unwrap());

        let ids: Vec<String> = h.recent(10).iter().map(|s| s.item_id().to_string()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(h.recent(1)[0].item_id(), "c");
    }
}
