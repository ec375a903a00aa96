// src/ingest/dedup.rs
//! At-most-once delivery of item ids, bounded by recency and capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub trait Deduplicator: Send + Sync {
    fn seen(&self, id: &str) -> bool;
    fn mark_seen(&self, id: &str);
    /// Atomic check-then-mark. Returns `true` only for the first sighting.
    fn check_and_mark(&self, id: &str) -> bool;
}

#[derive(Debug)]
struct Inner {
    seen: HashMap<String, Instant>,
    /// Insertion order, oldest first. May hold stale ids that were re-marked.
    order: VecDeque<(Instant, String)>,
}

/// In-memory seen-set. Ids older than `retention` are forgotten lazily, and
/// the oldest ids go first once `capacity` is exceeded.
#[derive(Debug)]
pub struct RecencyDeduplicator {
    inner: Mutex<Inner>,
    retention: Duration,
    capacity: usize,
}

impl RecencyDeduplicator {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashMap::new(),
                order: VecDeque::new(),
            }),
            retention,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned set is still a valid set
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict(&self, inner: &mut Inner, now: Instant) {
        while let Some((at, id)) = inner.order.front() {
            let expired = now.saturating_duration_since(*at) >= self.retention;
            let over = inner.seen.len() > self.capacity;
            if !expired && !over {
                break;
            }
            // only drop the map entry if this queue slot is still its latest mark
            if inner.seen.get(id) == Some(at) {
                inner.seen.remove(id);
            }
            inner.order.pop_front();
        }
    }

    fn insert(&self, inner: &mut Inner, id: &str, now: Instant) {
        inner.seen.insert(id.to_string(), now);
        inner.order.push_back((now, id.to_string()));
        self.evict(inner, now);
    }
}

impl Deduplicator for RecencyDeduplicator {
    fn seen(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        self.evict(&mut inner, now);
        inner.seen.contains_key(id)
    }

    fn mark_seen(&self, id: &str) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.insert(&mut inner, id, now);
    }

    fn check_and_mark(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        self.evict(&mut inner, now);
        if inner.seen.contains_key(id) {
            return false;
        }
        self.insert(&mut inner, id, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_id_passes_once() {
        let d = RecencyDeduplicator::new(Duration::from_secs(3_600), 100);
        assert!(d.check_and_mark("1"));
        assert!(!d.check_and_mark("1"));
        assert!(d.check_and_mark("2"));
        assert!(d.seen("1"));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let d = RecencyDeduplicator::new(Duration::from_secs(3_600), 2);
        d.mark_seen("a");
        d.mark_seen("b");
        d.mark_seen("c");
        assert!(!d.seen("a"));
        assert!(d.seen("b"));
        assert!(d.seen("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn retention_forgets_old_ids() {
        let d = RecencyDeduplicator::new(Duration::from_secs(60), 100);
        assert!(d.check_and_mark("x"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!d.check_and_mark("x"));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(d.check_and_mark("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn remarking_keeps_latest_timestamp() {
        let d = RecencyDeduplicator::new(Duration::from_secs(3_600), 2);
        d.mark_seen("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        d.mark_seen("b");
        tokio::time::advance(Duration::from_secs(1)).await;
        d.mark_seen("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        // over capacity: the stale slot of "a" is skipped, "b" is the oldest live id
        d.mark_seen("c");
        assert!(d.seen("a"));
        assert!(!d.seen("b"));
        assert!(d.seen("c"));
    }
}
