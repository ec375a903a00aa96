// src/ingest/rate_limit.rs
//! Sliding-window request limiter shared by every outbound fetch.

use metrics::{counter, histogram};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ingest::scheduler::StopHandle;

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// Stop was requested while waiting for capacity; no slot was recorded.
    Stopped,
}

/// At most `max_requests` grants within any trailing `window`.
///
/// Expired timestamps are purged lazily on each check. The window lives behind a
/// mutex so several tasks may share one limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            window,
            max_requests,
            stamps: Mutex::new(VecDeque::with_capacity(max_requests.min(4_096))),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Record a request at `now` if capacity allows. On refusal returns how long
    /// until the oldest timestamp leaves the window.
    pub async fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut stamps = self.stamps.lock().await;
        while let Some(&oldest) = stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() < self.max_requests {
            stamps.push_back(now);
            return Ok(());
        }

        // max_requests == 0 never frees up; fall back to a full window
        let wait = stamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(self.window);
        Err(wait.max(Duration::from_millis(1)))
    }

    /// Wait until one more request fits in the window, then record it.
    pub async fn acquire(&self, stop: &StopHandle) -> Acquire {
        let started = Instant::now();
        let mut waited = false;
        loop {
            if stop.is_stopped() {
                return Acquire::Stopped;
            }
            match self.try_acquire_at(Instant::now()).await {
                Ok(()) => {
                    if waited {
                        histogram!("rate_limit_wait_ms")
                            .record(started.elapsed().as_secs_f64() * 1_000.0);
                    }
                    return Acquire::Granted;
                }
                Err(wait) => {
                    if !waited {
                        counter!("rate_limit_waits_total").increment(1);
                        tracing::debug!(
                            target: "ingest",
                            wait_ms = wait.as_millis() as u64,
                            "rate limit window full, waiting"
                        );
                    }
                    waited = true;
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = stop.stopped() => return Acquire::Stopped,
                    }
                }
            }
        }
    }

    /// Requests currently counted in the window (after purging).
    pub async fn in_window(&self) -> usize {
        let now = Instant::now();
        let stamps = self.stamps.lock().await;
        stamps
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_max_then_refuses() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(rl.try_acquire_at(now).await.is_ok());
        }
        let wait = rl.try_acquire_at(now).await.unwrap_err();
        assert_eq!(wait, Duration::from_secs(60));
        assert_eq!(rl.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged() {
        let rl = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(rl.try_acquire_at(t0).await.is_ok());
        assert!(rl.try_acquire_at(t0 + Duration::from_secs(4)).await.is_ok());

        // oldest still inside the window
        let wait = rl
            .try_acquire_at(t0 + Duration::from_secs(9))
            .await
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(1));

        // exactly one window later the first stamp is gone
        assert!(rl.try_acquire_at(t0 + Duration::from_secs(10)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_oldest_to_expire() {
        let rl = RateLimiter::new(1, Duration::from_secs(5));
        let stop = StopHandle::new();
        let t0 = Instant::now();
        assert_eq!(rl.acquire(&stop).await, Acquire::Granted);
        assert_eq!(rl.acquire(&stop).await, Acquire::Granted);
        assert!(Instant::now() - t0 >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_wakes_exactly_when_the_slot_frees() {
        let rl = RateLimiter::new(2, Duration::from_secs(10));
        let stop = StopHandle::new();
        let t0 = Instant::now();
        rl.try_acquire_at(t0).await.unwrap();
        rl.try_acquire_at(t0 + Duration::from_millis(2_500)).await.unwrap();

        assert_eq!(rl.acquire(&stop).await, Acquire::Granted);
        assert_eq!(Instant::now() - t0, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_returns_when_stopped_while_waiting() {
        let rl = std::sync::Arc::new(RateLimiter::new(1, Duration::from_secs(3_600)));
        let stop = StopHandle::new();
        assert_eq!(rl.acquire(&stop).await, Acquire::Granted);

        let waiter = {
            let rl = rl.clone();
            let stop = stop.clone();
            tokio::spawn(async move { rl.acquire(&stop).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();

        assert_eq!(waiter.await.unwrap(), Acquire::Stopped);
        assert_eq!(rl.in_window().await, 1);
    }
}
