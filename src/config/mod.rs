// src/config/mod.rs
//! Bot configuration: one TOML file, validated once at startup.
//!
//! Resolution order for the file path:
//! 1) $BOT_CONFIG_PATH
//! 2) config/bot.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::history::SignalHistory;
use crate::ingest::{RateLimiter, RecencyDeduplicator, SchedulerCfg, SourceId};
use crate::signals::ValidationCfg;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_CONFIG_PATH: &str = "BOT_CONFIG_PATH";
/// Longest look-back for a fresh source (the recent-timeline API serves 7 days).
pub const MAX_BACKFILL_SECS: u64 = 7 * 24 * 3600;

fn default_backfill_secs() -> u64 {
    300
}
fn default_max_results() -> usize {
    10
}
fn default_queue_capacity() -> usize {
    256
}
fn default_backpressure_timeout_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

/// Rate budget and loop timing. The first three fields have no defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSection {
    pub rate_limit_window_secs: u64,
    pub max_requests_per_window: usize,
    pub poll_interval_secs: u64,
    #[serde(default = "default_backfill_secs")]
    pub backfill_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_backpressure_timeout_ms")]
    pub backpressure_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupSection {
    pub retention_secs: u64,
    pub capacity: usize,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            retention_secs: 7 * 24 * 3600,
            capacity: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySection {
    /// Processed ids and accepted signals kept in memory, each.
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// A monitored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub history: HistorySection,
    pub signals: ValidationCfg,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    /// e.g. "0.0.0.0:9000"; no metrics server when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl BotConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: BotConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load using $BOT_CONFIG_PATH, falling back to `config/bot.toml`.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.rate_limit_window_secs == 0 {
            return Err(ConfigError::invalid("rate_limit_window_secs", "must be > 0"));
        }
        if s.max_requests_per_window == 0 {
            return Err(ConfigError::invalid("max_requests_per_window", "must be > 0"));
        }
        if s.poll_interval_secs == 0 {
            return Err(ConfigError::invalid("poll_interval_secs", "must be > 0"));
        }
        if s.backfill_secs > MAX_BACKFILL_SECS {
            return Err(ConfigError::invalid(
                "backfill_secs",
                format!("must be <= {MAX_BACKFILL_SECS}"),
            ));
        }
        if s.max_results == 0 {
            return Err(ConfigError::invalid("max_results", "must be > 0"));
        }
        if s.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be > 0"));
        }
        if self.dedup.capacity == 0 {
            return Err(ConfigError::invalid("dedup.capacity", "must be > 0"));
        }
        if self.history.capacity == 0 {
            return Err(ConfigError::invalid("history.capacity", "must be > 0"));
        }
        if self.sources.iter().any(|e| e.id.trim().is_empty()) {
            return Err(ConfigError::invalid("sources", "source id must not be empty"));
        }
        self.signals.validate()?;
        if self.active_sources().is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(())
    }

    /// Active sources, config order, duplicates removed.
    pub fn active_sources(&self) -> Vec<SourceId> {
        let mut out: Vec<SourceId> = Vec::new();
        for e in self.sources.iter().filter(|e| e.active) {
            let id = SourceId::new(e.id.trim());
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            poll_interval: Duration::from_secs(self.scheduler.poll_interval_secs),
            backfill: Duration::from_secs(self.scheduler.backfill_secs),
            max_results: self.scheduler.max_results,
            backpressure_timeout: Duration::from_millis(self.scheduler.backpressure_timeout_ms),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.scheduler.max_requests_per_window,
            Duration::from_secs(self.scheduler.rate_limit_window_secs),
        )
    }

    pub fn deduplicator(&self) -> RecencyDeduplicator {
        RecencyDeduplicator::new(
            Duration::from_secs(self.dedup.retention_secs),
            self.dedup.capacity,
        )
    }

    pub fn signal_history(&self) -> SignalHistory {
        SignalHistory::with_capacity(self.history.capacity)
    }
}
