// src/signals/validator.rs
//! Staged checks that decide whether a candidate becomes a signal.
//!
//! Stages run in a fixed order and the first failure wins:
//! completeness, confidence, price ordering, deviation, risk/reward, timeframe.
//! Completeness lives in [`Candidate::from_fields`]; the rest is here.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::{Candidate, Direction};
use crate::error::ConfigError;

pub const DEFAULT_TIMEFRAMES: [&str; 8] = ["1m", "5m", "15m", "30m", "1h", "4h", "1d", "1w"];

/// Why a candidate was turned down. A normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    MissingField,
    LowConfidence,
    InvalidPriceLevels,
    ExcessiveDeviation,
    InsufficientRiskReward,
    InvalidTimeframe,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::LowConfidence => "LOW_CONFIDENCE",
            Self::InvalidPriceLevels => "INVALID_PRICE_LEVELS",
            Self::ExcessiveDeviation => "EXCESSIVE_DEVIATION",
            Self::InsufficientRiskReward => "INSUFFICIENT_RISK_REWARD",
            Self::InvalidTimeframe => "INVALID_TIMEFRAME",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Reason code plus a short human readable detail for logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(RejectReason::MissingField, format!("`{field}` missing or not usable"))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

/// Risk per unit and reward per unit, measured to the nearest take-profit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskReward {
    pub risk: f64,
    pub reward: f64,
}

impl RiskReward {
    pub fn ratio(&self) -> f64 {
        self.reward / self.risk
    }
}

/// Thresholds for the validation stages. Every field is required in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCfg {
    pub min_confidence: f64,
    pub min_risk_reward_ratio: f64,
    pub price_deviation_threshold: f64,
    pub timeframe_validation: bool,
    pub allowed_timeframes: Vec<String>,
}

impl Default for ValidationCfg {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            min_risk_reward_ratio: 2.0,
            price_deviation_threshold: 0.05,
            timeframe_validation: true,
            allowed_timeframes: DEFAULT_TIMEFRAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ValidationCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::invalid("min_confidence", "must be within 0..=1"));
        }
        if !self.min_risk_reward_ratio.is_finite() || self.min_risk_reward_ratio < 0.0 {
            return Err(ConfigError::invalid(
                "min_risk_reward_ratio",
                "must be a finite number >= 0",
            ));
        }
        if !self.price_deviation_threshold.is_finite() || self.price_deviation_threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "price_deviation_threshold",
                "must be a finite number > 0",
            ));
        }
        if self.timeframe_validation && self.allowed_timeframes.iter().all(|t| t.trim().is_empty())
        {
            return Err(ConfigError::invalid(
                "allowed_timeframes",
                "must not be empty when timeframe_validation is on",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SignalValidator {
    cfg: ValidationCfg,
    allowed: HashSet<String>,
}

impl SignalValidator {
    pub fn new(cfg: ValidationCfg) -> Self {
        let allowed = cfg
            .allowed_timeframes
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { cfg, allowed }
    }

    pub fn cfg(&self) -> &ValidationCfg {
        &self.cfg
    }

    /// Stages 2..=6 on an already complete candidate.
    pub fn validate(&self, c: &Candidate) -> Result<RiskReward, Rejection> {
        // candidates built by hand skip `from_fields`
        if c.take_profit.is_empty() {
            return Err(Rejection::missing(super::fields::TAKE_PROFIT));
        }
        self.check_confidence(c)?;
        check_price_levels(c)?;
        self.check_deviation(c)?;
        let rr = self.check_risk_reward(c)?;
        self.check_timeframe(c)?;
        Ok(rr)
    }

    fn check_confidence(&self, c: &Candidate) -> Result<(), Rejection> {
        if c.confidence < self.cfg.min_confidence {
            return Err(Rejection::new(
                RejectReason::LowConfidence,
                format!(
                    "confidence {:.2} below {:.2}",
                    c.confidence, self.cfg.min_confidence
                ),
            ));
        }
        Ok(())
    }

    fn check_deviation(&self, c: &Candidate) -> Result<(), Rejection> {
        let deviation = (c.entry_price - c.stop_loss).abs() / c.entry_price;
        if deviation > self.cfg.price_deviation_threshold {
            return Err(Rejection::new(
                RejectReason::ExcessiveDeviation,
                format!(
                    "stop distance {:.4} exceeds {:.4}",
                    deviation, self.cfg.price_deviation_threshold
                ),
            ));
        }
        Ok(())
    }

    fn check_risk_reward(&self, c: &Candidate) -> Result<RiskReward, Rejection> {
        let rr = c.risk_reward();
        if rr.risk <= 0.0 || rr.reward <= 0.0 {
            return Err(Rejection::new(
                RejectReason::InsufficientRiskReward,
                format!("risk {} / reward {} not both positive", rr.risk, rr.reward),
            ));
        }
        let ratio = rr.ratio();
        if ratio < self.cfg.min_risk_reward_ratio {
            return Err(Rejection::new(
                RejectReason::InsufficientRiskReward,
                format!(
                    "reward/risk {:.2} below {:.2}",
                    ratio, self.cfg.min_risk_reward_ratio
                ),
            ));
        }
        Ok(rr)
    }

    fn check_timeframe(&self, c: &Candidate) -> Result<(), Rejection> {
        if !self.cfg.timeframe_validation {
            return Ok(());
        }
        let label = c.timeframe.trim().to_ascii_lowercase();
        if !self.allowed.contains(&label) {
            return Err(Rejection::new(
                RejectReason::InvalidTimeframe,
                format!("timeframe `{}` not allowed", c.timeframe),
            ));
        }
        Ok(())
    }
}

fn check_price_levels(c: &Candidate) -> Result<(), Rejection> {
    let invalid = |why: &str| Rejection::new(RejectReason::InvalidPriceLevels, why.to_string());

    let all_positive = c.entry_price > 0.0
        && c.stop_loss > 0.0
        && c.take_profit.iter().all(|tp| *tp > 0.0);
    if !all_positive {
        return Err(invalid("price levels must be positive"));
    }

    let ordered = match c.direction {
        Direction::Long => c.stop_loss < c.entry_price && c.entry_price < c.nearest_take_profit(),
        Direction::Short => c.nearest_take_profit() < c.entry_price && c.entry_price < c.stop_loss,
    };
    if !ordered {
        return Err(invalid(match c.direction {
            Direction::Long => "LONG needs stop < entry < min(take_profit)",
            Direction::Short => "SHORT needs max(take_profit) < entry < stop",
        }));
    }
    Ok(())
}
