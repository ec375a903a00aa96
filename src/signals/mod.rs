// src/signals/mod.rs
//! Turning extracted fields into validated, immutable trading signals.

pub mod fields;
pub mod validator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use fields::ExtractedFields;
pub use validator::{
    RejectReason, Rejection, RiskReward, SignalValidator, ValidationCfg, DEFAULT_TIMEFRAMES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Case-insensitive `LONG` / `SHORT`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Some(Self::Long),
            "SHORT" => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("LONG"),
            Self::Short => f.write_str("SHORT"),
        }
    }
}

/// Complete, typed, but not yet validated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: Vec<f64>,
    pub confidence: f64,
    pub timeframe: String,
    pub reasoning: String,
}

impl Candidate {
    /// Completeness stage: every field present and coercible.
    pub fn from_fields(f: &ExtractedFields) -> Result<Self, Rejection> {
        use fields::*;

        let symbol = f.text(SYMBOL).ok_or_else(|| Rejection::missing(SYMBOL))?;
        let direction = f
            .text(DIRECTION)
            .and_then(|d| Direction::parse(&d))
            .ok_or_else(|| Rejection::missing(DIRECTION))?;
        let entry_price = f
            .number(ENTRY_PRICE)
            .ok_or_else(|| Rejection::missing(ENTRY_PRICE))?;
        let stop_loss = f
            .number(STOP_LOSS)
            .ok_or_else(|| Rejection::missing(STOP_LOSS))?;
        let take_profit = f
            .numbers(TAKE_PROFIT)
            .ok_or_else(|| Rejection::missing(TAKE_PROFIT))?;
        let confidence = f
            .number(CONFIDENCE)
            .filter(|c| (0.0..=1.0).contains(c))
            .ok_or_else(|| Rejection::missing(CONFIDENCE))?;
        let timeframe = f
            .text(TIMEFRAME)
            .ok_or_else(|| Rejection::missing(TIMEFRAME))?;
        let reasoning = f
            .text(REASONING)
            .ok_or_else(|| Rejection::missing(REASONING))?;

        Ok(Self {
            symbol,
            direction,
            entry_price,
            stop_loss,
            take_profit,
            confidence,
            timeframe,
            reasoning,
        })
    }

    /// The take-profit closest to entry: lowest for LONG, highest for SHORT.
    pub fn nearest_take_profit(&self) -> f64 {
        let it = self.take_profit.iter().copied();
        match self.direction {
            Direction::Long => it.fold(f64::INFINITY, f64::min),
            Direction::Short => it.fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn risk_reward(&self) -> RiskReward {
        let tp = self.nearest_take_profit();
        match self.direction {
            Direction::Long => RiskReward {
                risk: self.entry_price - self.stop_loss,
                reward: tp - self.entry_price,
            },
            Direction::Short => RiskReward {
                risk: self.stop_loss - self.entry_price,
                reward: self.entry_price - tp,
            },
        }
    }
}

/// A validated signal. Only [`SignalFactory`] can build one; it is never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    item_id: String,
    symbol: String,
    direction: Direction,
    entry_price: f64,
    stop_loss: f64,
    take_profit: Vec<f64>,
    confidence: f64,
    timeframe: String,
    reasoning: String,
    created_at: DateTime<Utc>,
}

impl Signal {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }
    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }
    pub fn take_profit(&self) -> &[f64] {
        &self.take_profit
    }
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builds signals from untrusted fields. Pure: no I/O, no logging, no clock
/// reads (the caller passes `now`).
#[derive(Debug, Clone)]
pub struct SignalFactory {
    validator: SignalValidator,
}

impl SignalFactory {
    pub fn new(cfg: ValidationCfg) -> Self {
        Self {
            validator: SignalValidator::new(cfg),
        }
    }

    pub fn validator(&self) -> &SignalValidator {
        &self.validator
    }

    pub fn build(
        &self,
        fields: &ExtractedFields,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Signal, Rejection> {
        let c = Candidate::from_fields(fields)?;
        self.validator.validate(&c)?;

        Ok(Signal {
            item_id: item_id.to_string(),
            symbol: c.symbol,
            direction: c.direction,
            entry_price: c.entry_price,
            stop_loss: c.stop_loss,
            take_profit: c.take_profit,
            confidence: c.confidence,
            timeframe: c.timeframe,
            reasoning: c.reasoning,
            created_at: now,
        })
    }
}
