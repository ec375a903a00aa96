// src/signals/fields.rs
//! Untrusted candidate data as produced by the enrichment service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SYMBOL: &str = "symbol";
pub const DIRECTION: &str = "direction";
pub const ENTRY_PRICE: &str = "entry_price";
pub const STOP_LOSS: &str = "stop_loss";
pub const TAKE_PROFIT: &str = "take_profit";
pub const CONFIDENCE: &str = "confidence";
pub const TIMEFRAME: &str = "timeframe";
pub const REASONING: &str = "reasoning";

/// Loosely typed fields keyed by name. Nothing here is trusted until the
/// factory has coerced and validated it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields(Map<String, Value>);

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only JSON objects carry fields.
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty trimmed string value.
    pub(crate) fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            _ => None,
        }
    }

    /// Finite number, either a JSON number or a numeric string like `"$50000.5"`.
    pub(crate) fn number(&self, key: &str) -> Option<f64> {
        coerce_number(self.get(key)?)
    }

    /// Non-empty list of finite numbers. Accepts a JSON array, a single number,
    /// or a comma separated string. One bad element spoils the whole list.
    pub(crate) fn numbers(&self, key: &str) -> Option<Vec<f64>> {
        let out: Option<Vec<f64>> = match self.get(key)? {
            Value::Array(items) => items.iter().map(coerce_number).collect(),
            Value::String(s) => s.split(',').map(parse_number).collect(),
            other => coerce_number(other).map(|n| vec![n]),
        };
        out.filter(|v| !v.is_empty())
    }
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    let t = t.strip_prefix('$').unwrap_or(t).trim();
    t.parse::<f64>().ok().filter(|x| x.is_finite())
}
