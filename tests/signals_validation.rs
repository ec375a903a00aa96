// tests/signals_validation.rs
use chrono::{TimeZone, Utc};
use serde_json::json;

use crypto_signal_bot::signals::{ExtractedFields, ValidationCfg};
use crypto_signal_bot::{Direction, RejectReason, SignalFactory};

fn factory() -> SignalFactory {
    SignalFactory::new(ValidationCfg {
        min_confidence: 0.75,
        min_risk_reward_ratio: 2.0,
        price_deviation_threshold: 0.05,
        timeframe_validation: true,
        allowed_timeframes: vec!["15m".into(), "1h".into(), "4h".into(), "1d".into()],
    })
}

fn fields(v: serde_json::Value) -> ExtractedFields {
    ExtractedFields::from_value(v).expect("object")
}

fn base() -> serde_json::Value {
    json!({
        "symbol": "BTC/USDT",
        "direction": "LONG",
        "entry_price": 50000,
        "stop_loss": 49000,
        "take_profit": [52000, 54000],
        "confidence": 0.85,
        "timeframe": "4h",
        "reasoning": "Breakout above range high on volume"
    })
}

fn with(key: &str, value: serde_json::Value) -> ExtractedFields {
    let mut v = base();
    v[key] = value;
    fields(v)
}

fn reject(f: &ExtractedFields) -> RejectReason {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    factory().build(f, "item", now).unwrap_err().reason
}

#[test]
fn well_formed_long_is_accepted() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let s = factory().build(&fields(base()), "1897", now).unwrap();
    assert_eq!(s.direction(), Direction::Long);
    assert_eq!(s.take_profit(), &[52_000.0, 54_000.0]);
    assert_eq!(s.reasoning(), "Breakout above range high on volume");
}

#[test]
fn each_missing_field_is_reported() {
    for key in [
        "symbol",
        "direction",
        "entry_price",
        "stop_loss",
        "take_profit",
        "confidence",
        "timeframe",
        "reasoning",
    ] {
        let mut v = base();
        v.as_object_mut().unwrap().remove(key);
        assert_eq!(reject(&fields(v)), RejectReason::MissingField, "{key}");
    }
}

#[test]
fn partial_candidate_is_incomplete() {
    let f = fields(json!({"symbol": "BTC/USDT", "direction": "LONG", "entry_price": 50000}));
    assert_eq!(reject(&f), RejectReason::MissingField);
}

#[test]
fn confidence_below_minimum() {
    assert_eq!(reject(&with("confidence", json!(0.5))), RejectReason::LowConfidence);
    // the minimum itself passes
    let now = Utc::now();
    assert!(factory()
        .build(&with("confidence", json!(0.75)), "x", now)
        .is_ok());
}

#[test]
fn stop_on_the_wrong_side() {
    assert_eq!(
        reject(&with("stop_loss", json!(50500))),
        RejectReason::InvalidPriceLevels
    );
    assert_eq!(
        reject(&with("take_profit", json!([49500, 54000]))),
        RejectReason::InvalidPriceLevels
    );
}

#[test]
fn inverted_long_levels() {
    // confidence passes, so ordering is the first failing check
    let mut v = base();
    v["stop_loss"] = json!(52000);
    v["take_profit"] = json!([48000, 46000]);
    assert_eq!(reject(&fields(v)), RejectReason::InvalidPriceLevels);
}

#[test]
fn stop_too_far_from_entry() {
    // 6% away with a 5% cap
    assert_eq!(
        reject(&with("stop_loss", json!(47000))),
        RejectReason::ExcessiveDeviation
    );
}

#[test]
fn nearest_target_decides_risk_reward() {
    // risk 1000, nearest reward 1500: 1.5 < 2.0 even though the far target is 5.0
    assert_eq!(
        reject(&with("take_profit", json!([51500, 55000]))),
        RejectReason::InsufficientRiskReward
    );
}

#[test]
fn unlisted_timeframe() {
    assert_eq!(reject(&with("timeframe", json!("5m"))), RejectReason::InvalidTimeframe);
    assert_eq!(
        reject(&with("timeframe", json!("invalid_timeframe"))),
        RejectReason::InvalidTimeframe
    );
}

#[test]
fn short_mirror_of_the_long_rules() {
    let mut v = base();
    v["direction"] = json!("SHORT");
    v["stop_loss"] = json!(51000);
    v["take_profit"] = json!([48000, 46000]);
    let now = Utc::now();
    let s = factory().build(&fields(v.clone()), "s1", now).unwrap();
    assert_eq!(s.direction(), Direction::Short);

    v["take_profit"] = json!([50500]);
    assert_eq!(reject(&fields(v)), RejectReason::InvalidPriceLevels);
}

#[test]
fn building_twice_gives_the_same_signal() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let f = fields(base());
    let a = factory().build(&f, "same", now).unwrap();
    let b = factory().build(&f, "same", now).unwrap();
    assert_eq!(a, b);

    let bad = with("confidence", json!(0.1));
    assert_eq!(
        factory().build(&bad, "same", now).unwrap_err(),
        factory().build(&bad, "same", now).unwrap_err()
    );
}
