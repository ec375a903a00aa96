// tests/config_load.rs
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

use crypto_signal_bot::config::ENV_CONFIG_PATH;
use crypto_signal_bot::ingest::SourceId;
use crypto_signal_bot::{BotConfig, ConfigError};

const FULL: &str = r#"
metrics_addr = "127.0.0.1:9000"

[scheduler]
rate_limit_window_secs = 900
max_requests_per_window = 15
poll_interval_secs = 60
backfill_secs = 600
max_results = 20
queue_capacity = 64
backpressure_timeout_ms = 250

[dedup]
retention_secs = 86400
capacity = 5000

[signals]
min_confidence = 0.8
min_risk_reward_ratio = 2.5
price_deviation_threshold = 0.03
timeframe_validation = false
allowed_timeframes = []

[[sources]]
id = "44196397"
username = "trader_one"

[[sources]]
id = "2244994945"
username = "trader_two"
"#;

fn write_tmp(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tmp file");
    f.write_all(content.as_bytes()).expect("write tmp");
    f
}

#[test]
#[serial]
fn loads_from_env_path() {
    let f = write_tmp(FULL);
    std::env::set_var(ENV_CONFIG_PATH, f.path());

    let cfg = BotConfig::load_default().unwrap();
    std::env::remove_var(ENV_CONFIG_PATH);

    assert_eq!(cfg.metrics_addr.as_deref(), Some("127.0.0.1:9000"));
    assert_eq!(
        cfg.active_sources(),
        vec![SourceId::from("44196397"), SourceId::from("2244994945")]
    );

    let sched = cfg.scheduler_cfg();
    assert_eq!(sched.backfill, Duration::from_secs(600));
    assert_eq!(sched.max_results, 20);
    assert_eq!(sched.backpressure_timeout, Duration::from_millis(250));

    let limiter = cfg.rate_limiter();
    assert_eq!(limiter.max_requests(), 15);
    assert_eq!(limiter.window(), Duration::from_secs(900));

    assert_eq!(cfg.signals.min_risk_reward_ratio, 2.5);
    assert!(!cfg.signals.timeframe_validation);
}

#[test]
#[serial]
fn missing_file_is_a_read_error() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/bot.toml");
    let err = BotConfig::load_default().unwrap_err();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn out_of_range_confidence_is_invalid() {
    let broken = FULL.replace("min_confidence = 0.8", "min_confidence = 1.5");
    let f = write_tmp(&broken);
    assert!(matches!(
        BotConfig::load_from(f.path()),
        Err(ConfigError::Invalid {
            field: "min_confidence",
            ..
        })
    ));
}

#[test]
fn empty_timeframes_need_validation_off() {
    let broken = FULL.replace("timeframe_validation = false", "timeframe_validation = true");
    assert!(matches!(
        BotConfig::from_toml_str(&broken),
        Err(ConfigError::Invalid {
            field: "allowed_timeframes",
            ..
        })
    ));
}

#[test]
fn shipped_example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/bot.toml");
    let cfg = BotConfig::load_from(&path).unwrap();
    assert!(!cfg.active_sources().is_empty());
}
