// src/ingest/mod.rs
pub mod dedup;
pub mod providers;
pub mod rate_limit;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use dedup::{Deduplicator, RecencyDeduplicator};
pub use rate_limit::{Acquire, RateLimiter};
pub use scheduler::{CycleReport, PollScheduler, SchedulerCfg, StopHandle};
pub use types::{MediaKind, MediaRef, RawItem, SourceId, SourceProvider};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetch_total", "Fetch calls made against sources.");
        describe_counter!(
            "ingest_fetch_errors_total",
            "Fetch calls that failed (transient, per source)."
        );
        describe_counter!(
            "ingest_items_delivered_total",
            "New items handed to the processing queue."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Items skipped because their id was already seen."
        );
        describe_counter!(
            "ingest_queue_dropped_total",
            "Items dropped because the processing queue stayed full."
        );
        describe_counter!("ingest_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "rate_limit_waits_total",
            "Acquires that had to wait for window capacity."
        );
        describe_histogram!("rate_limit_wait_ms", "Time spent waiting for capacity.");
        describe_histogram!("ingest_fetch_ms", "Fetch duration in milliseconds.");
        describe_gauge!("ingest_cursor_ts", "Unix ts of each source's cursor.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts when the last poll cycle ended.");
    });
}

/// Normalize post text: decode HTML entities, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    let out = re_ws.replace_all(&decoded, " ");
    let out = out.trim();

    // Length cap: 4000 chars (long-form posts)
    if out.chars().count() > 4_000 {
        out.chars().take(4_000).collect()
    } else {
        out.to_string()
    }
}
