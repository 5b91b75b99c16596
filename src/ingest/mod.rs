// src/ingest/mod.rs
//! Fetch → validate → persist pipeline for content-feed snapshots.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod providers;
pub mod retry;
pub mod sink;
pub mod types;
pub mod validate;
pub mod writer;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use coordinator::{invoke, InvocationResponse, RunCoordinator};
pub use types::{AggregateResult, FeedApi, FeedCategory, ItemId, RawItem, RunResult, Snapshot, ValidatedStory};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "snapshot_items_fetched_total",
            "Stories accepted into a snapshot."
        );
        describe_counter!(
            "snapshot_items_rejected_total",
            "Items excluded from a snapshot (non-story, malformed, fetch failure, deadline)."
        );
        describe_counter!(
            "snapshot_fetch_retries_total",
            "Remote calls retried after a transport/HTTP failure."
        );
        describe_counter!("snapshot_writes_total", "Snapshots persisted to storage.");
        describe_counter!(
            "snapshot_category_failures_total",
            "Categories that ended without a stored snapshot."
        );
        describe_histogram!(
            "snapshot_category_duration_ms",
            "Wall time of one category pipeline in milliseconds."
        );
        describe_histogram!("snapshot_http_get_ms", "Remote GET latency in milliseconds.");
        describe_gauge!("snapshot_last_run_ts", "Unix ts when the last run finished.");
    });
}
