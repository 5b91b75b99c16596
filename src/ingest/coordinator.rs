// src/ingest/coordinator.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::ingest::config::{PipelineConfig, MAX_DEADLINE_SECS};
use crate::ingest::ensure_metrics_described;
use crate::ingest::error::PipelineError;
use crate::ingest::fanout::{FanoutSettings, Orchestrator};
use crate::ingest::providers::http::HttpFeedClient;
use crate::ingest::sink::{ObjectStoreSink, SnapshotSink};
use crate::ingest::types::{AggregateResult, FeedApi, FeedCategory, RunResult, RunStatus};
use crate::ingest::writer::SnapshotWriter;

pub const SUCCESS_MESSAGE: &str = "Data extraction and upload successful!";
pub const FAILURE_MESSAGE: &str = "Data extraction failed!";

/// Runs every category pipeline and folds the outcomes into one
/// `AggregateResult`. Never panics and never returns an error.
#[derive(Clone)]
pub struct RunCoordinator {
    orchestrator: Orchestrator,
    writer: SnapshotWriter,
    category_concurrency: usize,
    deadline: Duration,
}

impl RunCoordinator {
    pub fn new(api: Arc<dyn FeedApi>, sink: Arc<dyn SnapshotSink>, settings: FanoutSettings) -> Self {
        Self {
            orchestrator: Orchestrator::new(api, settings),
            writer: SnapshotWriter::new(sink),
            category_concurrency: 1,
            deadline: Duration::from_secs(300),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_category_concurrency(mut self, n: usize) -> Self {
        self.category_concurrency = n.max(1);
        self
    }

    /// Wire the production HTTP client and storage sink from config.
    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let api = HttpFeedClient::new(&cfg.api_base, cfg.request_timeout())
            .context("building HTTP client")?;
        let sink = ObjectStoreSink::from_target(&cfg.storage_target)
            .context("opening snapshot storage")?;
        Ok(Self::with_parts(cfg, Arc::new(api), Arc::new(sink)))
    }

    /// Like `from_config`, with caller-supplied client and sink.
    pub fn with_parts(
        cfg: &PipelineConfig,
        api: Arc<dyn FeedApi>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self::new(api, sink, cfg.fanout())
            .with_deadline(cfg.deadline())
            .with_category_concurrency(cfg.category_concurrency)
    }

    pub async fn run(&self, categories: &[FeedCategory]) -> AggregateResult {
        ensure_metrics_described();
        let now = Instant::now();
        let deadline = now
            .checked_add(self.deadline)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_DEADLINE_SECS));
        let permits = Arc::new(Semaphore::new(self.category_concurrency));

        let mut seen = HashSet::new();
        let ordered: Vec<FeedCategory> = categories
            .iter()
            .filter(|c| {
                let first = seen.insert((*c).clone());
                if !first {
                    tracing::warn!(target: "ingest", category = %c, "duplicate category skipped");
                }
                first
            })
            .cloned()
            .collect();

        let mut tasks: JoinSet<RunResult> = JoinSet::new();
        let mut task_category = HashMap::new();
        for category in &ordered {
            let this = self.clone();
            let permits = permits.clone();
            let cat = category.clone();
            let handle = tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => return RunResult::failed(cat, PipelineError::Aborted(e.to_string())),
                };
                this.run_category(&cat, deadline).await
            });
            task_category.insert(handle.id(), category.clone());
        }

        let mut by_category: HashMap<FeedCategory, RunResult> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    by_category.insert(result.category.clone(), result);
                }
                Err(e) => {
                    if let Some(cat) = task_category.get(&e.id()) {
                        tracing::error!(target: "ingest", category = %cat, error = %e, "category task crashed");
                        counter!("snapshot_category_failures_total", "category" => cat.to_string())
                            .increment(1);
                        by_category.insert(
                            cat.clone(),
                            RunResult::failed(cat.clone(), PipelineError::Aborted(e.to_string())),
                        );
                    }
                }
            }
        }

        let results: Vec<RunResult> = ordered
            .into_iter()
            .map(|cat| {
                by_category.remove(&cat).unwrap_or_else(|| {
                    RunResult::failed(cat, PipelineError::Aborted("no result".into()))
                })
            })
            .collect();

        let aggregate = AggregateResult::from_results(results);
        gauge!("snapshot_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            success = aggregate.success,
            categories = aggregate.results.len(),
            failed = aggregate.results.iter().filter(|r| !r.is_success()).count(),
            "run finished"
        );
        aggregate
    }

    /// List → fetch → validate → write for one category.
    pub async fn run_category(&self, category: &FeedCategory, deadline: Instant) -> RunResult {
        let t0 = std::time::Instant::now();
        let (snapshot, mut result) = self.orchestrator.build_snapshot(category, deadline).await;

        if result.is_success() {
            match self.writer.write(&snapshot).await {
                Ok(key) => result.storage_key = Some(key),
                Err(e) => {
                    let e = PipelineError::from(e);
                    tracing::error!(target: "ingest", category = %category, error = %e, "snapshot write failed");
                    result.status = RunStatus::Failed;
                    result.error = Some(e.to_string());
                }
            }
        }

        histogram!("snapshot_category_duration_ms", "category" => category.to_string())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        if result.is_success() {
            tracing::info!(
                target: "ingest",
                category = %category,
                fetched = result.fetched,
                rejected = result.rejected,
                key = result.storage_key.as_deref().unwrap_or_default(),
                "category done"
            );
        } else {
            counter!("snapshot_category_failures_total", "category" => category.to_string())
                .increment(1);
        }
        result
    }
}

/// Status/message pair handed back to whatever triggered the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub message: String,
}

impl InvocationResponse {
    pub fn success() -> Self {
        Self {
            status_code: 200,
            message: SUCCESS_MESSAGE.to_string(),
        }
    }

    pub fn failure() -> Self {
        Self {
            status_code: 500,
            message: FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<&AggregateResult> for InvocationResponse {
    fn from(agg: &AggregateResult) -> Self {
        if agg.success {
            Self::success()
        } else {
            Self::failure()
        }
    }
}

/// Entry point for the trigger layer: one full run with `cfg`.
pub async fn invoke(cfg: &PipelineConfig) -> InvocationResponse {
    match RunCoordinator::from_config(cfg) {
        Ok(coordinator) => {
            let aggregate = coordinator.run(&cfg.categories).await;
            InvocationResponse::from(&aggregate)
        }
        Err(e) => {
            tracing::error!(target: "ingest", error = ?e, "pipeline setup failed");
            InvocationResponse::failure()
        }
    }
}
