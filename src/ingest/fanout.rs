// src/ingest/fanout.rs
//! Per-category fan-out: list ids, fetch + validate a bounded prefix of them
//! concurrently, and assemble the snapshot in listing order.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::ingest::error::PipelineError;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::types::{FeedApi, FeedCategory, ItemId, RunResult, Snapshot, ValidatedStory};
use crate::ingest::validate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutSettings {
    /// Max ids taken from the head of the listing.
    pub limit: usize,
    /// Max item fetches in flight at once.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            limit: 10,
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Accepted(ValidatedStory),
    Rejected(&'static str),
}

#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn FeedApi>,
    settings: FanoutSettings,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn FeedApi>, settings: FanoutSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &FanoutSettings {
        &self.settings
    }

    /// Build the snapshot for one category. A listing failure yields an empty
    /// snapshot and a failed result; item failures only bump `rejected`.
    pub async fn build_snapshot(
        &self,
        category: &FeedCategory,
        deadline: Instant,
    ) -> (Snapshot, RunResult) {
        let ids = match self.list(category, deadline).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(target: "ingest", category = %category, error = %e, "listing failed");
                return (
                    Snapshot::empty(category.clone(), Utc::now()),
                    RunResult::failed(category.clone(), e),
                );
            }
        };

        let captured_at = Utc::now();
        let outcomes = self.fetch_all(category, &ids, deadline).await;

        let mut items = Vec::with_capacity(outcomes.len());
        let mut rejected = 0usize;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Accepted(story) => items.push(story),
                ItemOutcome::Rejected(reason) => {
                    rejected += 1;
                    counter!(
                        "snapshot_items_rejected_total",
                        "category" => category.to_string(),
                        "reason" => reason
                    )
                    .increment(1);
                }
            }
        }

        counter!("snapshot_items_fetched_total", "category" => category.to_string())
            .increment(items.len() as u64);

        let result = RunResult::succeeded(category.clone(), items.len(), rejected);
        let snapshot = Snapshot {
            category: category.clone(),
            captured_at,
            items,
        };
        (snapshot, result)
    }

    async fn list(
        &self,
        category: &FeedCategory,
        deadline: Instant,
    ) -> Result<Vec<ItemId>, PipelineError> {
        let api = &self.api;
        let listing = self
            .settings
            .retry
            .run(category.as_str(), || api.list_identifiers(category));

        let mut ids = match timeout_at(deadline, listing).await {
            Err(_elapsed) => return Err(PipelineError::DeadlineExceeded),
            Ok(Err(failure)) => {
                return Err(PipelineError::Listing {
                    category: category.to_string(),
                    attempts: failure.attempts,
                    source: failure.error,
                })
            }
            Ok(Ok(ids)) => ids,
        };

        let listed = ids.len();
        ids.truncate(self.settings.limit);
        tracing::debug!(target: "ingest", category = %category, listed, kept = ids.len(), "listing fetched");
        Ok(ids)
    }

    /// Outcomes come back indexed like `ids`, whatever order fetches finish in.
    async fn fetch_all(
        &self,
        category: &FeedCategory,
        ids: &[ItemId],
        deadline: Instant,
    ) -> Vec<ItemOutcome> {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks: JoinSet<(usize, ItemOutcome)> = JoinSet::new();

        for (idx, &id) in ids.iter().enumerate() {
            let api = self.api.clone();
            let permits = permits.clone();
            let retry = self.settings.retry;
            let category = category.clone();

            tasks.spawn(async move {
                let fetch = async {
                    let _permit = match permits.acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => return ItemOutcome::Rejected("pool-closed"),
                    };
                    let endpoint = format!("item/{id}");
                    match retry.run(&endpoint, || api.fetch_item(id)).await {
                        Ok(raw) => match validate(raw) {
                            Ok(story) => ItemOutcome::Accepted(story),
                            Err(rejection) => {
                                tracing::debug!(
                                    target: "ingest",
                                    category = %category,
                                    item_id = id,
                                    reason = rejection.reason(),
                                    "item rejected"
                                );
                                ItemOutcome::Rejected(rejection.reason())
                            }
                        },
                        Err(failure) => {
                            tracing::warn!(
                                target: "ingest",
                                category = %category,
                                item_id = id,
                                attempts = failure.attempts,
                                error = %failure.error,
                                "item fetch failed"
                            );
                            ItemOutcome::Rejected(if failure.error.is_retryable() {
                                "fetch-error"
                            } else {
                                "decode-error"
                            })
                        }
                    }
                };

                let outcome = match timeout_at(deadline, fetch).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(target: "ingest", category = %category, item_id = id, "item abandoned at deadline");
                        ItemOutcome::Rejected("deadline-exceeded")
                    }
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<ItemOutcome>> = (0..ids.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => {
                    tracing::error!(target: "ingest", category = %category, error = %e, "item task failed");
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(ItemOutcome::Rejected("task-failed")))
            .collect()
    }
}
