// src/ingest/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::error::ClientError;

/// Handle returned by a feed-listing endpoint.
pub type ItemId = u64;

/// Name of one listing endpoint (e.g. `topstories`). Doubles as the storage
/// partition, so it is restricted to `[a-z][a-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeedCategory(String);

impl FeedCategory {
    pub fn parse(name: &str) -> Result<Self, InvalidCategory> {
        static RE_NAME: OnceCell<regex::Regex> = OnceCell::new();
        let re = RE_NAME.get_or_init(|| regex::Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
        let name = name.trim();
        if re.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(InvalidCategory(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FeedCategory {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        FeedCategory::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid feed category {0:?}: expected lowercase [a-z][a-z0-9_]*")]
pub struct InvalidCategory(pub String);

/// Typed view of the fields we keep from a story record. Unknown attributes are
/// ignored by serde; a known attribute with the wrong JSON type fails decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoryPayload {
    pub id: Option<ItemId>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub time: Option<i64>,
    pub by: Option<String>,
    pub descendants: Option<i64>,
}

/// One item as returned by the remote API, classified by content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawItem {
    Story(StoryPayload),
    /// Comment, job, poll, ... or a record without a type attribute.
    NonStory { kind: Option<String> },
    Malformed { reason: String },
}

impl RawItem {
    pub fn from_value(value: Value) -> Self {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => {
                return RawItem::Malformed {
                    reason: "item is null".to_string(),
                }
            }
            other => {
                return RawItem::Malformed {
                    reason: format!("expected JSON object, got {}", json_kind(&other)),
                }
            }
        };

        let kind = obj.get("type").and_then(Value::as_str).map(str::to_string);
        if kind.as_deref() != Some("story") {
            return RawItem::NonStory { kind };
        }

        match serde_json::from_value::<StoryPayload>(Value::Object(obj)) {
            Ok(story) => RawItem::Story(story),
            Err(e) => RawItem::Malformed {
                reason: format!("story fields: {e}"),
            },
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Canonical output record. Every field is always serialized; unknown values
/// are written as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedStory {
    pub id: ItemId,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub time: Option<i64>,
    pub time_readable: Option<String>,
    pub by: Option<String>,
    pub descendants: Option<i64>,
}

/// Validated records for one category at one capture instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub category: FeedCategory,
    pub captured_at: DateTime<Utc>,
    pub items: Vec<ValidatedStory>,
}

impl Snapshot {
    pub fn empty(category: FeedCategory, captured_at: DateTime<Utc>) -> Self {
        Self {
            category,
            captured_at,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Outcome of one category pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub category: FeedCategory,
    pub status: RunStatus,
    /// Items accepted into the snapshot.
    pub fetched: usize,
    /// Items excluded: non-story, malformed, fetch/decode failure or deadline.
    pub rejected: usize,
    pub storage_key: Option<String>,
    pub error: Option<String>,
}

impl RunResult {
    pub fn succeeded(category: FeedCategory, fetched: usize, rejected: usize) -> Self {
        Self {
            category,
            status: RunStatus::Succeeded,
            fetched,
            rejected,
            storage_key: None,
            error: None,
        }
    }

    pub fn failed(category: FeedCategory, error: impl fmt::Display) -> Self {
        Self {
            category,
            status: RunStatus::Failed,
            fetched: 0,
            rejected: 0,
            storage_key: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Summary of one run across all configured categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub success: bool,
    pub results: Vec<RunResult>,
}

impl AggregateResult {
    pub fn from_results(results: Vec<RunResult>) -> Self {
        let success = results.iter().all(RunResult::is_success);
        Self { success, results }
    }

    pub fn result_for(&self, category: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.category.as_str() == category)
    }
}

/// Remote feed API. One GET per call; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait FeedApi: Send + Sync {
    async fn list_identifiers(&self, category: &FeedCategory) -> Result<Vec<ItemId>, ClientError>;
    async fn fetch_item(&self, id: ItemId) -> Result<RawItem, ClientError>;
}
