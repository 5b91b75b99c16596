// src/ingest/writer.rs
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::ingest::error::StorageError;
use crate::ingest::sink::SnapshotSink;
use crate::ingest::types::{FeedCategory, Snapshot};

pub const KEY_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// `processed/<category>/<YYYY-MM-DD-HH-MM-SS>.json`, capture time in UTC.
pub fn snapshot_key(category: &FeedCategory, captured_at: DateTime<Utc>) -> String {
    format!(
        "processed/{}/{}.json",
        category,
        captured_at.format(KEY_TIME_FORMAT)
    )
}

/// Pretty-printed JSON array of the snapshot's stories.
pub fn encode(snapshot: &Snapshot) -> Result<Bytes, StorageError> {
    serde_json::to_vec_pretty(&snapshot.items)
        .map(Bytes::from)
        .map_err(|e| StorageError::Serialize(e.to_string()))
}

#[derive(Clone)]
pub struct SnapshotWriter {
    sink: Arc<dyn SnapshotSink>,
}

impl SnapshotWriter {
    pub fn new(sink: Arc<dyn SnapshotSink>) -> Self {
        Self { sink }
    }

    /// Persist once; returns the key written. No retry here.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError> {
        let key = snapshot_key(&snapshot.category, snapshot.captured_at);
        let body = encode(snapshot)?;
        let bytes = body.len();

        self.sink.put_new(&key, body).await?;

        counter!("snapshot_writes_total", "category" => snapshot.category.to_string()).increment(1);
        tracing::info!(
            target: "ingest",
            category = %snapshot.category,
            key = %key,
            items = snapshot.items.len(),
            bytes,
            sink = %self.sink.describe(),
            "snapshot written"
        );
        Ok(key)
    }
}
