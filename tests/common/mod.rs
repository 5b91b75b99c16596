// tests/common/mod.rs
// Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use feed_snapshot::ingest::error::{ClientError, StorageError};
use feed_snapshot::ingest::sink::SnapshotSink;
use feed_snapshot::ingest::{FeedApi, FeedCategory, ItemId, RawItem};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Clone)]
pub enum Listing {
    Ids(Vec<ItemId>),
    /// Every call fails like an HTTP 500.
    Http500,
    /// The listing call panics.
    Panic,
}

#[derive(Clone)]
pub enum ItemReply {
    Json(Value),
    /// Every call fails like an HTTP 500.
    Http500,
    /// First `n` calls fail, then `Json`.
    FlakyThen(u32, Value),
    /// Body is not JSON.
    Garbage,
}

/// In-process `FeedApi` with scripted replies and optional per-item latency.
#[derive(Default)]
pub struct FakeFeed {
    listings: HashMap<String, Listing>,
    items: HashMap<ItemId, ItemReply>,
    delays: HashMap<ItemId, Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(mut self, category: &str, listing: Listing) -> Self {
        self.listings.insert(category.to_string(), listing);
        self
    }

    pub fn item(mut self, id: ItemId, reply: ItemReply) -> Self {
        self.items.insert(id, reply);
        self
    }

    pub fn story(self, id: ItemId) -> Self {
        self.item(id, ItemReply::Json(story_json(id)))
    }

    pub fn delay(mut self, id: ItemId, d: Duration) -> Self {
        self.delays.insert(id, d);
        self
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == endpoint).count()
    }
}

pub fn story_json(id: ItemId) -> Value {
    json!({
        "type": "story",
        "id": id,
        "title": format!("Story {id}"),
        "url": format!("https://example.test/{id}"),
        "score": id * 10,
        "time": 1_700_000_000 + id as i64,
        "by": "alice",
        "descendants": 3,
        "kids": [id * 100]
    })
}

fn http_500(endpoint: &str) -> ClientError {
    ClientError::Fetch {
        endpoint: endpoint.to_string(),
        cause: "HTTP 500 Internal Server Error".to_string(),
    }
}

#[async_trait]
impl FeedApi for FakeFeed {
    async fn list_identifiers(&self, category: &FeedCategory) -> Result<Vec<ItemId>, ClientError> {
        let endpoint = category.to_string();
        self.calls.lock().push(endpoint.clone());
        match self.listings.get(category.as_str()) {
            Some(Listing::Ids(ids)) => Ok(ids.clone()),
            Some(Listing::Http500) | None => Err(http_500(&endpoint)),
            Some(Listing::Panic) => panic!("listing {endpoint} blew up"),
        }
    }

    async fn fetch_item(&self, id: ItemId) -> Result<RawItem, ClientError> {
        let endpoint = format!("item/{id}");
        let previous = {
            let mut calls = self.calls.lock();
            let n = calls.iter().filter(|c| **c == endpoint).count() as u32;
            calls.push(endpoint.clone());
            n
        };
        if let Some(d) = self.delays.get(&id) {
            tokio::time::sleep(*d).await;
        }
        match self.items.get(&id) {
            Some(ItemReply::Json(v)) => Ok(RawItem::from_value(v.clone())),
            Some(ItemReply::FlakyThen(n, v)) if previous >= *n => Ok(RawItem::from_value(v.clone())),
            Some(ItemReply::FlakyThen(..)) | Some(ItemReply::Http500) => Err(http_500(&endpoint)),
            Some(ItemReply::Garbage) => Err(ClientError::Decode {
                endpoint,
                cause: "expected value at line 1 column 1".to_string(),
            }),
            None => Ok(RawItem::from_value(Value::Null)),
        }
    }
}

/// Sink whose writes always fail.
pub struct BrokenSink;

#[async_trait]
impl SnapshotSink for BrokenSink {
    async fn put_new(&self, key: &str, _body: Bytes) -> Result<(), StorageError> {
        Err(StorageError::Backend {
            key: key.to_string(),
            cause: "permission denied".to_string(),
        })
    }

    fn describe(&self) -> String {
        "broken://".to_string()
    }
}

/// Sink that records writes in memory and fails for chosen categories.
#[derive(Default)]
pub struct RecordingSink {
    pub writes: Mutex<Vec<(String, Bytes)>>,
    pub fail_prefixes: Vec<String>,
}

impl RecordingSink {
    pub fn failing_for(categories: &[&str]) -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail_prefixes: categories
                .iter()
                .map(|c| format!("processed/{c}/"))
                .collect(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.writes.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn body_json(&self, key: &str) -> Option<Value> {
        self.writes
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, b)| serde_json::from_slice(b).ok())
    }
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn put_new(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        if self.fail_prefixes.iter().any(|p| key.starts_with(p)) {
            return Err(StorageError::Backend {
                key: key.to_string(),
                cause: "storage unavailable".to_string(),
            });
        }
        let mut writes = self.writes.lock();
        if writes.iter().any(|(k, _)| k == key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        writes.push((key.to_string(), body));
        Ok(())
    }

    fn describe(&self) -> String {
        "recording://".to_string()
    }
}

pub fn cat(name: &str) -> FeedCategory {
    FeedCategory::parse(name).expect("valid category")
}

/// Local HTTP server shaped like the remote feed API, rooted at `/v0`:
/// * `topstories`: `[3, 1, 2, 4]`
/// * `newstories`: HTTP 500
/// * `beststories`: 200 with a non-JSON body
/// * `item/1`: story, `item/2`: comment, `item/3`: `null`, `item/4`: HTTP 503
///
/// Returns the base URL and a counter of requests served.
pub async fn spawn_fake_api() -> (String, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Hits = Arc<AtomicUsize>;

    async fn top(State(hits): State<Hits>) -> impl IntoResponse {
        hits.fetch_add(1, Ordering::SeqCst);
        Json(json!([3, 1, 2, 4]))
    }
    async fn new(State(hits): State<Hits>) -> impl IntoResponse {
        hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }
    async fn best(State(hits): State<Hits>) -> impl IntoResponse {
        hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::OK, "<html>not json</html>")
    }
    async fn item(State(hits): State<Hits>, Path(file): Path<String>) -> axum::response::Response {
        hits.fetch_add(1, Ordering::SeqCst);
        match file.as_str() {
            "1.json" => Json(story_json(1)).into_response(),
            "2.json" => Json(json!({"type": "comment", "id": 2, "parent": 1})).into_response(),
            "3.json" => Json(Value::Null).into_response(),
            "4.json" => (StatusCode::SERVICE_UNAVAILABLE, "slow down").into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    let hits: Hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/v0/topstories.json", get(top))
        .route("/v0/newstories.json", get(new))
        .route("/v0/beststories.json", get(best))
        .route("/v0/item/{file}", get(item))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake api");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v0"), hits)
}
