use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ingest::error::ClientError;
use crate::ingest::types::{FeedApi, FeedCategory, ItemId, RawItem};

pub const DEFAULT_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

/// `FeedApi` over plain HTTP GETs to `<base>/<endpoint>.json`.
#[derive(Clone)]
pub struct HttpFeedClient {
    base: String,
    client: Client,
}

impl HttpFeedClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("feed-snapshot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(4)))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(base, client))
    }

    /// Reuse an already configured client (shared connection pool, custom TLS, ...).
    pub fn with_client(base: &str, client: Client) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}.json", self.base, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        let t0 = std::time::Instant::now();
        let fetch_err = |cause: String| ClientError::Fetch {
            endpoint: endpoint.to_string(),
            cause,
        };

        let resp = self
            .client
            .get(self.endpoint_url(endpoint))
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }

        // Reading the body can still hit a transport failure; only what we
        // actually received is subject to decoding.
        let body = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        histogram!("snapshot_http_get_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            endpoint: endpoint.to_string(),
            cause: e.to_string(),
        })
    }
}

#[async_trait]
impl FeedApi for HttpFeedClient {
    async fn list_identifiers(&self, category: &FeedCategory) -> Result<Vec<ItemId>, ClientError> {
        self.get_json(category.as_str()).await
    }

    async fn fetch_item(&self, id: ItemId) -> Result<RawItem, ClientError> {
        let value: Value = self.get_json(&format!("item/{id}")).await?;
        Ok(RawItem::from_value(value))
    }
}
