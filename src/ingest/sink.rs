// src/ingest/sink.rs
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::ingest::error::StorageError;

/// Durable, write-once destination for snapshot artifacts.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Store `body` under `key`. Must fail with `AlreadyExists` instead of
    /// replacing an existing object.
    async fn put_new(&self, key: &str, body: Bytes) -> Result<(), StorageError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// `SnapshotSink` backed by any `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
    target: String,
}

impl std::fmt::Debug for ObjectStoreSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectStoreSink<{}>", self.target)
    }
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Option<Path>, target: impl Into<String>) -> Self {
        Self {
            store,
            prefix,
            target: target.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), None, "memory://")
    }

    /// Build a sink from a storage target:
    /// * `s3://bucket[/prefix]` (credentials and region from the AWS environment)
    /// * `file:///path` or a bare path (local directory, created if missing)
    /// * `memory://` (process-local)
    pub fn from_target(target: &str) -> Result<Self, StorageError> {
        let target = target.trim();
        let invalid = |cause: String| StorageError::Target {
            target: target.to_string(),
            cause,
        };

        if target.is_empty() {
            return Err(invalid("empty target".into()));
        }

        if target == "memory://" || target == "memory" {
            return Ok(Self::in_memory());
        }

        if let Some(rest) = target.strip_prefix("s3://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((b, p)) => (b, p.trim_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(invalid("missing bucket name".into()));
            }
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| invalid(e.to_string()))?;
            let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
            return Ok(Self::new(Arc::new(store), prefix, target));
        }

        let dir = match target.strip_prefix("file://") {
            Some(p) => p,
            None if target.contains("://") => return Err(invalid("unsupported scheme".into())),
            None => target,
        };
        std::fs::create_dir_all(dir).map_err(|e| invalid(e.to_string()))?;
        let store = LocalFileSystem::new_with_prefix(dir).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::new(Arc::new(store), None, target))
    }

    /// Underlying store, for reading artifacts back.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn qualify(&self, key: &str) -> Path {
        let key = Path::from(key);
        match &self.prefix {
            Some(prefix) => prefix.parts().chain(key.parts()).collect(),
            None => key,
        }
    }
}

#[async_trait]
impl SnapshotSink for ObjectStoreSink {
    async fn put_new(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let path = self.qualify(key);
        let opts = PutOptions::from(PutMode::Create);
        match self.store.put_opts(&path, PutPayload::from(body), opts).await {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => Err(StorageError::AlreadyExists {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Backend {
                key: key.to_string(),
                cause: e.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}
