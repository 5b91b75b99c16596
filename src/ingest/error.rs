// src/ingest/error.rs
use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport failure (DNS, connect, timeout) or non-2xx status.
    #[error("fetch {endpoint} failed: {cause}")]
    Fetch { endpoint: String, cause: String },
    /// Body arrived but is not valid JSON of the expected shape.
    #[error("decode {endpoint} failed: {cause}")]
    Decode { endpoint: String, cause: String },
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Fetch { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("snapshot key {key} already exists")]
    AlreadyExists { key: String },
    #[error("storage write to {key} failed: {cause}")]
    Backend { key: String, cause: String },
    #[error("serializing snapshot failed: {0}")]
    Serialize(String),
    #[error("invalid storage target {target:?}: {cause}")]
    Target { target: String, cause: String },
}

/// Category-level failures. Every variant ends in a failed `RunResult`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("listing {category} failed after {attempts} attempt(s): {source}")]
    Listing {
        category: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },
    #[error("run deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("category task aborted: {0}")]
    Aborted(String),
}
