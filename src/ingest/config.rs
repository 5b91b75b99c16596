// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::fanout::FanoutSettings;
use crate::ingest::providers::http::DEFAULT_API_BASE;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::types::FeedCategory;

pub const ENV_CONFIG_PATH: &str = "SNAPSHOT_CONFIG_PATH";

/// Upper bound for `deadline_secs` and `request_timeout_secs` (one day).
pub const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

fn default_storage_target() -> String {
    "file://./data".to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_categories() -> Vec<FeedCategory> {
    ["topstories", "newstories", "beststories"]
        .iter()
        .filter_map(|c| FeedCategory::parse(c).ok())
        .collect()
}
fn default_item_limit() -> usize {
    10
}
fn default_concurrency() -> usize {
    8
}
fn default_category_concurrency() -> usize {
    1
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_deadline_secs() -> u64 {
    300
}

/// Everything one run needs. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// `s3://bucket[/prefix]`, `file:///dir`, bare dir, or `memory://`.
    #[serde(default = "default_storage_target")]
    pub storage_target: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_categories")]
    pub categories: Vec<FeedCategory>,
    #[serde(default = "default_item_limit")]
    pub item_limit: usize,
    /// Max item fetches in flight per category.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Max categories processed at once; 1 keeps them sequential.
    #[serde(default = "default_category_concurrency")]
    pub category_concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Overall run deadline.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_target: default_storage_target(),
            api_base: default_api_base(),
            categories: default_categories(),
            item_limit: default_item_limit(),
            concurrency: default_concurrency(),
            category_concurrency: default_category_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn fanout(&self) -> FanoutSettings {
        FanoutSettings {
            limit: self.item_limit,
            concurrency: self.concurrency,
            retry: self.retry_policy(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Clamp values that would stall or disable the pipeline.
    pub fn sanitized(mut self) -> Self {
        self.item_limit = self.item_limit.max(1);
        self.concurrency = self.concurrency.max(1);
        self.category_concurrency = self.category_concurrency.max(1);
        self.retry_attempts = self.retry_attempts.max(1);
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, MAX_DEADLINE_SECS);
        self.deadline_secs = self.deadline_secs.clamp(1, MAX_DEADLINE_SECS);
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        if self.api_base.is_empty() {
            self.api_base = default_api_base();
        }
        let mut seen = std::collections::HashSet::new();
        self.categories.retain(|c| seen.insert(c.clone()));
        self
    }

    /// Apply overrides from the environment variables named in `env_keys`.
    /// Every field has a key; `sanitized` clamps the values afterwards.
    pub fn apply_env(mut self) -> Result<Self> {
        self.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(self)
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> Result<()> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(t) = get(env_keys::STORAGE_TARGET) {
            self.storage_target = t;
        } else if let Some(bucket) = get(env_keys::BUCKET_NAME) {
            self.storage_target = format!("s3://{bucket}");
        }
        if let Some(base) = get(env_keys::API_BASE) {
            self.api_base = base;
        }
        if let Some(list) = get(env_keys::CATEGORIES) {
            self.categories = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(FeedCategory::parse)
                .collect::<Result<_, _>>()
                .with_context(|| format!("parsing {}", env_keys::CATEGORIES))?;
        }
        set_parsed(&mut self.item_limit, get(env_keys::ITEM_LIMIT), env_keys::ITEM_LIMIT)?;
        set_parsed(&mut self.concurrency, get(env_keys::CONCURRENCY), env_keys::CONCURRENCY)?;
        set_parsed(
            &mut self.retry_attempts,
            get(env_keys::RETRY_ATTEMPTS),
            env_keys::RETRY_ATTEMPTS,
        )?;
        set_parsed(
            &mut self.retry_base_delay_ms,
            get(env_keys::RETRY_BASE_DELAY_MS),
            env_keys::RETRY_BASE_DELAY_MS,
        )?;
        set_parsed(
            &mut self.category_concurrency,
            get(env_keys::CATEGORY_CONCURRENCY),
            env_keys::CATEGORY_CONCURRENCY,
        )?;
        set_parsed(
            &mut self.request_timeout_secs,
            get(env_keys::REQUEST_TIMEOUT_SECS),
            env_keys::REQUEST_TIMEOUT_SECS,
        )?;
        set_parsed(
            &mut self.deadline_secs,
            get(env_keys::DEADLINE_SECS),
            env_keys::DEADLINE_SECS,
        )?;
        Ok(())
    }
}

pub mod env_keys {
    pub const STORAGE_TARGET: &str = "STORAGE_TARGET";
    pub const BUCKET_NAME: &str = "BUCKET_NAME";
    pub const API_BASE: &str = "FEED_API_BASE";
    pub const CATEGORIES: &str = "FEED_CATEGORIES";
    pub const ITEM_LIMIT: &str = "ITEM_LIMIT";
    pub const CONCURRENCY: &str = "FETCH_CONCURRENCY";
    pub const RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
    pub const RETRY_BASE_DELAY_MS: &str = "RETRY_BASE_DELAY_MS";
    pub const CATEGORY_CONCURRENCY: &str = "CATEGORY_CONCURRENCY";
    pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
    pub const DEADLINE_SECS: &str = "RUN_DEADLINE_SECS";
}

fn set_parsed<T: FromStr>(slot: &mut T, raw: Option<String>, key: &str) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}"))?;
    }
    Ok(())
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing pipeline config {}", path.display()))
}

/// Resolve the config file, then apply env overrides:
/// 1) $SNAPSHOT_CONFIG_PATH
/// 2) config/pipeline.toml
/// 3) config/pipeline.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<PipelineConfig> {
    let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_config_from(&pb)?
    } else if Path::new("config/pipeline.toml").exists() {
        load_config_from(Path::new("config/pipeline.toml"))?
    } else if Path::new("config/pipeline.json").exists() {
        load_config_from(Path::new("config/pipeline.json"))?
    } else {
        PipelineConfig::default()
    };
    Ok(base.apply_env()?.sanitized())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    // Try the hinted format first, then the other one.
    let json_first = hint_ext == "json" || (hint_ext != "toml" && s.trim_start().starts_with('{'));
    if json_first {
        parse_json(s).or_else(|e| parse_toml(s).map_err(|_| e))
    } else {
        parse_toml(s).or_else(|e| parse_json(s).map_err(|_| e))
    }
}

fn parse_toml(s: &str) -> Result<PipelineConfig> {
    Ok(toml::from_str(s)?)
}

fn parse_json(s: &str) -> Result<PipelineConfig> {
    Ok(serde_json::from_str(s)?)
}
