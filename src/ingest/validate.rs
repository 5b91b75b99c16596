// src/ingest/validate.rs
use chrono::DateTime;

use crate::ingest::types::{RawItem, ValidatedStory};

pub const READABLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a fetched record was excluded from a snapshot. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("not-a-story")]
    NotAStory { kind: Option<String> },
    #[error("malformed: {reason}")]
    Malformed { reason: String },
    #[error("missing-id")]
    MissingId,
}

impl Rejection {
    /// Short label used for logs and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NotAStory { .. } => "not-a-story",
            Rejection::Malformed { .. } => "malformed",
            Rejection::MissingId => "missing-id",
        }
    }
}

/// Project a raw record onto the fixed story schema.
pub fn validate(raw: RawItem) -> Result<ValidatedStory, Rejection> {
    let story = match raw {
        RawItem::Story(s) => s,
        RawItem::NonStory { kind } => return Err(Rejection::NotAStory { kind }),
        RawItem::Malformed { reason } => return Err(Rejection::Malformed { reason }),
    };
    let id = story.id.ok_or(Rejection::MissingId)?;

    Ok(ValidatedStory {
        id,
        title: story.title,
        url: story.url,
        score: story.score,
        time: story.time,
        time_readable: story.time.and_then(readable_utc),
        by: story.by,
        descendants: story.descendants,
    })
}

/// `YYYY-MM-DD HH:MM:SS` in UTC; `None` when outside chrono's range.
pub fn readable_utc(unix: i64) -> Option<String> {
    DateTime::from_timestamp(unix, 0).map(|dt| dt.format(READABLE_TIME_FORMAT).to_string())
}
