// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;

/// Stable id of a monitored account/feed (e.g. a Twitter user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    Other,
}

impl MediaKind {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "photo" => Self::Photo,
            "video" => Self::Video,
            "animated_gif" => Self::AnimatedGif,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: Option<String>,
    pub preview_url: Option<String>,
}

/// One post as fetched from a source. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub source: SourceId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
}

impl RawItem {
    /// First attached media with a usable URL, if any.
    pub fn primary_media(&self) -> Option<&MediaRef> {
        self.media
            .iter()
            .find(|m| m.url.is_some() || m.preview_url.is_some())
    }
}

/// Content source collaborator.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Items of `source` created strictly after `since`, at most `max_results`.
    async fn fetch_since(
        &self,
        source: &SourceId,
        since: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawItem>, FetchError>;

    /// Startup reachability check. Default: nothing to check.
    async fn probe(&self, _source: &SourceId) -> Result<(), FetchError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
