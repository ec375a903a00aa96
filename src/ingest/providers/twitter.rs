// src/ingest/providers/twitter.rs
//! Twitter API v2 user timeline source.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ConfigError, FetchError};
use crate::ingest::normalize_text;
use crate::ingest::types::{MediaKind, MediaRef, RawItem, SourceId, SourceProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const ENV_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";

// the timeline endpoint only accepts 5..=100
const API_MIN_RESULTS: usize = 5;
const API_MAX_RESULTS: usize = 100;

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    data: Vec<Tweet>,
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

pub struct TwitterProvider {
    client: Client,
    base_url: String,
    bearer_token: String,
    timeout: Duration,
}

impl TwitterProvider {
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer_token: bearer_token.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Reads `TWITTER_BEARER_TOKEN`; a missing token is a startup error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var(ENV_BEARER_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(ENV_BEARER_TOKEN))?;
        Ok(Self::new(token))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .timeout(self.timeout)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(body)
    }
}

/// Parse a timeline page into items strictly newer than `since`, oldest first,
/// at most `max_results` of them.
pub(crate) fn parse_timeline(
    body: &str,
    source: &SourceId,
    since: DateTime<Utc>,
    max_results: usize,
) -> Result<Vec<RawItem>, FetchError> {
    let page: Timeline =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let media_by_key: HashMap<&str, &Media> = page
        .includes
        .as_ref()
        .map(|inc| inc.media.iter().map(|m| (m.media_key.as_str(), m)).collect())
        .unwrap_or_default();

    let mut out: Vec<RawItem> = page
        .data
        .iter()
        .filter_map(|tw| {
            // tweets without a timestamp cannot be placed against the cursor
            let created_at = tw.created_at?;
            if created_at <= since {
                return None;
            }
            let media = tw
                .attachments
                .as_ref()
                .map(|a| {
                    a.media_keys
                        .iter()
                        .filter_map(|k| media_by_key.get(k.as_str()))
                        .map(|m| MediaRef {
                            kind: MediaKind::parse(&m.kind),
                            url: m.url.clone(),
                            preview_url: m.preview_image_url.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(RawItem {
                id: tw.id.clone(),
                source: source.clone(),
                text: normalize_text(&tw.text),
                created_at,
                media,
            })
        })
        .collect();

    out.sort_by_key(|it| it.created_at);
    out.truncate(max_results);
    Ok(out)
}

#[async_trait]
impl SourceProvider for TwitterProvider {
    async fn fetch_since(
        &self,
        source: &SourceId,
        since: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawItem>, FetchError> {
        let url = format!("{}/2/users/{}/tweets", self.base_url, source);
        let query = [
            (
                "max_results",
                max_results
                    .clamp(API_MIN_RESULTS, API_MAX_RESULTS)
                    .to_string(),
            ),
            (
                "start_time",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("tweet.fields", "created_at,attachments".to_string()),
            ("expansions", "attachments.media_keys".to_string()),
            ("media.fields", "type,url,preview_image_url".to_string()),
        ];
        let body = self.get(&url, &query).await?;
        parse_timeline(&body, source, since, max_results)
    }

    async fn probe(&self, source: &SourceId) -> Result<(), FetchError> {
        let url = format!("{}/2/users/{}", self.base_url, source);
        self.get(&url, &[]).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "twitter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"{
        "data": [
            {"id": "3", "text": "SHORT &amp; sweet", "created_at": "2025-03-01T12:10:00.000Z"},
            {"id": "2", "text": "Long BTC", "created_at": "2025-03-01T12:05:00.000Z",
             "attachments": {"media_keys": ["3_9", "3_missing"]}},
            {"id": "1", "text": "old", "created_at": "2025-03-01T11:00:00.000Z"},
            {"id": "0", "text": "no timestamp"}
        ],
        "includes": {"media": [
            {"media_key": "3_9", "type": "photo", "url": "https://pbs.example/chart.png"}
        ]},
        "meta": {"result_count": 4}
    }"#;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn keeps_only_newer_items_oldest_first() {
        let src = SourceId::from("44196397");
        let items = parse_timeline(PAGE, &src, since(), 10).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(items[1].text, "SHORT & sweet");
        assert!(items.iter().all(|i| i.source == src));
    }

    #[test]
    fn joins_media_from_includes() {
        let items = parse_timeline(PAGE, &SourceId::from("1"), since(), 10).unwrap();
        let with_media = &items[0];
        assert_eq!(with_media.media.len(), 1);
        assert_eq!(with_media.media[0].kind, MediaKind::Photo);
        assert_eq!(
            with_media.primary_media().and_then(|m| m.url.as_deref()),
            Some("https://pbs.example/chart.png")
        );
    }

    #[test]
    fn truncation_keeps_the_oldest() {
        let items = parse_timeline(PAGE, &SourceId::from("1"), since(), 1).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");
    }

    #[test]
    fn empty_page_is_ok() {
        let body = r#"{"meta": {"result_count": 0}}"#;
        let items = parse_timeline(body, &SourceId::from("1"), since(), 10).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = parse_timeline("<html>", &SourceId::from("1"), since(), 10).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
