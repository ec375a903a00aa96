// src/enrich.rs
//! Enrichment collaborator: maps a raw post to candidate fields.
//! How the fields are produced is the service's business; we only call it.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::ConfigError;
use crate::ingest::RawItem;
use crate::signals::ExtractedFields;

const ENV_ENRICH_URL: &str = "ENRICH_URL";

#[async_trait]
pub trait Enricher: Send + Sync {
    /// `Ok(None)` means "no candidate signal in this post", not an error.
    async fn enrich(&self, item: &RawItem) -> Result<Option<ExtractedFields>>;
    fn name(&self) -> &'static str;
}

/// POSTs the item as JSON and expects a JSON object of fields back.
#[derive(Clone)]
pub struct HttpEnricher {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl HttpEnricher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(ENV_ENRICH_URL)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(ENV_ENRICH_URL))?;
        Ok(Self::new(url))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

/// `204`-style empties, `null` and `{}` all mean "nothing found".
pub(crate) fn parse_enrichment(body: &str) -> Result<Option<ExtractedFields>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let v: serde_json::Value =
        serde_json::from_str(trimmed).context("enrichment response is not JSON")?;
    if v.is_null() {
        return Ok(None);
    }
    let fields = ExtractedFields::from_value(v)
        .ok_or_else(|| anyhow!("enrichment response is not a JSON object"))?;
    Ok((!fields.is_empty()).then_some(fields))
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, item: &RawItem) -> Result<Option<ExtractedFields>> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(item)
                .send()
                .await;

            let retryable = match res {
                Ok(resp) if resp.status() == StatusCode::NO_CONTENT => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.text().await.context("enrichment body")?;
                    return parse_enrichment(&body);
                }
                Ok(resp) if resp.status().is_server_error() => {
                    anyhow!("enrichment status {}", resp.status())
                }
                Ok(resp) => return Err(anyhow!("enrichment status {}", resp.status())),
                Err(e) => anyhow::Error::new(e).context("enrichment request"),
            };

            if attempt > self.max_retries {
                return Err(retryable);
            }
            tracing::debug!(
                target: "pipeline",
                item_id = %item.id,
                attempt,
                error = %retryable,
                "enrichment failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_null_mean_no_candidate() {
        assert!(parse_enrichment("").unwrap().is_none());
        assert!(parse_enrichment("  null ").unwrap().is_none());
        assert!(parse_enrichment("{}").unwrap().is_none());
    }

    #[test]
    fn object_becomes_fields() {
        let f = parse_enrichment(r#"{"symbol": "ETH/USDT", "direction": "SHORT"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(f.get("symbol").and_then(|v| v.as_str()), Some("ETH/USDT"));
    }

    #[test]
    fn non_object_is_an_error() {
        assert!(parse_enrichment("[1,2,3]").is_err());
        assert!(parse_enrichment("not json").is_err());
    }
}
