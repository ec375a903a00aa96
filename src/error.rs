// src/error.rs
//! Typed error boundaries. Validation rejections are NOT errors and live in
//! `signals::validator` instead.

use thiserror::Error;

/// Startup problems. Any of these is fatal: the poll loop never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("no active sources configured")]
    NoSources,
    #[error("source collaborator unreachable at startup: {0}")]
    SourceUnreachable(#[source] FetchError),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Transient failure of one fetch for one source. Never fatal for the loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream rate limit hit")]
    RateLimited,
    #[error("decoding response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}
