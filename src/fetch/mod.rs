//! Resilient HTTP fetch shared by every connector.
//!
//! A failed fetch never aborts a cycle: callers turn `FetchError` into a
//! classified observation status through `FetchError::kind`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::gauge::ErrorKind;
use crate::logging::{log, obj, redact_url, v_str, Domain, Level};

pub mod retry;

pub use retry::{retry_classified, BackoffPolicy, ExponentialBackoff};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("invalid API key (HTTP 401)")]
    InvalidKey,
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("server error (HTTP {0})")]
    ServerError(u16),
    #[error("request timed out")]
    Timeout,
    #[error("request aborted: {0}")]
    Aborted(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// 5xx, 429, timeouts and aborted connections are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited
                | FetchError::ServerError(_)
                | FetchError::Timeout
                | FetchError::Aborted(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidKey => ErrorKind::InvalidKey,
            FetchError::RateLimited => ErrorKind::RateLimited,
            FetchError::ServerError(_) => ErrorKind::ServerError,
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Aborted(_) | FetchError::Http { .. } | FetchError::Other(_) => {
                ErrorKind::Transport
            }
        }
    }

    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(FetchError::InvalidKey),
            408 => Some(FetchError::Timeout),
            429 => Some(FetchError::RateLimited),
            500..=599 => Some(FetchError::ServerError(status)),
            _ => Some(FetchError::Http {
                status,
                message: body.chars().take(200).collect(),
            }),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() || err.is_request() {
            FetchError::Aborted(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

/// Response body: JSON when it parses as JSON, raw text otherwise (CSV feeds).
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Text(String),
}

impl ParsedBody {
    pub fn parse(text: String) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(v) = serde_json::from_str(trimmed) {
                return ParsedBody::Json(v);
            }
        }
        ParsedBody::Text(text)
    }

    pub fn into_json(self) -> Result<Value, FetchError> {
        match self {
            ParsedBody::Json(v) => Ok(v),
            ParsedBody::Text(t) => Err(FetchError::Other(format!(
                "expected JSON body, got: {}",
                t.chars().take(80).collect::<String>()
            ))),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ParsedBody::Json(v) => v.to_string(),
            ParsedBody::Text(t) => t,
        }
    }
}

pub struct HttpFetcher {
    client: Client,
    backoff: Arc<dyn BackoffPolicy>,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, backoff: Arc<dyn BackoffPolicy>, retries: u32) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            backoff,
            retries,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            Duration::from_secs(cfg.fetch_timeout_secs),
            Arc::new(ExponentialBackoff::with_base(cfg.backoff_base_ms)),
            cfg.fetch_retries,
        )
    }

    /// Fetch with the configured retry budget.
    pub async fn fetch(&self, url: &str, label: &str) -> Result<ParsedBody, FetchError> {
        self.fetch_with_retries(url, label, self.retries).await
    }

    pub async fn fetch_with_retries(
        &self,
        url: &str,
        label: &str,
        retries: u32,
    ) -> Result<ParsedBody, FetchError> {
        retry_classified(self.backoff.as_ref(), label, retries, |_| self.attempt(url)).await
    }

    async fn attempt(&self, url: &str) -> Result<ParsedBody, FetchError> {
        log(Level::Trace, Domain::Fetch, "request", obj(&[("url", v_str(&redact_url(url)))]));
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(FetchError::from_reqwest)?;
        if let Some(err) = FetchError::from_status(status, &text) {
            return Err(err);
        }
        Ok(ParsedBody::parse(text))
    }
}
