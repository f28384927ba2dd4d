//! St. Louis Fed FRED series observations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_number, Connector, DateRange, RawRows, Row, RowOrder};
use crate::config::Config;
use crate::fetch::{FetchError, HttpFetcher};
use crate::gauge::{ErrorKind, GaugeSpec, ProviderRequest};

const SOURCE: &str = "fred";

#[derive(Deserialize, Debug)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Deserialize, Debug)]
struct FredObservations {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

pub struct FredConnector {
    fetcher: Arc<HttpFetcher>,
    base: String,
    api_key: Option<String>,
}

impl FredConnector {
    pub fn new(cfg: &Config, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            base: cfg.fred_base.trim_end_matches('/').to_string(),
            api_key: cfg.fred_api_key.clone(),
        }
    }

    fn url(&self, key: &str, series_id: &str, range: &DateRange) -> Option<String> {
        let start = range.start.format("%Y-%m-%d").to_string();
        let end = range.end.format("%Y-%m-%d").to_string();
        url::Url::parse_with_params(
            &format!("{}/series/observations", self.base),
            &[
                ("series_id", series_id),
                ("api_key", key),
                ("file_type", "json"),
                ("observation_start", start.as_str()),
                ("observation_end", end.as_str()),
                ("sort_order", "desc"),
            ],
        )
        .ok()
        .map(|u| u.to_string())
    }
}

/// Missing values arrive as "." and are skipped.
pub fn parse_fred(body: &Value) -> Result<Vec<Row>, ErrorKind> {
    let parsed: FredObservations =
        serde_json::from_value(body.clone()).map_err(|_| ErrorKind::Transport)?;
    Ok(parsed
        .observations
        .iter()
        .filter_map(|o| {
            let date = NaiveDate::parse_from_str(&o.date, "%Y-%m-%d").ok()?;
            Some(Row {
                date,
                value: parse_number(&o.value)?,
            })
        })
        .collect())
}

/// FRED answers a bad key with HTTP 400 and an error_message naming api_key.
fn classify(err: &FetchError) -> ErrorKind {
    match err {
        FetchError::Http { status: 400, message } if message.contains("api_key") => {
            ErrorKind::InvalidKey
        }
        other => other.kind(),
    }
}

#[async_trait]
impl Connector for FredConnector {
    fn row_order(&self) -> RowOrder {
        RowOrder::Descending
    }

    async fn fetch_rows(&self, spec: &GaugeSpec, request: &ProviderRequest, range: &DateRange) -> RawRows {
        let ProviderRequest::Fred { series_id } = request else {
            return RawRows::failed(ErrorKind::Transport, SOURCE);
        };
        let Some(key) = self.api_key.as_deref() else {
            return RawRows::failed(ErrorKind::NoData, SOURCE);
        };
        let Some(url) = self.url(key, series_id, range) else {
            return RawRows::failed(ErrorKind::Transport, SOURCE);
        };
        let label = format!("fred:{}", spec.id);
        match self.fetcher.fetch(&url, &label).await.and_then(|b| b.into_json()) {
            Ok(body) => match parse_fred(&body) {
                Ok(rows) => RawRows::ok(rows, SOURCE),
                Err(kind) => RawRows::failed(kind, SOURCE),
            },
            Err(err) => RawRows::failed(classify(&err), SOURCE),
        }
    }
}
