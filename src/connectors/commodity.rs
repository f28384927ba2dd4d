//! Commodity prices: EIA series API, falling back to the open Stooq daily CSV.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::{parse_number, Connector, DateRange, RawRows, Row, RowOrder};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::gauge::{ErrorKind, GaugeSpec, ProviderRequest};
use crate::logging::log_source_fallback;

const EIA: &str = "eia";
const STOOQ: &str = "stooq";

pub struct CommodityConnector {
    fetcher: Arc<HttpFetcher>,
    eia_base: String,
    stooq_base: String,
    api_key: Option<String>,
}

impl CommodityConnector {
    pub fn new(cfg: &Config, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            eia_base: cfg.eia_base.trim_end_matches('/').to_string(),
            stooq_base: cfg.stooq_base.trim_end_matches('/').to_string(),
            api_key: cfg.eia_api_key.clone(),
        }
    }

    async fn fetch_eia(&self, key: &str, spec: &GaugeSpec, series: &str, range: &DateRange) -> RawRows {
        let start = range.start.format("%Y-%m-%d").to_string();
        let Ok(url) = url::Url::parse_with_params(
            &format!("{}/seriesid/{}", self.eia_base, series),
            &[("api_key", key), ("start", start.as_str())],
        ) else {
            return RawRows::failed(ErrorKind::Transport, EIA);
        };
        let label = format!("eia:{}", spec.id);
        match self.fetcher.fetch(url.as_str(), &label).await.and_then(|b| b.into_json()) {
            Ok(body) => match parse_eia(&body) {
                Ok(rows) => RawRows::ok(rows, EIA),
                Err(kind) => RawRows::failed(kind, EIA),
            },
            Err(err) => RawRows::failed(err.kind(), EIA),
        }
    }

    async fn fetch_stooq(&self, spec: &GaugeSpec, symbol: &str, range: &DateRange) -> RawRows {
        let Ok(url) = url::Url::parse_with_params(
            &format!("{}/q/d/l/", self.stooq_base),
            &[("s", symbol), ("i", "d")],
        ) else {
            return RawRows::failed(ErrorKind::Transport, STOOQ);
        };
        let label = format!("stooq:{}", spec.id);
        match self.fetcher.fetch(url.as_str(), &label).await {
            Ok(body) => {
                let rows = parse_stooq_csv(&body.into_text())
                    .into_iter()
                    .filter(|r| r.date >= range.start && r.date <= range.end)
                    .collect();
                RawRows::ok(rows, STOOQ)
            }
            Err(err) => RawRows::failed(err.kind(), STOOQ),
        }
    }
}

/// EIA v2 `response.data[]` with `period` and a numeric or string `value`.
pub fn parse_eia(body: &Value) -> Result<Vec<Row>, ErrorKind> {
    if body.get("error").is_some() {
        let msg = body["error"].to_string().to_lowercase();
        return Err(if msg.contains("api_key") || msg.contains("api key") {
            ErrorKind::InvalidKey
        } else {
            ErrorKind::Transport
        });
    }
    let data = body
        .pointer("/response/data")
        .and_then(Value::as_array)
        .ok_or(ErrorKind::Transport)?;
    Ok(data
        .iter()
        .filter_map(|d| {
            let period = d.get("period").and_then(Value::as_str)?;
            let date = NaiveDate::parse_from_str(period, "%Y-%m-%d").ok()?;
            let value = match d.get("value")? {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => parse_number(s)?,
                _ => return None,
            };
            Some(Row { date, value })
        })
        .collect())
}

/// `Date,Open,High,Low,Close,Volume`; the close column is the value.
pub fn parse_stooq_csv(text: &str) -> Vec<Row> {
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let (Some(date_col), Some(close_col)) = (
        columns.iter().position(|c| c.eq_ignore_ascii_case("date")),
        columns.iter().position(|c| c.eq_ignore_ascii_case("close")),
    ) else {
        return Vec::new();
    };
    lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let date = NaiveDate::parse_from_str(fields.get(date_col)?.trim(), "%Y-%m-%d").ok()?;
            let value = parse_number(fields.get(close_col)?)?;
            Some(Row { date, value })
        })
        .collect()
}

#[async_trait]
impl Connector for CommodityConnector {
    fn row_order(&self) -> RowOrder {
        // EIA answers newest first; Stooq oldest first. Rows are re-sorted
        // downstream either way.
        RowOrder::Descending
    }

    async fn fetch_rows(&self, spec: &GaugeSpec, request: &ProviderRequest, range: &DateRange) -> RawRows {
        let ProviderRequest::Commodity { eia_series, stooq_symbol } = request else {
            return RawRows::failed(ErrorKind::Transport, EIA);
        };

        let primary_failure = match self.api_key.as_deref() {
            Some(key) => {
                let primary = self.fetch_eia(key, spec, eia_series, range).await;
                if primary.is_usable() {
                    return primary;
                }
                primary.error
            }
            None => None,
        };

        let reason = primary_failure.map_or("no_key", |_| "primary_failed");
        log_source_fallback(&spec.id, EIA, STOOQ, reason);
        let mut secondary = self.fetch_stooq(spec, stooq_symbol, range).await;
        if secondary.is_usable() {
            // Stooq is oldest-first; keep the declared newest-first contract.
            secondary.rows.reverse();
            return secondary;
        }
        if primary_failure.is_none() {
            return secondary;
        }
        RawRows::failed(ErrorKind::AllSourcesFailed, STOOQ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_eia_mixed_values() {
        let body = json!({"response": {"data": [
            {"period": "2026-10-16", "value": 71.25},
            {"period": "2026-10-15", "value": "70.10"},
            {"period": "2026-10-14", "value": null}
        ]}});
        let rows = parse_eia(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, 70.1);
    }

    #[test]
    fn test_parse_eia_key_error() {
        let body = json!({"error": {"code": "API_KEY_INVALID", "message": "api_key is invalid"}});
        assert_eq!(parse_eia(&body), Err(ErrorKind::InvalidKey));
    }

    #[test]
    fn test_parse_stooq_csv() {
        let csv = "Date,Open,High,Low,Close,Volume\n2026-10-15,70,72,69,71.5,1000\n2026-10-16,71,73,70,72.25,900\n";
        let rows = parse_stooq_csv(csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, 72.25);
    }

    #[test]
    fn test_stooq_no_data_text() {
        assert!(parse_stooq_csv("No data").is_empty());
    }

    const CLOSED: &str = "http://127.0.0.1:9";

    fn connector(api_key: Option<&str>) -> CommodityConnector {
        let mut cfg = Config::from_env();
        cfg.eia_api_key = api_key.map(str::to_string);
        cfg.eia_base = CLOSED.to_string();
        cfg.stooq_base = CLOSED.to_string();
        cfg.fetch_retries = 0;
        let fetcher = Arc::new(HttpFetcher::from_config(&cfg));
        CommodityConnector::new(&cfg, fetcher)
    }

    async fn fetch_wti(connector: &CommodityConnector) -> RawRows {
        let spec = crate::gauge::catalog::builtin_gauges()
            .into_iter()
            .find(|g| g.id == "P3")
            .unwrap();
        let crate::gauge::SourceKind::DirectApi(request) = spec.source.clone() else {
            panic!("P3 is a direct gauge");
        };
        let range = DateRange::for_cycle(spec.cycle, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        connector.fetch_rows(&spec, &request, &range).await
    }

    #[tokio::test]
    async fn test_no_key_reports_stooq_error() {
        let raw = fetch_wti(&connector(None)).await;
        assert_eq!(raw.source, STOOQ);
        assert!(raw.rows.is_empty());
        let kind = raw.error.unwrap();
        assert_ne!(kind, ErrorKind::AllSourcesFailed);
    }

    #[tokio::test]
    async fn test_both_sources_down_is_all_sources_failed() {
        let raw = fetch_wti(&connector(Some("key"))).await;
        assert_eq!(raw.error, Some(ErrorKind::AllSourcesFailed));
        assert_eq!(raw.source, STOOQ);
    }
}
