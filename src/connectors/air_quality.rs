//! Air quality: AirKorea real-time province feed, falling back to the open
//! WAQI city feed (demo token unless one is configured).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_number, Connector, DateRange, RawRows, Row, RowOrder};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::gauge::{ErrorKind, GaugeSpec, ProviderRequest};
use crate::logging::log_source_fallback;

const AIRKOREA: &str = "airkorea";
const WAQI: &str = "waqi";

#[derive(Deserialize, Debug)]
struct AirKoreaEnvelope {
    response: AirKoreaResponse,
}

#[derive(Deserialize, Debug)]
struct AirKoreaResponse {
    body: Option<AirKoreaBody>,
}

#[derive(Deserialize, Debug)]
struct AirKoreaBody {
    #[serde(default)]
    items: Vec<serde_json::Map<String, Value>>,
}

pub struct AirQualityConnector {
    fetcher: Arc<HttpFetcher>,
    airkorea_base: String,
    waqi_base: String,
    service_key: Option<String>,
    waqi_token: String,
}

impl AirQualityConnector {
    pub fn new(cfg: &Config, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            airkorea_base: cfg.airkorea_base.trim_end_matches('/').to_string(),
            waqi_base: cfg.waqi_base.trim_end_matches('/').to_string(),
            service_key: cfg.airkorea_api_key.clone(),
            waqi_token: cfg.waqi_token.clone(),
        }
    }

    async fn fetch_airkorea(&self, key: &str, spec: &GaugeSpec, sido: &str, item: &str) -> RawRows {
        let Ok(url) = url::Url::parse_with_params(
            &format!("{}/getCtprvnRltmMesureDnsty", self.airkorea_base),
            &[
                ("serviceKey", key),
                ("returnType", "json"),
                ("numOfRows", "200"),
                ("pageNo", "1"),
                ("sidoName", sido),
                ("ver", "1.0"),
            ],
        ) else {
            return RawRows::failed(ErrorKind::Transport, AIRKOREA);
        };
        let label = format!("airkorea:{}", spec.id);
        match self.fetcher.fetch(url.as_str(), &label).await.and_then(|b| b.into_json()) {
            Ok(body) => match parse_airkorea(&body, item) {
                Ok(rows) => RawRows::ok(rows, AIRKOREA),
                Err(kind) => RawRows::failed(kind, AIRKOREA),
            },
            Err(err) => RawRows::failed(err.kind(), AIRKOREA),
        }
    }

    async fn fetch_waqi(&self, spec: &GaugeSpec, city: &str, item: &str) -> RawRows {
        let Ok(url) = url::Url::parse_with_params(
            &format!("{}/feed/{}/", self.waqi_base, city),
            &[("token", self.waqi_token.as_str())],
        ) else {
            return RawRows::failed(ErrorKind::Transport, WAQI);
        };
        let label = format!("waqi:{}", spec.id);
        match self.fetcher.fetch(url.as_str(), &label).await.and_then(|b| b.into_json()) {
            Ok(body) => match parse_waqi(&body, item) {
                Ok(rows) => RawRows::ok(rows, WAQI),
                Err(kind) => RawRows::failed(kind, WAQI),
            },
            Err(err) => RawRows::failed(err.kind(), WAQI),
        }
    }
}

/// Mean across stations per measurement date. `-` marks an offline station.
pub fn parse_airkorea(body: &Value, item: &str) -> Result<Vec<Row>, ErrorKind> {
    let envelope: AirKoreaEnvelope =
        serde_json::from_value(body.clone()).map_err(|_| ErrorKind::Transport)?;
    let items = envelope.response.body.map(|b| b.items).unwrap_or_default();

    let mut by_date: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
    for station in &items {
        let Some(date) = station
            .get("dataTime")
            .and_then(Value::as_str)
            .and_then(|t| t.get(..10))
            .and_then(|t| NaiveDate::parse_from_str(t, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let Some(value) = station.get(item).and_then(Value::as_str).and_then(parse_number) else {
            continue;
        };
        let slot = by_date.entry(date).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }
    Ok(by_date
        .into_iter()
        .map(|(date, (sum, n))| Row {
            date,
            value: sum / n as f64,
        })
        .collect())
}

/// WAQI reports per-pollutant sub-index values under `iaqi`.
pub fn parse_waqi(body: &Value, item: &str) -> Result<Vec<Row>, ErrorKind> {
    match body.get("status").and_then(Value::as_str) {
        Some("ok") => {}
        Some("error") => {
            let msg = body.get("data").and_then(Value::as_str).unwrap_or_default();
            return Err(if msg.to_lowercase().contains("key") {
                ErrorKind::InvalidKey
            } else {
                ErrorKind::NoData
            });
        }
        _ => return Err(ErrorKind::Transport),
    }
    let pollutant = match item {
        "pm25Value" => "pm25",
        "pm10Value" => "pm10",
        other => other,
    };
    let data = body.get("data").ok_or(ErrorKind::NoData)?;
    let value = data
        .pointer(&format!("/iaqi/{}/v", pollutant))
        .and_then(Value::as_f64)
        .ok_or(ErrorKind::NoData)?;
    let date = data
        .pointer("/time/s")
        .and_then(Value::as_str)
        .and_then(|s| s.get(..10))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or(ErrorKind::NoData)?;
    Ok(vec![Row { date, value }])
}

#[async_trait]
impl Connector for AirQualityConnector {
    fn row_order(&self) -> RowOrder {
        RowOrder::Descending
    }

    async fn fetch_rows(&self, spec: &GaugeSpec, request: &ProviderRequest, _range: &DateRange) -> RawRows {
        let ProviderRequest::AirQuality { sido, item, waqi_city } = request else {
            return RawRows::failed(ErrorKind::Transport, AIRKOREA);
        };

        let primary_failure = match self.service_key.as_deref() {
            Some(key) => {
                let primary = self.fetch_airkorea(key, spec, sido, item).await;
                if primary.is_usable() {
                    return primary;
                }
                primary.error
            }
            None => None,
        };

        let reason = primary_failure.map_or("no_key", |_| "primary_failed");
        log_source_fallback(&spec.id, AIRKOREA, WAQI, reason);
        let secondary = self.fetch_waqi(spec, waqi_city, item).await;
        if secondary.is_usable() || primary_failure.is_none() {
            return secondary;
        }
        RawRows::failed(ErrorKind::AllSourcesFailed, WAQI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_airkorea_station_mean() {
        let body = json!({
            "response": {"body": {"items": [
                {"dataTime": "2026-10-17 14:00", "stationName": "a", "pm25Value": "20"},
                {"dataTime": "2026-10-17 14:00", "stationName": "b", "pm25Value": "30"},
                {"dataTime": "2026-10-17 14:00", "stationName": "c", "pm25Value": "-"}
            ]}}
        });
        let rows = parse_airkorea(&body, "pm25Value").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 25.0);
    }

    #[test]
    fn test_waqi_parse() {
        let body = json!({
            "status": "ok",
            "data": {"iaqi": {"pm25": {"v": 57}}, "time": {"s": "2026-10-17 14:00:00"}}
        });
        let rows = parse_waqi(&body, "pm25Value").unwrap();
        assert_eq!(rows[0].value, 57.0);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    }

    #[test]
    fn test_waqi_invalid_key() {
        let body = json!({"status": "error", "data": "Invalid key"});
        assert_eq!(parse_waqi(&body, "pm10Value"), Err(ErrorKind::InvalidKey));
    }

    #[test]
    fn test_waqi_missing_pollutant() {
        let body = json!({"status": "ok", "data": {"iaqi": {}, "time": {"s": "2026-10-17 14:00:00"}}});
        assert_eq!(parse_waqi(&body, "pm10Value"), Err(ErrorKind::NoData));
    }

    const CLOSED: &str = "http://127.0.0.1:9";

    fn connector(service_key: Option<&str>) -> AirQualityConnector {
        let mut cfg = Config::from_env();
        cfg.airkorea_api_key = service_key.map(str::to_string);
        cfg.airkorea_base = CLOSED.to_string();
        cfg.waqi_base = CLOSED.to_string();
        cfg.fetch_retries = 0;
        let fetcher = Arc::new(HttpFetcher::from_config(&cfg));
        AirQualityConnector::new(&cfg, fetcher)
    }

    async fn fetch_pm25(connector: &AirQualityConnector) -> RawRows {
        let spec = crate::gauge::catalog::builtin_gauges()
            .into_iter()
            .find(|g| g.id == "A1")
            .unwrap();
        let crate::gauge::SourceKind::DirectApi(request) = spec.source.clone() else {
            panic!("A1 is a direct gauge");
        };
        let range = DateRange::for_cycle(spec.cycle, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        connector.fetch_rows(&spec, &request, &range).await
    }

    #[tokio::test]
    async fn test_no_key_reports_waqi_error() {
        let raw = fetch_pm25(&connector(None)).await;
        assert_eq!(raw.source, WAQI);
        assert!(raw.rows.is_empty());
        let kind = raw.error.unwrap();
        assert_ne!(kind, ErrorKind::AllSourcesFailed);
    }

    #[tokio::test]
    async fn test_both_sources_down_is_all_sources_failed() {
        let raw = fetch_pm25(&connector(Some("key"))).await;
        assert_eq!(raw.error, Some(ErrorKind::AllSourcesFailed));
        assert!(raw.rows.is_empty());
    }
}
