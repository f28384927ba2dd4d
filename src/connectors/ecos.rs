//! Bank of Korea ECOS statistics API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

use super::{parse_number, Connector, DateRange, RawRows, Row, RowOrder};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::gauge::{Cycle, ErrorKind, GaugeSpec, ProviderRequest};

const SOURCE: &str = "ecos";
const PAGE_SIZE: u32 = 1000;

#[derive(Deserialize, Debug)]
struct EcosRow {
    #[serde(rename = "TIME")]
    time: String,
    #[serde(rename = "DATA_VALUE")]
    data_value: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EcosSearch {
    #[serde(default)]
    row: Vec<EcosRow>,
}

#[derive(Deserialize, Debug)]
struct EcosResult {
    #[serde(rename = "CODE")]
    code: String,
}

pub struct EcosConnector {
    fetcher: Arc<HttpFetcher>,
    base: String,
    api_key: Option<String>,
}

impl EcosConnector {
    pub fn new(cfg: &Config, fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            base: cfg.ecos_base.trim_end_matches('/').to_string(),
            api_key: cfg.ecos_api_key.clone(),
        }
    }

    fn cycle_code(cycle: Cycle) -> &'static str {
        match cycle {
            Cycle::Daily => "D",
            Cycle::Monthly => "M",
            Cycle::Quarterly => "Q",
            Cycle::Annual => "A",
        }
    }

    fn format_date(date: NaiveDate, cycle: Cycle) -> String {
        match cycle {
            Cycle::Daily => date.format("%Y%m%d").to_string(),
            Cycle::Monthly => date.format("%Y%m").to_string(),
            Cycle::Quarterly => format!("{}Q{}", date.year(), (date.month0() / 3) + 1),
            Cycle::Annual => date.format("%Y").to_string(),
        }
    }

    fn url(&self, key: &str, stat_code: &str, item_code: &str, cycle: Cycle, range: &DateRange) -> String {
        format!(
            "{}/StatisticSearch/{}/json/kr/1/{}/{}/{}/{}/{}/{}",
            self.base,
            key,
            PAGE_SIZE,
            stat_code,
            Self::cycle_code(cycle),
            Self::format_date(range.start, cycle),
            Self::format_date(range.end, cycle),
            item_code
        )
    }
}

/// ECOS TIME values: `YYYYMMDD`, `YYYYMM`, `YYYYQn` or `YYYY`.
pub fn parse_ecos_time(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some((year, quarter)) = raw.split_once('Q') {
        let year: i32 = year.parse().ok()?;
        let quarter: u32 = quarter.parse().ok().filter(|q| (1..=4).contains(q))?;
        return NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1);
    }
    match raw.len() {
        8 => NaiveDate::parse_from_str(raw, "%Y%m%d").ok(),
        6 => {
            let year: i32 = raw.get(..4)?.parse().ok()?;
            let month: u32 = raw.get(4..)?.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, 1)
        }
        4 => NaiveDate::from_ymd_opt(raw.parse().ok()?, 1, 1),
        _ => None,
    }
}

/// Rows from a StatisticSearch body, or the classified ECOS result code.
pub fn parse_ecos(body: &Value) -> Result<Vec<Row>, ErrorKind> {
    if let Some(search) = body.get("StatisticSearch") {
        let search: EcosSearch =
            serde_json::from_value(search.clone()).map_err(|_| ErrorKind::Transport)?;
        let rows = search
            .row
            .iter()
            .filter_map(|r| {
                let date = parse_ecos_time(&r.time)?;
                let value = parse_number(r.data_value.as_deref()?)?;
                Some(Row { date, value })
            })
            .collect();
        return Ok(rows);
    }
    let result: EcosResult = body
        .get("RESULT")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or(ErrorKind::Transport)?;
    Err(match result.code.as_str() {
        "INFO-100" | "ERROR-300" => ErrorKind::InvalidKey,
        "INFO-200" => ErrorKind::NoData,
        "ERROR-602" => ErrorKind::RateLimited,
        c if c.starts_with("ERROR-5") => ErrorKind::ServerError,
        _ => ErrorKind::Transport,
    })
}

#[async_trait]
impl Connector for EcosConnector {
    fn row_order(&self) -> RowOrder {
        RowOrder::Ascending
    }

    async fn fetch_rows(&self, spec: &GaugeSpec, request: &ProviderRequest, range: &DateRange) -> RawRows {
        let ProviderRequest::Ecos { stat_code, item_code } = request else {
            return RawRows::failed(ErrorKind::Transport, SOURCE);
        };
        let Some(key) = self.api_key.as_deref() else {
            return RawRows::failed(ErrorKind::NoData, SOURCE);
        };
        let url = self.url(key, stat_code, item_code, spec.cycle, range);
        let label = format!("ecos:{}", spec.id);
        match self.fetcher.fetch(&url, &label).await.and_then(|b| b.into_json()) {
            Ok(body) => match parse_ecos(&body) {
                Ok(rows) => RawRows::ok(rows, SOURCE),
                Err(kind) => RawRows::failed(kind, SOURCE),
            },
            Err(err) => RawRows::failed(err.kind(), SOURCE),
        }
    }
}
