//! Source connectors: one per upstream provider.
//!
//! A connector turns a gauge's `ProviderRequest` into provider calls and
//! parses the response into dated rows. Connectors never fail a cycle: every
//! failure comes back as `RawRows::error`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;

use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::gauge::{Cycle, DeltaMetric, ErrorKind, GaugeSpec, Provider, ProviderRequest, Transform};

pub mod air_quality;
pub mod commodity;
pub mod ecos;
pub mod fred;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Row {
    pub date: NaiveDate,
    pub value: f64,
}

/// Order in which a provider returns rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRows {
    pub rows: Vec<Row>,
    pub error: Option<ErrorKind>,
    pub source: String,
}

impl RawRows {
    pub fn ok(rows: Vec<Row>, source: &str) -> Self {
        let error = if rows.is_empty() { Some(ErrorKind::NoData) } else { None };
        Self {
            rows,
            error,
            source: source.to_string(),
        }
    }

    pub fn failed(kind: ErrorKind, source: &str) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(kind),
            source: source.to_string(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.rows.is_empty()
    }

    /// Latest and previous rows by date, whatever order the provider used.
    pub fn latest_pair(&self) -> Option<(Row, Option<Row>)> {
        let mut rows: Vec<Row> = self.rows.iter().copied().filter(|r| r.value.is_finite()).collect();
        rows.sort_by_key(|r| r.date);
        let latest = rows.pop()?;
        Some((latest, rows.pop()))
    }

    /// Latest row plus the row its delta is measured against. `Wow` reaches
    /// back to the newest row at least a week older than the latest; anything
    /// else uses the row immediately before it.
    pub fn latest_with_reference(&self, metric: Option<DeltaMetric>) -> Option<(Row, Option<Row>)> {
        let (latest, prev) = self.latest_pair()?;
        match metric {
            Some(DeltaMetric::Wow) => {
                let cutoff = latest.date - Duration::days(WEEK_DAYS);
                let reference = self
                    .rows
                    .iter()
                    .copied()
                    .filter(|r| r.value.is_finite() && r.date <= cutoff)
                    .max_by_key(|r| r.date);
                Some((latest, reference))
            }
            Some(DeltaMetric::Mom) | None => Some((latest, prev)),
        }
    }
}

const WEEK_DAYS: i64 = 7;

/// Request window derived from the gauge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Daily looks back 10 days to survive weekends and holidays; monthly
    /// two years; quarterly and annual three.
    pub fn for_cycle(cycle: Cycle, today: NaiveDate) -> Self {
        let start = match cycle {
            Cycle::Daily => today - Duration::days(10),
            Cycle::Monthly => today.checked_sub_months(Months::new(24)).unwrap_or(today),
            Cycle::Quarterly | Cycle::Annual => {
                today.checked_sub_months(Months::new(36)).unwrap_or(today)
            }
        };
        Self { start, end: today }
    }
}

pub fn apply_transform(rows: Vec<Row>, transform: Option<Transform>) -> Vec<Row> {
    match transform {
        None => rows,
        Some(t) => rows
            .into_iter()
            .map(|r| Row {
                date: r.date,
                value: t.apply(r.value),
            })
            .collect(),
    }
}

/// Put rows in ascending date order given the provider's declared order.
pub fn normalize_order(mut rows: Vec<Row>, order: RowOrder) -> Vec<Row> {
    if order == RowOrder::Descending {
        rows.reverse();
    }
    rows.sort_by_key(|r| r.date);
    rows
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn row_order(&self) -> RowOrder;

    /// Fetch raw rows for one gauge. `request` always belongs to this
    /// connector's provider.
    async fn fetch_rows(&self, spec: &GaugeSpec, request: &ProviderRequest, range: &DateRange) -> RawRows;
}

/// One connector per provider, dispatched by exhaustive match.
pub struct ConnectorSet {
    ecos: Box<dyn Connector>,
    fred: Box<dyn Connector>,
    air_quality: Box<dyn Connector>,
    commodity: Box<dyn Connector>,
}

impl ConnectorSet {
    pub fn new(
        ecos: Box<dyn Connector>,
        fred: Box<dyn Connector>,
        air_quality: Box<dyn Connector>,
        commodity: Box<dyn Connector>,
    ) -> Self {
        Self {
            ecos,
            fred,
            air_quality,
            commodity,
        }
    }

    pub fn from_config(cfg: &Config, fetcher: Arc<HttpFetcher>) -> Self {
        Self::new(
            Box::new(ecos::EcosConnector::new(cfg, fetcher.clone())),
            Box::new(fred::FredConnector::new(cfg, fetcher.clone())),
            Box::new(air_quality::AirQualityConnector::new(cfg, fetcher.clone())),
            Box::new(commodity::CommodityConnector::new(cfg, fetcher)),
        )
    }

    pub fn for_provider(&self, provider: Provider) -> &dyn Connector {
        match provider {
            Provider::Ecos => self.ecos.as_ref(),
            Provider::Fred => self.fred.as_ref(),
            Provider::AirQuality => self.air_quality.as_ref(),
            Provider::Commodity => self.commodity.as_ref(),
        }
    }

    /// Fetch, transform and order rows for one direct-API gauge.
    pub async fn fetch(&self, spec: &GaugeSpec, request: &ProviderRequest, today: NaiveDate) -> RawRows {
        let connector = self.for_provider(request.provider());
        let range = DateRange::for_cycle(spec.cycle, today);
        let mut raw = connector.fetch_rows(spec, request, &range).await;
        let rows = std::mem::take(&mut raw.rows);
        raw.rows = normalize_order(apply_transform(rows, spec.transform), connector.row_order());
        raw
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "." || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
