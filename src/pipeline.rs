//! Ingestion cycle: batched direct fetches, derived resolution, merge.
//!
//! The coordinator owns `&mut DataStore` for the whole cycle. Fetches in a
//! batch run concurrently; the merge happens only after the batch settles,
//! so the store has a single writer path and needs no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::NaiveDate;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::time::{sleep, Duration};

use crate::config::{now_ts, Config};
use crate::connectors::ConnectorSet;
use crate::derived;
use crate::fetch::HttpFetcher;
use crate::gauge::{ErrorKind, GaugeRegistry, GaugeSpec, ObsStatus, Observation, ProviderRequest, SourceKind};
use crate::logging::{log_cycle_summary, obj, ProfileScope};
use crate::store::{DataStore, MergeStats};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Direct-source gauges attempted
    pub fetched: usize,
    pub stored: usize,
    pub preserved: usize,
    pub failed: usize,
    pub needs_calc: usize,
    pub pending: usize,
}

impl CycleSummary {
    fn add_merge(&mut self, stats: MergeStats) {
        self.stored += stats.stored;
        self.preserved += stats.preserved;
    }
}

pub struct Pipeline {
    registry: GaugeRegistry,
    connectors: ConnectorSet,
    batch_size: usize,
    batch_pause: Duration,
}

impl Pipeline {
    pub fn new(registry: GaugeRegistry, connectors: ConnectorSet, batch_size: usize, batch_pause: Duration) -> Self {
        Self {
            registry,
            connectors,
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    pub fn from_config(cfg: &Config, registry: GaugeRegistry) -> Self {
        let fetcher = Arc::new(HttpFetcher::from_config(cfg));
        Self::new(
            registry,
            ConnectorSet::from_config(cfg, fetcher),
            cfg.batch_size,
            Duration::from_millis(cfg.batch_pause_ms),
        )
    }

    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    async fn observe(&self, spec: &GaugeSpec, request: &ProviderRequest, today: NaiveDate) -> Observation {
        let started = Instant::now();
        let raw = self.connectors.fetch(spec, request, today).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let metric = spec.delta.map(|rule| rule.metric);
        match (raw.error, raw.latest_with_reference(metric)) {
            (None, Some((latest, prev))) => Observation::ok(
                &spec.id,
                latest.value,
                prev.map(|r| r.value),
                latest.date,
                latency_ms,
                &raw.source,
            ),
            (Some(kind), _) => Observation::failed(&spec.id, kind, latency_ms, &raw.source),
            (None, None) => Observation::failed(&spec.id, ErrorKind::NoData, latency_ms, &raw.source),
        }
    }

    /// One full refresh: every direct gauge, then placeholders, then derived.
    pub async fn run_cycle(&self, store: &mut DataStore, today: NaiveDate) -> Result<CycleSummary> {
        let _profile = ProfileScope::with_context("run_cycle", &[("gauges", json!(self.registry.len()))]);
        let mut summary = CycleSummary::default();
        let mut current: HashMap<String, Observation> = HashMap::new();
        let mut placeholders: HashMap<String, Observation> = HashMap::new();
        let mut direct: Vec<(&GaugeSpec, &ProviderRequest)> = Vec::new();

        for spec in self.registry.specs() {
            match &spec.source {
                SourceKind::DirectApi(request) => direct.push((spec, request)),
                SourceKind::Manual | SourceKind::SatellitePending => {
                    placeholders.insert(
                        spec.id.clone(),
                        Observation::failed(&spec.id, ErrorKind::Pending, 0, "pending"),
                    );
                }
                SourceKind::Derived(_) => {}
            }
        }

        let batches: Vec<_> = direct.chunks(self.batch_size).collect();
        for (i, batch) in batches.iter().enumerate() {
            let results = join_all(batch.iter().map(|(spec, request)| self.observe(spec, request, today))).await;
            let settled: HashMap<String, Observation> =
                results.into_iter().map(|o| (o.gauge_id.clone(), o)).collect();
            summary.fetched += settled.len();
            summary.failed += settled.values().filter(|o| !o.is_ok()).count();
            summary.add_merge(store.merge(&settled));
            current.extend(settled);
            if i + 1 < batches.len() && !self.batch_pause.is_zero() {
                sleep(self.batch_pause).await;
            }
        }

        summary.pending = placeholders.len();
        if !placeholders.is_empty() {
            summary.add_merge(store.merge(&placeholders));
        }

        // Dependencies are final only once every direct fetch has settled.
        let resolved: HashMap<String, Observation> = derived::resolve(&self.registry, &current)
            .into_iter()
            .map(|o| (o.gauge_id.clone(), o))
            .collect();
        summary.needs_calc = resolved.values().filter(|o| o.status == ObsStatus::NeedsCalc).count();
        summary.add_merge(store.merge(&resolved));

        store.mark_fetched(now_ts())?;
        store.flush()?;

        log_cycle_summary(obj(&[
            ("fetched", json!(summary.fetched)),
            ("stored", json!(summary.stored)),
            ("preserved", json!(summary.preserved)),
            ("failed", json!(summary.failed)),
            ("needs_calc", json!(summary.needs_calc)),
            ("pending", json!(summary.pending)),
        ]));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{Connector, DateRange, RawRows, Row, RowOrder};
    use crate::grading::GradedGauge;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedConnector {
        values: HashMap<String, f64>,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for FixedConnector {
        fn row_order(&self) -> RowOrder {
            RowOrder::Descending
        }

        async fn fetch_rows(&self, spec: &GaugeSpec, _request: &ProviderRequest, range: &DateRange) -> RawRows {
            if self.failing.load(Ordering::SeqCst) {
                return RawRows::failed(ErrorKind::Timeout, "fixed");
            }
            match self.values.get(&spec.id) {
                Some(v) => RawRows::ok(
                    vec![
                        Row { date: range.end, value: *v },
                        Row { date: range.start, value: *v * 0.9 },
                    ],
                    "fixed",
                ),
                None => RawRows::failed(ErrorKind::NoData, "fixed"),
            }
        }
    }

    fn pipeline(values: &[(&str, f64)], failing: Arc<AtomicBool>) -> Pipeline {
        let values: HashMap<String, f64> = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let make = || -> Box<dyn Connector> {
            Box::new(FixedConnector {
                values: values.clone(),
                failing: failing.clone(),
            })
        };
        let connectors = ConnectorSet::new(make(), make(), make(), make());
        Pipeline::new(GaugeRegistry::builtin().unwrap(), connectors, 4, Duration::from_millis(0))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_resolves_derived_after_direct() {
        let failing = Arc::new(AtomicBool::new(false));
        let p = pipeline(&[("E1", 65_850.0), ("E2", 57_110.0)], failing);
        let mut store = DataStore::in_memory(3600);
        store.init().unwrap();
        let summary = p.run_cycle(&mut store, today()).await.unwrap();

        // E1/E2 carry a 0.01 scale transform
        let e3 = store.get("E3").unwrap();
        assert!((e3.value - 87.4).abs() < 0.1);
        assert_eq!(summary.pending, 2);
        assert!(summary.fetched > 2);
        assert!(summary.needs_calc > 0);
        assert!(!store.is_expired(now_ts()));
    }

    #[tokio::test]
    async fn test_failed_cycle_preserves_values() {
        let failing = Arc::new(AtomicBool::new(false));
        let p = pipeline(&[("I4", 1453.0), ("P1", 2.0)], failing.clone());
        let mut store = DataStore::in_memory(3600);
        store.init().unwrap();
        p.run_cycle(&mut store, today()).await.unwrap();
        assert_eq!(store.get("I4").unwrap().value, 1453.0);

        failing.store(true, Ordering::SeqCst);
        let summary = p.run_cycle(&mut store, today()).await.unwrap();
        assert_eq!(summary.stored, 0);
        assert_eq!(summary.preserved, 2);
        let i4 = store.get("I4").unwrap();
        assert_eq!(i4.value, 1453.0);
        assert!(i4.stale);
        assert!(i4.is_fallback);
        assert_eq!(i4.last_error, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_previous_value_from_sorted_rows() {
        let failing = Arc::new(AtomicBool::new(false));
        let p = pipeline(&[("I1", 3.0)], failing);
        let mut store = DataStore::in_memory(3600);
        store.init().unwrap();
        p.run_cycle(&mut store, today()).await.unwrap();
        let i1 = store.get("I1").unwrap();
        assert_eq!(i1.value, 3.0);
        assert_eq!(i1.date, Some(today()));
        assert!((i1.prev_value.unwrap() - 2.7).abs() < 1e-9);
    }

    /// Daily series: latest 1250, the day before 1245, a week earlier 1190.
    struct SeriesConnector;

    #[async_trait]
    impl Connector for SeriesConnector {
        fn row_order(&self) -> RowOrder {
            RowOrder::Ascending
        }

        async fn fetch_rows(&self, spec: &GaugeSpec, _request: &ProviderRequest, range: &DateRange) -> RawRows {
            if spec.id != "I4" {
                return RawRows::failed(ErrorKind::NoData, "series");
            }
            let day = |back: i64| range.end - chrono::Duration::days(back);
            RawRows::ok(
                vec![
                    Row { date: day(8), value: 1190.0 },
                    Row { date: day(1), value: 1245.0 },
                    Row { date: day(0), value: 1250.0 },
                ],
                "series",
            )
        }
    }

    #[tokio::test]
    async fn test_weekly_delta_uses_week_old_reference() {
        let make = || -> Box<dyn Connector> { Box::new(SeriesConnector) };
        let p = Pipeline::new(
            GaugeRegistry::builtin().unwrap(),
            ConnectorSet::new(make(), make(), make(), make()),
            10,
            Duration::from_millis(0),
        );
        let mut store = DataStore::in_memory(3600);
        store.init().unwrap();
        p.run_cycle(&mut store, today()).await.unwrap();

        let i4 = store.get("I4").unwrap();
        assert_eq!(i4.value, 1250.0);
        assert_eq!(i4.prev_value, Some(1190.0));

        // 1250 sits in the good band; the 60-point weekly move crosses danger_abs
        let spec = p.registry().get("I4").unwrap();
        let graded = GradedGauge::new(spec, i4);
        assert_eq!(graded.severity, 5);
    }
}
