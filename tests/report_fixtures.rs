//! End-to-end report checks over fixed cache contents.
//!
//! Each fixture is merged through a real `DataStore` so the report sees the
//! same snapshot shape a live cycle would produce.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};

use econ_gauge::actions::{find_banned, ActionKind};
use econ_gauge::dual_lock::LockStage;
use econ_gauge::gauge::{GaugeRegistry, Observation};
use econ_gauge::report::{is_valid_report_id, Report};
use econ_gauge::store::DataStore;

const NORMAL: &[(&str, f64)] = &[
    ("I1", 2.5), ("I2", 3.0), ("I3", 2.5), ("I4", 1200.0), ("I5", 0.0),
    ("E1", 600.0), ("E2", 550.0), ("E3", 50.0), ("E4", 5.0),
    ("F1", 3.5), ("F2", 0.5), ("F3", 2600.0), ("F4", 15.0), ("F5", 3.0),
    ("P1", 2.0), ("P2", 1.5), ("P3", 70.0),
    ("O1", 1.0), ("O2", 75.0),
    ("C1", 1.0), ("C2", 105.0),
    ("L1", 3.0), ("L2", 0.5),
    ("R1", 0.1), ("R2", 50_000.0),
    ("A1", 10.0), ("A2", 20.0),
];

const CRISIS: &[(&str, f64)] = &[
    ("I1", 4.5), ("I2", 5.0), ("I3", 6.0), ("I4", 1480.0), ("I5", -2.0),
    ("E1", 400.0), ("E2", 720.0), ("E3", -80.0), ("E4", -15.0),
    ("F1", 6.0), ("F2", 2.0), ("F3", 1800.0), ("F4", 40.0), ("F5", 7.0),
    ("P1", 5.0), ("P2", 7.0), ("P3", 110.0),
    ("O1", -5.0), ("O2", 60.0),
    ("C1", -5.0), ("C2", 80.0),
    ("L1", 5.0), ("L2", -1.0),
    ("R1", -1.5), ("R2", 80_000.0),
    ("A1", 40.0), ("A2", 90.0),
];

fn build(values: &[(&str, f64)]) -> Report {
    let registry = GaugeRegistry::builtin().unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
    let batch: HashMap<String, Observation> = values
        .iter()
        .map(|(id, v)| (id.to_string(), Observation::ok(id, *v, None, date, 20, "fixture")))
        .collect();
    let mut store = DataStore::in_memory(6 * 3600);
    store.init().unwrap();
    store.merge_at(&batch, 1_000);
    store.mark_fetched(1_000).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
    Report::build(&registry, &store.snapshot_at(1_000), store.status(1_000), "KR", now)
}

fn assert_compliant(report: &Report) {
    assert!(is_valid_report_id(&report.report_id), "{}", report.report_id);
    assert!(report.metadata.compliance.prediction_prohibited);
    assert_eq!(report.metadata.compliance.actions_checked, report.actions.len());
    assert!(!report.systems.is_empty() && report.systems.len() <= 9);
    assert!(report.actions.iter().any(|a| a.kind == ActionKind::Context));
    for action in &report.actions {
        assert!(find_banned(&action.text).is_none(), "{}", action.text);
        assert!((0.0..=1.0).contains(&action.confidence));
    }
    for g in &report.gauges {
        assert!((1..=5).contains(&g.severity), "{} {}", g.gauge_id, g.severity);
    }
}

#[test]
fn normal_fixture_stays_calm() {
    let report = build(NORMAL);
    assert_compliant(&report);
    assert_eq!(report.gauges.len(), NORMAL.len());
    assert!(report.gauges.iter().all(|g| g.severity == 1), "{:?}",
        report.gauges.iter().filter(|g| g.severity != 1).map(|g| &g.gauge_id).collect::<Vec<_>>());
    assert!(report.cross_signals.len() <= 3);
    assert!(!report.dual_lock.active);
    assert_eq!(report.dual_lock.stage, LockStage::Normal);
    assert!(report.overall.causal_stage.is_none());
    assert_eq!(report.systems.len(), 9);
    assert!(report.actions.iter().all(|a| a.kind == ActionKind::Context));
}

#[test]
fn crisis_fixture_seals_both_sides() {
    let report = build(CRISIS);
    assert_compliant(&report);
    assert!(report.cross_signals.len() >= 1);
    assert!(report.dual_lock.active);
    assert!(report.dual_lock.input_sealed && report.dual_lock.output_sealed);
    assert_eq!(report.dual_lock.stage, LockStage::Crisis);
    assert!(report.overall.causal_stage.is_some());
    assert_eq!(report.overall.score, 100);
    assert!(report.actions.iter().any(|a| a.kind == ActionKind::Observation));
    assert!(report.actions.iter().any(|a| a.kind == ActionKind::Watch));

    let value = serde_json::to_value(&report).unwrap();
    let causal = value["overall"]["causal_stage"].as_str().unwrap();
    assert!(["cause", "manifest", "result"].contains(&causal));
}

#[test]
fn concrete_band_scenarios() {
    let report = build(&[("I4", 1453.0), ("P1", 2.0)]);
    let i4 = report.gauges.iter().find(|g| g.gauge_id == "I4").unwrap();
    assert_eq!(i4.severity, 5);
    assert_eq!(i4.band.map(|b| b.as_str()), Some("danger"));
    let p1 = report.gauges.iter().find(|g| g.gauge_id == "P1").unwrap();
    assert_eq!(p1.severity, 1);
    assert_eq!(p1.band.map(|b| b.as_str()), Some("good"));
}

#[test]
fn regrading_same_snapshot_is_identical() {
    let a = build(CRISIS);
    let b = build(CRISIS);
    assert_eq!(a.report_id, b.report_id);
    assert_eq!(a.gauges, b.gauges);
}
