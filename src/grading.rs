//! Severity grading.
//!
//! Grading is band containment only. Polarity is already encoded in how the
//! bands were authored, so the same function grades high-is-bad, low-is-bad
//! and two-sided gauges. Ungradeable input never errors: it grades as 2.

use serde::Serialize;

use chrono::NaiveDate;

use crate::gauge::{Axis, AxisGroup, BandName, DeltaRule, GaugeRegistry, GaugeSpec, ObsStatus, Thresholds};
use crate::logging::{log, obj, Domain, Level};
use crate::store::CacheEntry;

/// Integer severity, 1 (calm) to 5 (severe).
pub type Severity = u8;

/// Value that matched no band, or could not be graded.
pub const AMBIGUOUS: Severity = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Good,
    Watch,
    Danger,
}

impl Grade {
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            0 | 1 => Grade::Good,
            2 | 3 => Grade::Watch,
            _ => Grade::Danger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::Watch => "watch",
            Grade::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Worsening,
    Improving,
    Steady,
}

/// Which declared band holds `value`, most severe band first.
pub fn grade(value: f64, thresholds: &Thresholds) -> (Severity, Option<BandName>) {
    if !value.is_finite() {
        return (AMBIGUOUS, None);
    }
    thresholds
        .bands()
        .into_iter()
        .find(|(_, band)| band.contains(value))
        .map_or((AMBIGUOUS, None), |(name, _)| (name.severity(), Some(name)))
}

/// Severity implied by the absolute period-over-period change.
pub fn delta_severity(rule: &DeltaRule, value: f64, prev: Option<f64>) -> Option<Severity> {
    if !rule.enabled {
        return None;
    }
    let change = (value - prev?).abs();
    if !change.is_finite() {
        return None;
    }
    if change >= rule.danger_abs {
        Some(5)
    } else if change >= rule.warn_abs {
        Some(3)
    } else {
        None
    }
}

/// Band severity raised (never lowered) by the gauge's delta rule.
pub fn severity_for(spec: &GaugeSpec, value: f64, prev: Option<f64>) -> (Severity, Option<BandName>) {
    let (base, band) = grade(value, &spec.thresholds);
    if !value.is_finite() {
        return (base, band);
    }
    let raised = spec
        .delta
        .as_ref()
        .and_then(|rule| delta_severity(rule, value, prev))
        .map_or(base, |d| base.max(d));
    (raised, band)
}

/// Compare band severity of the previous and current value. Delta rules are
/// left out so a single jump does not read as its own trend.
pub fn observed_trend(spec: &GaugeSpec, value: f64, prev: Option<f64>) -> Trend {
    let Some(prev) = prev.filter(|p| p.is_finite()) else {
        return Trend::Steady;
    };
    let (now, _) = grade(value, &spec.thresholds);
    let (before, _) = grade(prev, &spec.thresholds);
    match now.cmp(&before) {
        std::cmp::Ordering::Greater => Trend::Worsening,
        std::cmp::Ordering::Less => Trend::Improving,
        std::cmp::Ordering::Equal => Trend::Steady,
    }
}

/// Report projection of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedGauge {
    pub gauge_id: String,
    pub name: String,
    pub axis: Axis,
    pub unit: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub status: ObsStatus,
    pub source: String,
    pub stale: bool,
    pub is_fallback: bool,
    pub stale_age_sec: u64,
    pub severity: Severity,
    pub grade: Grade,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<BandName>,
    pub trend: Trend,
}

impl GradedGauge {
    pub fn new(spec: &GaugeSpec, entry: &CacheEntry) -> Self {
        let (severity, band) = severity_for(spec, entry.value, entry.prev_value);
        Self {
            gauge_id: spec.id.clone(),
            name: spec.name.clone(),
            axis: spec.axis,
            unit: spec.unit.clone(),
            value: entry.value,
            prev_value: entry.prev_value,
            date: entry.date,
            status: entry.status,
            source: entry.source.clone(),
            stale: entry.stale,
            is_fallback: entry.is_fallback,
            stale_age_sec: entry.stale_age_sec,
            severity,
            grade: Grade::from_severity(severity),
            band,
            trend: observed_trend(spec, entry.value, entry.prev_value),
        }
    }
}

/// Grade every cached gauge still present in the registry, in catalog order.
pub fn grade_entries(registry: &GaugeRegistry, entries: &[CacheEntry]) -> Vec<GradedGauge> {
    let graded: Vec<GradedGauge> = registry
        .specs()
        .iter()
        .filter_map(|spec| {
            let entry = entries.iter().find(|e| e.gauge_id == spec.id)?;
            Some(GradedGauge::new(spec, entry))
        })
        .collect();
    let count = |grade: Grade| graded.iter().filter(|g| g.grade == grade).count();
    log(
        Level::Debug,
        Domain::Grade,
        "graded",
        obj(&[
            ("good", serde_json::json!(count(Grade::Good))),
            ("watch", serde_json::json!(count(Grade::Watch))),
            ("danger", serde_json::json!(count(Grade::Danger))),
            ("ungraded", serde_json::json!(registry.len() - graded.len())),
        ]),
    );
    graded
}

/// Aggregate severity of one axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisScore {
    pub axis: Axis,
    pub group: AxisGroup,
    /// Mean gauge severity; `AMBIGUOUS` when the axis has no graded gauge
    pub severity: f64,
    pub gauges: usize,
    pub trend: Trend,
}

impl AxisScore {
    /// 0 (all gauges at severity 1) to 100 (all at 5).
    pub fn score(&self) -> u8 {
        ((self.severity - 1.0) / 4.0 * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn grade(&self) -> Grade {
        Grade::from_severity(self.severity.round() as Severity)
    }
}

pub fn axis_scores(axes: &[Axis], graded: &[GradedGauge]) -> Vec<AxisScore> {
    axes.iter()
        .map(|&axis| {
            let members: Vec<&GradedGauge> = graded.iter().filter(|g| g.axis == axis).collect();
            let severity = if members.is_empty() {
                AMBIGUOUS as f64
            } else {
                members.iter().map(|g| g.severity as f64).sum::<f64>() / members.len() as f64
            };
            let balance: i32 = members
                .iter()
                .map(|g| match g.trend {
                    Trend::Worsening => 1,
                    Trend::Improving => -1,
                    Trend::Steady => 0,
                })
                .sum();
            let trend = match balance {
                b if b > 0 => Trend::Worsening,
                b if b < 0 => Trend::Improving,
                _ => Trend::Steady,
            };
            AxisScore {
                axis,
                group: axis.group(),
                severity,
                gauges: members.len(),
                trend,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GaugeRegistry {
        GaugeRegistry::builtin().unwrap()
    }

    fn severity(id: &str, value: f64, prev: Option<f64>) -> (Severity, Option<BandName>) {
        let reg = registry();
        severity_for(reg.get(id).unwrap(), value, prev)
    }

    fn entry(id: &str, value: f64, prev: Option<f64>) -> CacheEntry {
        CacheEntry {
            gauge_id: id.to_string(),
            value,
            prev_value: prev,
            date: NaiveDate::from_ymd_opt(2026, 10, 1),
            status: ObsStatus::Ok,
            last_error: None,
            latency_ms: 10,
            source: "test".to_string(),
            is_fallback: false,
            stale: false,
            stale_age_sec: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_fx_danger_band() {
        assert_eq!(severity("I4", 1453.0, None), (5, Some(BandName::Danger)));
    }

    #[test]
    fn test_cpi_good_band() {
        assert_eq!(severity("P1", 2.0, None), (1, Some(BandName::Good)));
    }

    #[test]
    fn test_band_edges_are_half_open() {
        assert_eq!(severity("I4", 1300.0, None), (3, Some(BandName::Warn)));
        assert_eq!(severity("I4", 1449.99, None), (3, Some(BandName::Warn)));
        assert_eq!(severity("P1", 2.5, None), (3, Some(BandName::Warn)));
        assert_eq!(severity("P1", 4.0, None), (5, Some(BandName::Danger)));
    }

    #[test]
    fn test_value_outside_every_band_is_ambiguous() {
        // I4 declares nothing below 1050
        assert_eq!(severity("I4", 900.0, None), (AMBIGUOUS, None));
    }

    #[test]
    fn test_non_finite_is_ambiguous() {
        assert_eq!(severity("I4", f64::NAN, None), (AMBIGUOUS, None));
        assert_eq!(severity("I4", f64::INFINITY, None), (AMBIGUOUS, None));
    }

    #[test]
    fn test_negative_low_is_bad_bands() {
        // L2 employment growth: danger below -0.5, warn [-0.5, 0)
        assert_eq!(severity("L2", -1.0, None).0, 5);
        assert_eq!(severity("L2", -0.5, None).0, 3);
        assert_eq!(severity("L2", 0.0, None).0, 1);
        // I5 rate gap crosses into negative territory
        assert_eq!(severity("I5", -2.0, None).0, 5);
        assert_eq!(severity("I5", -1.0, None).0, 3);
        assert_eq!(severity("I5", 0.5, None).0, 1);
    }

    #[test]
    fn test_two_sided_bands() {
        assert_eq!(severity("R1", 0.0, None), (1, Some(BandName::Good)));
        assert_eq!(severity("R1", -0.7, None), (3, Some(BandName::WarnLow)));
        assert_eq!(severity("R1", -1.0, None), (3, Some(BandName::WarnLow)));
        assert_eq!(severity("R1", -1.5, None), (5, Some(BandName::DangerLow)));
        assert_eq!(severity("R1", 1.2, None), (5, Some(BandName::Danger)));
        assert_eq!(severity("P3", 30.0, None), (5, Some(BandName::DangerLow)));
        assert_eq!(severity("P3", 40.0, None), (3, Some(BandName::WarnLow)));
        assert_eq!(severity("P3", 70.0, None), (1, Some(BandName::Good)));
    }

    #[test]
    fn test_delta_only_raises() {
        // I4 good band, but a 60-won move trips the danger delta
        assert_eq!(severity("I4", 1250.0, Some(1190.0)).0, 5);
        assert_eq!(severity("I4", 1250.0, Some(1220.0)).0, 3);
        assert_eq!(severity("I4", 1250.0, Some(1245.0)).0, 1);
        // danger band never lowered by a calm delta
        assert_eq!(severity("I4", 1460.0, Some(1459.0)).0, 5);
    }

    #[test]
    fn test_disabled_delta_ignored() {
        let reg = registry();
        let mut spec = reg.get("I4").unwrap().clone();
        if let Some(rule) = spec.delta.as_mut() {
            rule.enabled = false;
        }
        assert_eq!(severity_for(&spec, 1250.0, Some(1100.0)).0, 1);
    }

    #[test]
    fn test_grade_buckets() {
        assert_eq!(Grade::from_severity(1), Grade::Good);
        assert_eq!(Grade::from_severity(2), Grade::Watch);
        assert_eq!(Grade::from_severity(3), Grade::Watch);
        assert_eq!(Grade::from_severity(4), Grade::Danger);
        assert_eq!(Grade::from_severity(5), Grade::Danger);
    }

    #[test]
    fn test_grading_is_deterministic() {
        let reg = registry();
        let entries = vec![entry("I4", 1453.0, Some(1400.0)), entry("P1", 2.0, None)];
        let a = grade_entries(&reg, &entries);
        let b = grade_entries(&reg, &entries);
        assert_eq!(a, b);
        assert!(a.iter().all(|g| (1..=5).contains(&g.severity)));
    }

    #[test]
    fn test_trend_from_previous_value() {
        let reg = registry();
        let p1 = reg.get("P1").unwrap();
        assert_eq!(observed_trend(p1, 4.2, Some(2.0)), Trend::Worsening);
        assert_eq!(observed_trend(p1, 2.0, Some(3.0)), Trend::Improving);
        assert_eq!(observed_trend(p1, 2.1, Some(2.0)), Trend::Steady);
        assert_eq!(observed_trend(p1, 2.1, None), Trend::Steady);
    }

    #[test]
    fn test_axis_scores() {
        let reg = registry();
        let graded = grade_entries(&reg, &[entry("I4", 1453.0, None), entry("I1", 2.5, None)]);
        let scores = axis_scores(&[Axis::Monetary, Axis::Labor], &graded);
        assert_eq!(scores[0].severity, 3.0);
        assert_eq!(scores[0].score(), 50);
        assert_eq!(scores[0].gauges, 2);
        assert_eq!(scores[1].severity, AMBIGUOUS as f64);
        assert_eq!(scores[1].gauges, 0);
    }
}
