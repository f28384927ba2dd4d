//! Report assembly: grade a cache snapshot and derive every section.
//!
//! A `Report` is built fresh from a snapshot and never mutated afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::actions::{self, Action};
use crate::cross_signal::{self, CrossSignal};
use crate::dual_lock::{self, CausalStage, DualLock, LockStage};
use crate::gauge::{Axis, AxisGroup, GaugeRegistry};
use crate::grading::{axis_scores, grade_entries, Grade, GradedGauge, Trend};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::store::{CacheEntry, CacheStatus};

const ID_SUFFIX_LEN: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub country: String,
    pub period_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_observation: Option<NaiveDate>,
    pub gauges_total: usize,
    pub gauges_graded: usize,
}

/// One economic axis.
#[derive(Debug, Clone, Serialize)]
pub struct SystemEntry {
    pub axis: Axis,
    pub label: String,
    pub group: AxisGroup,
    /// 0 (calm) to 100 (severe)
    pub score: u8,
    pub severity: f64,
    pub level: Grade,
    pub trend: Trend,
    pub gauges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overall {
    pub stage: LockStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal_stage: Option<CausalStage>,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct Compliance {
    pub prediction_prohibited: bool,
    pub actions_checked: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub threshold_version: String,
    pub generated_at: String,
    pub cache: CacheStatus,
    pub compliance: Compliance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub report_id: String,
    pub context: ReportContext,
    pub systems: Vec<SystemEntry>,
    pub gauges: Vec<GradedGauge>,
    pub cross_signals: Vec<CrossSignal>,
    pub dual_lock: DualLock,
    pub overall: Overall,
    pub actions: Vec<Action>,
    pub metadata: Metadata,
}

/// Two to four uppercase letters; anything else becomes `XX`.
pub fn country_code(raw: &str) -> String {
    let code: String = raw
        .chars()
        .filter(char::is_ascii_alphabetic)
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    if code.len() < 2 {
        "XX".to_string()
    } else {
        code
    }
}

fn id_suffix(country: &str, generated_at: &str, graded: &[GradedGauge]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(country.as_bytes());
    hasher.update(generated_at.as_bytes());
    for g in graded {
        hasher.update(format!("|{}:{}:{}", g.gauge_id, g.value, g.severity).as_bytes());
    }
    let digest = hex::encode_upper(hasher.finalize());
    digest[..ID_SUFFIX_LEN].to_string()
}

pub fn report_id(country: &str, date: NaiveDate, suffix: &str) -> String {
    format!("RPT-{}-{}-{}", country_code(country), date.format("%Y%m%d"), suffix)
}

/// `RPT-<2..4 uppercase>-<8 digits>-<uppercase alnum>`
pub fn is_valid_report_id(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    let [prefix, cc, date, suffix] = parts.as_slice() else {
        return false;
    };
    *prefix == "RPT"
        && (2..=4).contains(&cc.len())
        && cc.chars().all(|c| c.is_ascii_uppercase())
        && date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && !suffix.is_empty()
        && suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl Report {
    pub fn build(
        registry: &GaugeRegistry,
        entries: &[CacheEntry],
        cache: CacheStatus,
        country: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let _profile = ProfileScope::new("report_build");
        let generated_at = now.to_rfc3339();

        let gauges = grade_entries(registry, entries);
        let axes = axis_scores(&registry.axes(), &gauges);
        let cross_signals = cross_signal::detect(&gauges);
        let dual_lock = dual_lock::evaluate(&axes, &gauges);
        let actions = actions::generate(&gauges, &cross_signals, &dual_lock, registry.len());

        let systems: Vec<SystemEntry> = axes
            .iter()
            .map(|a| SystemEntry {
                axis: a.axis,
                label: a.axis.label().to_string(),
                group: a.group,
                score: a.score(),
                severity: (a.severity * 100.0).round() / 100.0,
                level: a.grade(),
                trend: a.trend,
                gauges: a.gauges,
            })
            .collect();

        let overall_score = if systems.is_empty() {
            0
        } else {
            (systems.iter().map(|s| s.score as f64).sum::<f64>() / systems.len() as f64).round() as u8
        };

        let country = country_code(country);
        let report_id = report_id(&country, now.date_naive(), &id_suffix(&country, &generated_at, &gauges));

        let report = Self {
            context: ReportContext {
                country,
                period_label: now.format("%Y-%m").to_string(),
                latest_observation: gauges.iter().filter_map(|g| g.date).max(),
                gauges_total: registry.len(),
                gauges_graded: gauges.len(),
            },
            overall: Overall {
                stage: dual_lock.stage,
                causal_stage: dual_lock.causal_stage,
                score: overall_score,
            },
            metadata: Metadata {
                threshold_version: registry.version().to_string(),
                generated_at,
                cache,
                compliance: Compliance {
                    prediction_prohibited: true,
                    actions_checked: actions.len(),
                },
            },
            report_id,
            systems,
            gauges,
            cross_signals,
            dual_lock,
            actions,
        };

        log(
            Level::Info,
            Domain::Report,
            "built",
            obj(&[
                ("report_id", v_str(&report.report_id)),
                ("stage", v_str(report.overall.stage.as_str())),
                ("gauges", serde_json::json!(report.gauges.len())),
                ("cross_signals", serde_json::json!(report.cross_signals.len())),
            ]),
        );
        report
    }
}
