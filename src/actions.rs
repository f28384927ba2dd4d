//! Qualitative guidance entries derived from graded state.
//!
//! Every text passes the banned-term filter before it leaves this module.
//! Rejected candidates are swapped for fixed neutral phrasing, never
//! emitted verbatim.

use serde::Serialize;

use crate::cross_signal::CrossSignal;
use crate::dual_lock::{DualLock, LockStage};
use crate::grading::{GradedGauge, Severity};
use crate::logging::log_text_rejected;

/// Matched at the start of any word.
const BANNED_STEMS: &[&str] = &[
    "forecast",
    "predict",
    "projection",
    "buy",
    "sell",
    "recommend",
    "advise",
    "guarantee",
];

const BANNED_PHRASES: &[&str] = &[
    "target price",
    "price target",
    "will rise",
    "will fall",
    "will increase",
    "will decrease",
    "expected to",
    "likely to",
    "should invest",
];

const MAX_OBSERVATIONS: usize = 5;
/// Gauges at or above this get an observation entry.
const OBSERVE_FLOOR: Severity = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Observation,
    Watch,
    Context,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Observation => "observation",
            ActionKind::Watch => "watch",
            ActionKind::Context => "context",
        }
    }

    fn neutral_text(&self) -> &'static str {
        match self {
            ActionKind::Observation => "A gauge reading sits outside its normal band.",
            ActionKind::Watch => "Coupled gauges are under joint review this cycle.",
            ActionKind::Context => "Observed conditions are summarized from the latest available readings.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub text: String,
    pub confidence: f64,
}

/// First banned stem or phrase found in `text`.
pub fn find_banned(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if let Some(phrase) = BANNED_PHRASES.iter().find(|p| lower.contains(*p)) {
        return Some(*phrase);
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|word| BANNED_STEMS.iter().copied().find(|stem| word.starts_with(stem)))
}

impl Action {
    /// Build an entry, replacing banned candidate text with neutral phrasing.
    pub fn checked(kind: ActionKind, candidate: String, confidence: f64) -> Self {
        let text = match find_banned(&candidate) {
            Some(term) => {
                log_text_rejected(kind.as_str(), term);
                kind.neutral_text().to_string()
            }
            None => candidate,
        };
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self { kind, text, confidence }
    }
}

fn freshness(gauges: &[&GradedGauge]) -> f64 {
    if gauges.is_empty() {
        return 0.5;
    }
    let fresh = gauges.iter().filter(|g| !g.stale).count() as f64;
    0.4 + 0.6 * fresh / gauges.len() as f64
}

fn format_value(v: f64) -> String {
    if v.abs() >= 1000.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

fn observation_text(g: &GradedGauge) -> String {
    let band = match g.band {
        Some(b) => format!("the {} band", b.as_str()),
        None => "no declared band".to_string(),
    };
    let mut text = format!(
        "{} reads {} {} and sits in {} (severity {}).",
        g.name,
        format_value(g.value),
        g.unit,
        band,
        g.severity
    );
    if g.stale {
        text.push_str(" Value carried from an earlier refresh.");
    }
    text
}

/// Ordered guidance: observations, then watch entries, then context.
pub fn generate(
    graded: &[GradedGauge],
    signals: &[CrossSignal],
    lock: &DualLock,
    catalog_size: usize,
) -> Vec<Action> {
    let mut actions = Vec::new();

    let mut elevated: Vec<&GradedGauge> = graded.iter().filter(|g| g.severity >= OBSERVE_FLOOR).collect();
    elevated.sort_by(|a, b| b.severity.cmp(&a.severity));
    for g in elevated.iter().take(MAX_OBSERVATIONS) {
        let confidence = if g.stale { 0.6 } else { 0.9 };
        actions.push(Action::checked(ActionKind::Observation, observation_text(g), confidence));
    }

    let mut watches = 0;
    for s in signals {
        let members: Vec<&GradedGauge> = graded.iter().filter(|g| s.gauges.contains(&g.gauge_id)).collect();
        actions.push(Action::checked(
            ActionKind::Watch,
            format!("{} ({}).", s.description, s.gauges.join(", ")),
            freshness(&members) * 0.9,
        ));
        watches += 1;
    }
    if lock.stage != LockStage::Normal {
        let mut text = format!(
            "Dual-lock stage {}: input group {:.1}, output group {:.1}",
            lock.stage.as_str(),
            lock.scores.input,
            lock.scores.output
        );
        if let Some(causal) = lock.causal_stage {
            text.push_str(&format!(", stress concentrated at the {} stage", causal.as_str()));
        }
        text.push('.');
        actions.push(Action::checked(ActionKind::Watch, text, 0.8));
        watches += 1;
    }
    if watches == 0 && !elevated.is_empty() {
        let ids: Vec<&str> = elevated.iter().map(|g| g.gauge_id.as_str()).collect();
        actions.push(Action::checked(
            ActionKind::Watch,
            format!("Elevated readings on {} merit review at the next release.", ids.join(", ")),
            freshness(&elevated) * 0.8,
        ));
    }

    let all: Vec<&GradedGauge> = graded.iter().collect();
    let good = graded.iter().filter(|g| g.severity == 1).count();
    let coverage = if catalog_size == 0 { 0.0 } else { graded.len() as f64 / catalog_size as f64 };
    actions.push(Action::checked(
        ActionKind::Context,
        format!(
            "{} of {} catalog gauges graded; {} within good bands.",
            graded.len(),
            catalog_size,
            good
        ),
        coverage.min(freshness(&all)),
    ));
    let stale = graded.iter().filter(|g| g.stale).count();
    if stale > 0 {
        actions.push(Action::checked(
            ActionKind::Context,
            format!("{} gauges show a previous value after a failed refresh.", stale),
            1.0,
        ));
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dual_lock::GroupScores;
    use crate::gauge::{Axis, BandName, ObsStatus};
    use crate::grading::{Grade, Trend};

    fn gauge(id: &str, severity: Severity, stale: bool) -> GradedGauge {
        GradedGauge {
            gauge_id: id.to_string(),
            name: format!("Gauge {}", id),
            axis: Axis::Monetary,
            unit: "%".to_string(),
            value: 1453.0,
            prev_value: None,
            date: None,
            status: ObsStatus::Ok,
            source: "test".to_string(),
            stale,
            is_fallback: stale,
            stale_age_sec: 0,
            severity,
            grade: Grade::from_severity(severity),
            band: Some(BandName::Danger),
            trend: Trend::Steady,
        }
    }

    fn lock(stage: LockStage) -> DualLock {
        DualLock {
            active: stage >= LockStage::Seal,
            input_sealed: stage >= LockStage::Seal,
            output_sealed: stage >= LockStage::Seal,
            stage,
            causal_stage: None,
            scores: GroupScores {
                input: 1.0,
                output: 1.0,
                context: 1.0,
            },
        }
    }

    #[test]
    fn test_banned_stems_and_phrases() {
        assert_eq!(find_banned("We forecast growth"), Some("forecast"));
        assert_eq!(find_banned("Predicted move"), Some("predict"));
        assert_eq!(find_banned("time to BUY"), Some("buy"));
        assert_eq!(find_banned("the target price is"), Some("target price"));
        assert_eq!(find_banned("rates will rise"), Some("will rise"));
        assert_eq!(find_banned("Retail sales growth is weak"), None);
        assert_eq!(find_banned("Unsold housing units"), None);
    }

    #[test]
    fn test_rejected_text_replaced() {
        let a = Action::checked(ActionKind::Watch, "You should sell equities".to_string(), 0.7);
        assert_eq!(a.text, ActionKind::Watch.neutral_text());
        assert!(find_banned(&a.text).is_none());
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Action::checked(ActionKind::Context, "x".into(), 1.7).confidence, 1.0);
        assert_eq!(Action::checked(ActionKind::Context, "x".into(), -0.2).confidence, 0.0);
        assert_eq!(Action::checked(ActionKind::Context, "x".into(), f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_neutral_texts_are_clean() {
        for kind in [ActionKind::Observation, ActionKind::Watch, ActionKind::Context] {
            assert!(find_banned(kind.neutral_text()).is_none());
        }
    }

    #[test]
    fn test_calm_report_has_context_only() {
        let graded = vec![gauge("I1", 1, false), gauge("P1", 1, false)];
        let actions = generate(&graded, &[], &lock(LockStage::Normal), 28);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Context);
    }

    #[test]
    fn test_empty_input_still_has_context() {
        let actions = generate(&[], &[], &lock(LockStage::Normal), 28);
        assert!(actions.iter().any(|a| a.kind == ActionKind::Context));
    }

    #[test]
    fn test_elevated_report_has_observation_and_watch() {
        let graded = vec![gauge("I4", 5, false), gauge("P1", 1, false), gauge("F4", 3, true)];
        let actions = generate(&graded, &[], &lock(LockStage::Watch), 28);
        let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds[0], ActionKind::Observation);
        assert!(kinds.contains(&ActionKind::Watch));
        assert!(kinds.contains(&ActionKind::Context));
        // most severe first
        assert!(actions[0].text.starts_with("Gauge I4"));
        for a in &actions {
            assert!(find_banned(&a.text).is_none(), "{}", a.text);
            assert!((0.0..=1.0).contains(&a.confidence));
        }
    }

    #[test]
    fn test_observations_capped() {
        let graded: Vec<_> = (0..8).map(|i| gauge(&format!("G{}", i), 5, false)).collect();
        let actions = generate(&graded, &[], &lock(LockStage::Watch), 28);
        let observations = actions.iter().filter(|a| a.kind == ActionKind::Observation).count();
        assert_eq!(observations, MAX_OBSERVATIONS);
    }
}
