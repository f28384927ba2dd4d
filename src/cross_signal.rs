//! Cross-signal detection over a graded gauge set.
//!
//! Stateless: signals are rebuilt from scratch every report and never
//! accumulate history.

use serde::Serialize;

use crate::grading::{GradedGauge, Severity};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Every member must be at or above this severity.
pub const COUPLING_FLOOR: Severity = 3;

pub struct Coupling {
    pub id: &'static str,
    pub gauges: &'static [&'static str],
    pub description: &'static str,
}

pub const COUPLINGS: &[Coupling] = &[
    Coupling {
        id: "credit_volatility",
        gauges: &["F2", "F4"],
        description: "Credit spread and equity volatility are elevated together",
    },
    Coupling {
        id: "export_production",
        gauges: &["E4", "O1"],
        description: "Export growth and industrial production are weak together",
    },
    Coupling {
        id: "fx_equity",
        gauges: &["I4", "F3"],
        description: "Currency weakness coincides with equity market stress",
    },
    Coupling {
        id: "imported_inflation",
        gauges: &["P1", "P3"],
        description: "Consumer inflation and crude oil prices are elevated together",
    },
    Coupling {
        id: "household_squeeze",
        gauges: &["L1", "C2", "C1"],
        description: "Unemployment, consumer sentiment and retail sales are stressed together",
    },
    Coupling {
        id: "housing_rates",
        gauges: &["R1", "I1"],
        description: "Housing prices move outside the normal range while the policy rate is high",
    },
    Coupling {
        id: "global_credit",
        gauges: &["F5", "F2"],
        description: "Domestic and US credit spreads are wide together",
    },
    Coupling {
        id: "trade_fx",
        gauges: &["E3", "I4"],
        description: "Trade balance weakness coincides with currency stress",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSignal {
    pub id: String,
    pub gauges: Vec<String>,
    /// Member severities, same order as `gauges`
    pub severities: Vec<Severity>,
    /// Weakest link of the group
    pub severity: Severity,
    pub description: String,
}

pub fn detect(graded: &[GradedGauge]) -> Vec<CrossSignal> {
    detect_with(COUPLINGS, graded)
}

pub fn detect_with(couplings: &[Coupling], graded: &[GradedGauge]) -> Vec<CrossSignal> {
    let severity_of = |id: &str| graded.iter().find(|g| g.gauge_id == id).map(|g| g.severity);

    couplings
        .iter()
        .filter_map(|c| {
            let severities: Vec<Severity> =
                c.gauges.iter().map(|id| severity_of(*id)).collect::<Option<_>>()?;
            if severities.iter().any(|s| *s < COUPLING_FLOOR) {
                return None;
            }
            let signal = CrossSignal {
                id: c.id.to_string(),
                gauges: c.gauges.iter().map(|g| g.to_string()).collect(),
                severity: severities.iter().copied().min().unwrap_or(COUPLING_FLOOR),
                severities,
                description: c.description.to_string(),
            };
            log(
                Level::Info,
                Domain::Signal,
                "cross_signal",
                obj(&[
                    ("signal", v_str(&signal.id)),
                    ("severity", serde_json::json!(signal.severity)),
                ]),
            );
            Some(signal)
        })
        .collect()
}
