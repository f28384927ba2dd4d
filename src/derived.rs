//! Derived gauges: values computed from other gauges resolved this cycle.
//!
//! A derived gauge with any unresolved dependency is `NeedsCalc` for the
//! cycle. It is not retried on its own; the next cycle recomputes it.

use std::collections::HashMap;

use crate::gauge::{ErrorKind, Formula, GaugeRegistry, Observation, SourceKind};

const SOURCE: &str = "derived";

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Evaluate one formula against `(value, prev_value)` pairs.
pub fn evaluate(formula: &Formula, inputs: &HashMap<&str, (f64, Option<f64>)>) -> Option<(f64, Option<f64>)> {
    let get = |id: &str| inputs.get(id).copied();
    match formula {
        Formula::Difference { minuend, subtrahend } => {
            let (a, pa) = get(minuend)?;
            let (b, pb) = get(subtrahend)?;
            Some((a - b, pa.zip(pb).map(|(x, y)| x - y)))
        }
        Formula::Sum { terms } => {
            let mut value = 0.0;
            let mut prev = Some(0.0);
            for term in terms {
                let (v, p) = get(term)?;
                value += v;
                prev = prev.zip(p).map(|(acc, x)| acc + x);
            }
            Some((value, prev))
        }
        Formula::Ratio { numerator, denominator } => {
            let (n, pn) = get(numerator)?;
            let (d, pd) = get(denominator)?;
            if d == 0.0 {
                return None;
            }
            let prev = pn.zip(pd).filter(|(_, y)| *y != 0.0).map(|(x, y)| x / y);
            Some((n / d, prev))
        }
        Formula::PeriodChange { source } => {
            let (current, previous) = get(source)?;
            let previous = previous.filter(|p| *p != 0.0)?;
            Some(((current - previous) / previous * 100.0, None))
        }
    }
}

/// Resolve every derived gauge in the registry from this cycle's direct
/// observations. Derived-on-derived chains resolve in repeated passes.
pub fn resolve(registry: &GaugeRegistry, current: &HashMap<String, Observation>) -> Vec<Observation> {
    let mut resolved: HashMap<String, Observation> = HashMap::new();
    let derived: Vec<_> = registry
        .specs()
        .iter()
        .filter_map(|s| match &s.source {
            SourceKind::Derived(f) => Some((s, f)),
            _ => None,
        })
        .collect();

    loop {
        let mut progressed = false;
        for (spec, formula) in &derived {
            if resolved.contains_key(&spec.id) {
                continue;
            }
            let mut inputs = HashMap::new();
            let mut date = None;
            for dep in formula.dependencies() {
                let obs = current.get(dep).or_else(|| resolved.get(dep));
                if let Some(obs) = obs.filter(|o| o.is_ok()) {
                    if let Some(v) = obs.value {
                        inputs.insert(dep, (v, obs.prev_value));
                        date = date.max(obs.date);
                    }
                }
            }
            if let Some((value, prev)) = evaluate(formula, &inputs) {
                if let Some(date) = date.filter(|_| value.is_finite()) {
                    let obs = Observation::ok(&spec.id, round4(value), prev.map(round4), date, 0, SOURCE);
                    resolved.insert(spec.id.clone(), obs);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    derived
        .iter()
        .map(|(spec, _)| {
            resolved
                .remove(&spec.id)
                .unwrap_or_else(|| Observation::failed(&spec.id, ErrorKind::NeedsCalc, 0, SOURCE))
        })
        .collect()
}
