//! Dual-lock escalation state.
//!
//! Memoryless: the stage is recomputed from the current axis scores every
//! report and can move in either direction between cycles.

use serde::Serialize;

use crate::gauge::AxisGroup;
use crate::grading::{AxisScore, GradedGauge};
use crate::logging::log_dual_lock;

/// Group mean at or above this seals the group.
pub const SEAL_FLOOR: f64 = 3.5;
/// Both groups at or above this while active escalates to crisis.
pub const CRISIS_FLOOR: f64 = 4.5;
/// Any group at or above this leaves `Normal`.
pub const WATCH_FLOOR: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStage {
    Normal,
    Watch,
    Trigger,
    Seal,
    Crisis,
}

impl LockStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStage::Normal => "normal",
            LockStage::Watch => "watch",
            LockStage::Trigger => "trigger",
            LockStage::Seal => "seal",
            LockStage::Crisis => "crisis",
        }
    }
}

/// Where stress currently concentrates: input side (cause), output side
/// (manifest) or context axes (result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalStage {
    Cause,
    Manifest,
    Result,
}

impl CausalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CausalStage::Cause => "cause",
            CausalStage::Manifest => "manifest",
            CausalStage::Result => "result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupScores {
    pub input: f64,
    pub output: f64,
    pub context: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualLock {
    pub active: bool,
    pub input_sealed: bool,
    pub output_sealed: bool,
    pub stage: LockStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal_stage: Option<CausalStage>,
    pub scores: GroupScores,
}

fn group_mean(axes: &[AxisScore], group: AxisGroup) -> f64 {
    let members: Vec<f64> = axes.iter().filter(|a| a.group == group).map(|a| a.severity).collect();
    if members.is_empty() {
        return 0.0;
    }
    members.iter().sum::<f64>() / members.len() as f64
}

/// Ties resolve toward the earlier stage.
fn leading_group(scores: &GroupScores) -> CausalStage {
    if scores.input >= scores.output && scores.input >= scores.context {
        CausalStage::Cause
    } else if scores.output >= scores.context {
        CausalStage::Manifest
    } else {
        CausalStage::Result
    }
}

pub fn evaluate(axes: &[AxisScore], graded: &[GradedGauge]) -> DualLock {
    let scores = GroupScores {
        input: group_mean(axes, AxisGroup::Input),
        output: group_mean(axes, AxisGroup::Output),
        context: group_mean(axes, AxisGroup::Context),
    };
    let input_sealed = scores.input >= SEAL_FLOOR;
    let output_sealed = scores.output >= SEAL_FLOOR;
    let active = input_sealed && output_sealed;
    let any_severe = graded.iter().any(|g| g.severity >= 5);
    let any_watch = [scores.input, scores.output, scores.context]
        .iter()
        .any(|s| *s >= WATCH_FLOOR);

    let stage = if active && scores.input >= CRISIS_FLOOR && scores.output >= CRISIS_FLOOR {
        LockStage::Crisis
    } else if active {
        LockStage::Seal
    } else if input_sealed || output_sealed {
        LockStage::Trigger
    } else if any_watch || any_severe {
        LockStage::Watch
    } else {
        LockStage::Normal
    };

    // Active always carries a causal stage; at least `cause`.
    let causal_stage = match stage {
        LockStage::Normal => None,
        _ => Some(leading_group(&scores)),
    };

    log_dual_lock(stage.as_str(), scores.input, scores.output, active);

    DualLock {
        active,
        input_sealed,
        output_sealed,
        stage,
        causal_stage,
        scores,
    }
}
