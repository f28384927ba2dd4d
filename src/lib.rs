//! Economic gauge engine: resilient indicator ingestion, stale-preserving
//! cache, threshold grading and the dual-lock escalation report.

pub mod actions;
pub mod config;
pub mod connectors;
pub mod cross_signal;
pub mod derived;
pub mod dual_lock;
pub mod fetch;
pub mod gauge;
pub mod grading;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod store;
