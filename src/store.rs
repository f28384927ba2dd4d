//! Gauge data store with stale-preserving merge.
//!
//! Lifecycle: `init` (load from the backend) → `merge`/read → `shutdown`
//! (flush). The store is owned by the single coordinating task; there is
//! exactly one writer path (`merge`) so no locking is needed.
//!
//! A failed refresh never erases a known-good value. It only marks the entry
//! stale/fallback. Entries leave the cache only by explicit removal, never
//! through TTL expiry, which merely flags a refresh as overdue.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{now_ts, ttl_label};
use crate::gauge::{ErrorKind, ObsStatus, Observation};
use crate::logging::log_merge;
use crate::storage::{CacheBackend, MemoryBackend, SnapshotKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub gauge_id: String,
    /// Last known-good value
    pub value: f64,
    pub prev_value: Option<f64>,
    pub date: Option<NaiveDate>,
    /// Status of the most recent attempt
    pub status: ObsStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    pub latency_ms: u64,
    pub source: String,
    pub is_fallback: bool,
    pub stale: bool,
    pub stale_age_sec: u64,
    /// Epoch seconds of the last successful overwrite
    pub updated_at: u64,
}

impl CacheEntry {
    fn from_observation(obs: &Observation, value: f64, now: u64) -> Self {
        Self {
            gauge_id: obs.gauge_id.clone(),
            value,
            prev_value: obs.prev_value,
            date: obs.date,
            status: ObsStatus::Ok,
            last_error: None,
            latency_ms: obs.latency_ms,
            source: obs.source.clone(),
            is_fallback: false,
            stale: false,
            stale_age_sec: 0,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub stored: usize,
    pub preserved: usize,
    /// Failures with no prior entry; these gauges stay absent
    pub absent: usize,
}

/// Operational summary for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub total: usize,
    pub ok: usize,
    pub stale: usize,
    pub fallback: usize,
    pub last_fetch: Option<String>,
    pub ttl_label: String,
    pub expired: bool,
}

pub struct DataStore {
    backend: Box<dyn CacheBackend>,
    entries: BTreeMap<String, CacheEntry>,
    ttl_secs: u64,
    last_fetch: Option<u64>,
}

impl DataStore {
    pub fn new(backend: Box<dyn CacheBackend>, ttl_secs: u64) -> Self {
        Self {
            backend,
            entries: BTreeMap::new(),
            ttl_secs,
            last_fetch: None,
        }
    }

    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(Box::new(MemoryBackend::default()), ttl_secs)
    }

    /// Prepare the backend and load persisted entries.
    pub fn init(&mut self) -> Result<()> {
        self.backend.init()?;
        self.entries = self
            .backend
            .load_entries()?
            .into_iter()
            .map(|e| (e.gauge_id.clone(), e))
            .collect();
        self.last_fetch = self.backend.load_last_fetch()?;
        Ok(())
    }

    pub fn merge(&mut self, observations: &HashMap<String, Observation>) -> MergeStats {
        self.merge_at(observations, now_ts())
    }

    pub fn merge_at(&mut self, observations: &HashMap<String, Observation>, now: u64) -> MergeStats {
        let mut stats = MergeStats::default();
        for (id, obs) in observations {
            if obs.is_ok() {
                if let Some(value) = obs.value {
                    self.entries
                        .insert(id.clone(), CacheEntry::from_observation(obs, value, now));
                    stats.stored += 1;
                    continue;
                }
            }

            // OK with no usable value counts as no data
            let (status, error) = match obs.status {
                ObsStatus::Ok => (ObsStatus::NoData, ErrorKind::NoData),
                s => (s, obs.error.unwrap_or(ErrorKind::NoData)),
            };
            match self.entries.get_mut(id) {
                Some(entry) => {
                    entry.stale = true;
                    entry.is_fallback = true;
                    entry.status = status;
                    entry.last_error = Some(error);
                    entry.stale_age_sec = now.saturating_sub(entry.updated_at);
                    if status != ObsStatus::NoData {
                        stats.preserved += 1;
                    }
                }
                None => stats.absent += 1,
            }
        }
        log_merge(stats.stored, stats.preserved, stats.absent);
        stats
    }

    /// Record that a refresh cycle completed at `now`.
    pub fn mark_fetched(&mut self, now: u64) -> Result<()> {
        self.last_fetch = Some(now);
        self.backend.save_last_fetch(now)
    }

    /// Refresh is overdue once the TTL has elapsed since the last cycle.
    /// Never removes entries.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.last_fetch {
            Some(t) => now.saturating_sub(t) >= self.ttl_secs,
            None => true,
        }
    }

    pub fn get(&self, gauge_id: &str) -> Option<&CacheEntry> {
        self.entries.get(gauge_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only copy for report generation, with stale ages as of `now`.
    pub fn snapshot_at(&self, now: u64) -> Vec<CacheEntry> {
        self.entries
            .values()
            .map(|e| {
                let mut e = e.clone();
                if e.stale {
                    e.stale_age_sec = now.saturating_sub(e.updated_at);
                }
                e
            })
            .collect()
    }

    pub fn status(&self, now: u64) -> CacheStatus {
        let stale = self.entries.values().filter(|e| e.stale).count();
        let fallback = self.entries.values().filter(|e| e.is_fallback).count();
        CacheStatus {
            total: self.entries.len(),
            ok: self.entries.len() - stale,
            stale,
            fallback,
            last_fetch: self
                .last_fetch
                .and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0))
                .map(|t| t.to_rfc3339()),
            ttl_label: ttl_label(self.ttl_secs),
            expired: self.is_expired(now),
        }
    }

    /// Archive the entries whose latest refresh succeeded under `key`.
    pub fn archive_snapshot(&mut self, key: &SnapshotKey, now: u64) -> Result<usize> {
        let values: Vec<(String, f64)> = self
            .entries
            .values()
            .filter(|e| e.status == ObsStatus::Ok && !e.stale)
            .map(|e| (e.gauge_id.clone(), e.value))
            .collect();
        self.backend.archive(key, now, &values)?;
        Ok(values.len())
    }

    pub fn get_snapshot(&mut self, key: &SnapshotKey) -> Result<HashMap<String, f64>> {
        self.backend.load_archive(key)
    }

    pub fn flush(&mut self) -> Result<()> {
        let entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        self.backend.save_entries(&entries)
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.flush()
    }
}
