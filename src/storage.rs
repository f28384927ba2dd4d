//! Persistence backends for the gauge cache and the snapshot archive.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::gauge::{ErrorKind, ObsStatus};
use crate::store::CacheEntry;

/// `(country, period_mode, period_label)`, e.g. `("KR", "monthly", "2026-09")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub country: String,
    pub period_mode: String,
    pub period_label: String,
}

impl SnapshotKey {
    pub fn new(country: &str, period_mode: &str, period_label: &str) -> Self {
        Self {
            country: country.to_uppercase(),
            period_mode: period_mode.to_string(),
            period_label: period_label.to_string(),
        }
    }
}

pub trait CacheBackend: Send {
    fn init(&mut self) -> Result<()>;

    fn load_entries(&mut self) -> Result<Vec<CacheEntry>>;

    fn save_entries(&mut self, entries: &[CacheEntry]) -> Result<()>;

    fn load_last_fetch(&mut self) -> Result<Option<u64>>;

    fn save_last_fetch(&mut self, ts: u64) -> Result<()>;

    fn archive(&mut self, key: &SnapshotKey, archived_at: u64, values: &[(String, f64)]) -> Result<()>;

    /// Most recently archived value per gauge id under `key`.
    fn load_archive(&mut self, key: &SnapshotKey) -> Result<HashMap<String, f64>>;
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Vec<CacheEntry>,
    last_fetch: Option<u64>,
    archive: Vec<(SnapshotKey, u64, String, f64)>,
}

impl CacheBackend for MemoryBackend {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn load_entries(&mut self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.clone())
    }

    fn save_entries(&mut self, entries: &[CacheEntry]) -> Result<()> {
        self.entries = entries.to_vec();
        Ok(())
    }

    fn load_last_fetch(&mut self) -> Result<Option<u64>> {
        Ok(self.last_fetch)
    }

    fn save_last_fetch(&mut self, ts: u64) -> Result<()> {
        self.last_fetch = Some(ts);
        Ok(())
    }

    fn archive(&mut self, key: &SnapshotKey, archived_at: u64, values: &[(String, f64)]) -> Result<()> {
        for (id, v) in values {
            self.archive.push((key.clone(), archived_at, id.clone(), *v));
        }
        Ok(())
    }

    fn load_archive(&mut self, key: &SnapshotKey) -> Result<HashMap<String, f64>> {
        let mut rows: Vec<_> = self.archive.iter().filter(|(k, ..)| k == key).collect();
        // stable sort keeps insertion order within the same second
        rows.sort_by_key(|(_, ts, ..)| *ts);
        Ok(rows.into_iter().map(|(_, _, id, v)| (id.clone(), *v)).collect())
    }
}

// =============================================================================
// SQLite backend
// =============================================================================

pub struct SqliteBackend {
    conn: Connection,
}

fn error_code(kind: &ErrorKind) -> Option<String> {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

fn parse_error_code(code: &str) -> Option<ErrorKind> {
    serde_json::from_value(Value::String(code.to_string())).ok()
}

impl SqliteBackend {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }
}

impl CacheBackend for SqliteBackend {
    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS cache_entries (
                gauge_id TEXT PRIMARY KEY,
                value REAL NOT NULL,
                prev_value REAL,
                obs_date TEXT,
                status TEXT NOT NULL,
                last_error TEXT,
                latency_ms INTEGER NOT NULL,
                source TEXT NOT NULL,
                is_fallback INTEGER NOT NULL,
                stale INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS snapshot_archive (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                country TEXT NOT NULL,
                period_mode TEXT NOT NULL,
                period_label TEXT NOT NULL,
                gauge_id TEXT NOT NULL,
                value REAL NOT NULL,
                archived_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS snapshot_archive_key
                ON snapshot_archive (country, period_mode, period_label);
            CREATE TABLE IF NOT EXISTS cache_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    fn load_entries(&mut self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT gauge_id, value, prev_value, obs_date, status, last_error, latency_ms,
                    source, is_fallback, stale, updated_at
             FROM cache_entries ORDER BY gauge_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let obs_date: Option<String> = row.get(3)?;
            let status: String = row.get(4)?;
            let last_error: Option<String> = row.get(5)?;
            let latency_ms: i64 = row.get(6)?;
            let updated_at: i64 = row.get(10)?;
            Ok(CacheEntry {
                gauge_id: row.get(0)?,
                value: row.get(1)?,
                prev_value: row.get(2)?,
                date: obs_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                status: ObsStatus::from_str_lossy(&status),
                last_error: last_error.as_deref().and_then(parse_error_code),
                latency_ms: latency_ms.max(0) as u64,
                source: row.get(7)?,
                is_fallback: row.get::<_, i64>(8)? != 0,
                stale: row.get::<_, i64>(9)? != 0,
                stale_age_sec: 0,
                updated_at: updated_at.max(0) as u64,
            })
        })?;
        let mut out = Vec::new();
        for entry in rows {
            out.push(entry?);
        }
        Ok(out)
    }

    fn save_entries(&mut self, entries: &[CacheEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM cache_entries", [])?;
        for e in entries {
            tx.execute(
                "INSERT INTO cache_entries (gauge_id, value, prev_value, obs_date, status, last_error,
                    latency_ms, source, is_fallback, stale, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    e.gauge_id,
                    e.value,
                    e.prev_value,
                    e.date.map(|d| d.format("%Y-%m-%d").to_string()),
                    e.status.as_str(),
                    e.last_error.as_ref().and_then(error_code),
                    e.latency_ms as i64,
                    e.source,
                    e.is_fallback as i64,
                    e.stale as i64,
                    e.updated_at as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_last_fetch(&mut self) -> Result<Option<u64>> {
        let ts: Option<i64> = self
            .conn
            .query_row("SELECT value FROM cache_meta WHERE key = 'last_fetch'", [], |r| r.get(0))
            .optional()?;
        Ok(ts.map(|t| t.max(0) as u64))
    }

    fn save_last_fetch(&mut self, ts: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES ('last_fetch', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ts as i64],
        )?;
        Ok(())
    }

    fn archive(&mut self, key: &SnapshotKey, archived_at: u64, values: &[(String, f64)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (id, v) in values {
            tx.execute(
                "INSERT INTO snapshot_archive (country, period_mode, period_label, gauge_id, value, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![key.country, key.period_mode, key.period_label, id, v, archived_at as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_archive(&mut self, key: &SnapshotKey) -> Result<HashMap<String, f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT gauge_id, value FROM snapshot_archive
             WHERE country = ?1 AND period_mode = ?2 AND period_label = ?3
             ORDER BY archived_at ASC, seq ASC",
        )?;
        let rows = stmt.query_map(params![key.country, key.period_mode, key.period_label], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (id, v) = row?;
            out.insert(id, v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, value: f64) -> CacheEntry {
        CacheEntry {
            gauge_id: id.to_string(),
            value,
            prev_value: Some(value - 1.0),
            date: NaiveDate::from_ymd_opt(2026, 10, 15),
            status: ObsStatus::ApiError,
            last_error: Some(ErrorKind::RateLimited),
            latency_ms: 120,
            source: "ecos".to_string(),
            is_fallback: true,
            stale: true,
            stale_age_sec: 0,
            updated_at: 1_000,
        }
    }

    #[test]
    fn test_sqlite_entries_roundtrip() {
        let mut backend = SqliteBackend::in_memory().unwrap();
        backend.init().unwrap();
        backend.save_entries(&[entry("I4", 1453.0), entry("P1", 2.0)]).unwrap();
        let loaded = backend.load_entries().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].gauge_id, "I4");
        assert_eq!(loaded[0].last_error, Some(ErrorKind::RateLimited));
        assert_eq!(loaded[0].status, ObsStatus::ApiError);
        assert!(loaded[0].stale);
    }

    #[test]
    fn test_sqlite_last_fetch_upsert() {
        let mut backend = SqliteBackend::in_memory().unwrap();
        backend.init().unwrap();
        assert_eq!(backend.load_last_fetch().unwrap(), None);
        backend.save_last_fetch(10).unwrap();
        backend.save_last_fetch(20).unwrap();
        assert_eq!(backend.load_last_fetch().unwrap(), Some(20));
    }

    #[test]
    fn test_archive_latest_wins() {
        for mut backend in [
            Box::new(SqliteBackend::in_memory().unwrap()) as Box<dyn CacheBackend>,
            Box::new(MemoryBackend::default()) as Box<dyn CacheBackend>,
        ] {
            backend.init().unwrap();
            let key = SnapshotKey::new("kr", "monthly", "2026-09");
            backend.archive(&key, 100, &[("I4".into(), 1400.0), ("P1".into(), 2.1)]).unwrap();
            backend.archive(&key, 200, &[("I4".into(), 1453.0)]).unwrap();
            let other = SnapshotKey::new("KR", "monthly", "2026-08");
            backend.archive(&other, 300, &[("I4".into(), 1.0)]).unwrap();

            let snap = backend.load_archive(&key).unwrap();
            assert_eq!(snap.len(), 2);
            assert_eq!(snap["I4"], 1453.0);
            assert_eq!(snap["P1"], 2.1);
        }
    }
}
