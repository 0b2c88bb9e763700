//! Persistent week store
//!
//! Schema:
//! - schedule table: one merged week per (username, week offset), stored as
//!   JSON text with its snapshot division id and last update time
//!
//! Invalidation:
//! - Startup: compare cache_version → auto-clear if mismatch
//! - Window eviction: `delete_except` after every adjacent load
//!
//! Cache Version History:
//! - v1: Initial version

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use omni_types::{Division, ScheduleWeek, MERGED_DIVISION_ID};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Bump when the stored JSON shape of `ScheduleWeek` changes
const CACHE_VERSION: i32 = 1;

/// A persisted week
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWeek {
    pub offset: i32,
    pub week: ScheduleWeek,
    /// Snapshot division id at write time (0 = merged)
    pub division_id: u32,
    pub updated_at: DateTime<Utc>,
}

impl CachedWeek {
    /// Week with legacy unstamped lessons fixed up
    ///
    /// Rows written before lessons carried a division id have every lesson
    /// at 0; they take the row's division id.
    pub fn into_week(self) -> ScheduleWeek {
        let mut week = self.week;
        let unstamped = !week.is_empty()
            && week
                .lessons()
                .all(|l| l.division_id == MERGED_DIVISION_ID);
        if unstamped {
            if let Some(division) = Division::from_id(self.division_id) {
                debug!(offset = self.offset, division = %division, "Restamping legacy week");
                week = week.stamped(division);
            }
        }
        week
    }
}

/// Storage for merged weeks, keyed by (username, offset)
///
/// Synchronous: calls are short and run under the store's own lock.
pub trait WeekStore: Send + Sync {
    fn get(&self, username: &str, offset: i32) -> Result<Option<CachedWeek>>;

    fn put(&self, username: &str, offset: i32, week: &ScheduleWeek) -> Result<()>;

    /// Delete every week of `username` whose offset is not in `keep`
    fn delete_except(&self, username: &str, keep: &[i32]) -> Result<Vec<i32>>;

    /// Stored offsets for `username`, ascending
    fn keys(&self, username: &str) -> Result<Vec<i32>>;

    /// Drop all weeks of `username`
    fn clear(&self, username: &str) -> Result<usize>;
}

/// SQLite-backed week store (thread-safe)
pub struct SqliteWeekStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteWeekStore {
    /// Create or open `<cache_dir>/schedule.db`
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let path = cache_dir.join("schedule.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open week store: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        Self::init(conn, path)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedule (
                username TEXT NOT NULL,
                week INTEGER NOT NULL,
                schedule_json TEXT NOT NULL,
                division_id INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (username, week)
            );
            "#,
        )
        .context("Failed to create schema")?;

        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query store version")?;

        match stored_version {
            Some(v) if v != CACHE_VERSION => {
                warn!(
                    stored = v,
                    current = CACHE_VERSION,
                    "Week store version mismatch, clearing stale weeks"
                );
                conn.execute("DELETE FROM schedule", [])
                    .context("Failed to clear stale weeks")?;
                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to update store version")?;
            }
            None => {
                conn.execute(
                    "INSERT INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to initialize store version")?;
            }
            Some(_) => {}
        }

        debug!(path = %path.display(), "Week store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Week store lock poisoned: {}", e))
    }
}

fn stored_keys(conn: &Connection, username: &str) -> Result<Vec<i32>> {
    let mut stmt = conn
        .prepare("SELECT week FROM schedule WHERE username = ? ORDER BY week")
        .context("Failed to prepare query")?;
    let rows = stmt
        .query_map(params![username], |row| row.get(0))
        .context("Failed to query week keys")?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row.context("Failed to read row")?);
    }
    Ok(keys)
}

impl WeekStore for SqliteWeekStore {
    fn get(&self, username: &str, offset: i32) -> Result<Option<CachedWeek>> {
        let conn = self.lock()?;
        let row: Option<(String, u32, String)> = conn
            .query_row(
                "SELECT schedule_json, division_id, updated_at FROM schedule
                 WHERE username = ? AND week = ?",
                params![username, offset],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to query week")?;

        let Some((json, division_id, updated_at)) = row else {
            debug!(offset, "Week store miss");
            return Ok(None);
        };

        let week: ScheduleWeek = serde_json::from_str(&json)
            .with_context(|| format!("Failed to decode stored week {}", offset))?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        debug!(offset, "Week store hit");
        Ok(Some(CachedWeek {
            offset,
            week,
            division_id,
            updated_at,
        }))
    }

    fn put(&self, username: &str, offset: i32, week: &ScheduleWeek) -> Result<()> {
        let json = serde_json::to_string(week).context("Failed to serialize week")?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO schedule
             (username, week, schedule_json, division_id, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                username,
                offset,
                json,
                week.division_id,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert week")?;

        debug!(offset, lessons = week.lesson_count(), "Week stored");
        Ok(())
    }

    fn delete_except(&self, username: &str, keep: &[i32]) -> Result<Vec<i32>> {
        // Scan and delete under one lock
        let conn = self.lock()?;
        let stale: Vec<i32> = stored_keys(&conn, username)?
            .into_iter()
            .filter(|k| !keep.contains(k))
            .collect();
        if stale.is_empty() {
            return Ok(stale);
        }

        let sql = if keep.is_empty() {
            "DELETE FROM schedule WHERE username = ?".to_string()
        } else {
            let placeholders = vec!["?"; keep.len()].join(", ");
            format!(
                "DELETE FROM schedule WHERE username = ? AND week NOT IN ({})",
                placeholders
            )
        };

        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(username.to_string())];
        values.extend(keep.iter().map(|k| rusqlite::types::Value::Integer(*k as i64)));

        conn.execute(&sql, params_from_iter(values))
            .context("Failed to evict weeks")?;

        debug!(evicted = ?stale, "Evicted weeks outside window");
        Ok(stale)
    }

    fn keys(&self, username: &str) -> Result<Vec<i32>> {
        let conn = self.lock()?;
        stored_keys(&conn, username)
    }

    fn clear(&self, username: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM schedule WHERE username = ?", params![username])
            .context("Failed to clear weeks")?;
        debug!(removed, "Week store cleared");
        Ok(removed)
    }
}

impl Drop for SqliteWeekStore {
    fn drop(&mut self) {
        // Flush WAL into the main file so it does not grow across restarts
        if let Ok(conn) = self.conn.lock() {
            if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
                warn!("Failed to checkpoint WAL on week store drop: {}", e);
            }
        }
    }
}

/// In-process week store
#[derive(Default)]
pub struct MemoryWeekStore {
    weeks: parking_lot::Mutex<BTreeMap<(String, i32), CachedWeek>>,
}

impl MemoryWeekStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row exactly as given (used to seed legacy rows)
    pub fn insert_raw(&self, username: &str, cached: CachedWeek) {
        self.weeks
            .lock()
            .insert((username.to_string(), cached.offset), cached);
    }
}

impl WeekStore for MemoryWeekStore {
    fn get(&self, username: &str, offset: i32) -> Result<Option<CachedWeek>> {
        Ok(self
            .weeks
            .lock()
            .get(&(username.to_string(), offset))
            .cloned())
    }

    fn put(&self, username: &str, offset: i32, week: &ScheduleWeek) -> Result<()> {
        self.insert_raw(
            username,
            CachedWeek {
                offset,
                week: week.clone(),
                division_id: week.division_id,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete_except(&self, username: &str, keep: &[i32]) -> Result<Vec<i32>> {
        let mut weeks = self.weeks.lock();
        let stale: Vec<i32> = weeks
            .keys()
            .filter(|(user, offset)| user == username && !keep.contains(offset))
            .map(|(_, offset)| *offset)
            .collect();
        for offset in &stale {
            weeks.remove(&(username.to_string(), *offset));
        }
        Ok(stale)
    }

    fn keys(&self, username: &str) -> Result<Vec<i32>> {
        Ok(self
            .weeks
            .lock()
            .keys()
            .filter(|(user, _)| user == username)
            .map(|(_, offset)| *offset)
            .collect())
    }

    fn clear(&self, username: &str) -> Result<usize> {
        let mut weeks = self.weeks.lock();
        let before = weeks.len();
        weeks.retain(|(user, _), _| user != username);
        Ok(before - weeks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_types::Lesson;
    use tempfile::tempdir;

    fn lesson(division_id: u32) -> Lesson {
        Lesson {
            period: "1".to_string(),
            weekday: "1".to_string(),
            group: "G".to_string(),
            room: "1".to_string(),
            subject: "Math".to_string(),
            start: "09:00".to_string(),
            end: "10:30".to_string(),
            division_id,
            id_form: None,
            lessons_count: None,
            activity_type_id: None,
            entity_id: None,
            schedule_type: None,
            event_name: None,
            event_subtype_name: None,
        }
    }

    fn week(division_id: u32, lesson_division: u32) -> ScheduleWeek {
        let mut week = ScheduleWeek {
            division_id,
            ..Default::default()
        };
        week.body
            .entry("1".to_string())
            .or_default()
            .insert("1".to_string(), lesson(lesson_division));
        week
    }

    #[test]
    fn test_sqlite_put_get() {
        let dir = tempdir().unwrap();
        let store = SqliteWeekStore::new(dir.path()).unwrap();

        let stored = week(0, 74);
        store.put("alice", 2, &stored).unwrap();

        let cached = store.get("alice", 2).unwrap().unwrap();
        assert_eq!(cached.week, stored);
        assert_eq!(cached.division_id, 0);
        assert!(store.get("alice", 3).unwrap().is_none());
        assert!(store.get("bob", 2).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_delete_except_is_per_user() {
        let store = SqliteWeekStore::in_memory().unwrap();
        for offset in 0..10 {
            store.put("alice", offset, &week(0, 74)).unwrap();
        }
        store.put("bob", 0, &week(0, 74)).unwrap();

        let evicted = store.delete_except("alice", &[3, 4, 5, 6, 7]).unwrap();
        assert_eq!(evicted, vec![0, 1, 2, 8, 9]);
        assert_eq!(store.keys("alice").unwrap(), vec![3, 4, 5, 6, 7]);
        assert_eq!(store.keys("bob").unwrap(), vec![0]);
    }

    #[test]
    fn test_sqlite_delete_except_empty_keep() {
        let store = SqliteWeekStore::in_memory().unwrap();
        store.put("alice", -1, &week(0, 74)).unwrap();
        store.put("alice", 1, &week(0, 74)).unwrap();

        store.delete_except("alice", &[]).unwrap();
        assert!(store.keys("alice").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_delete_except_reports_every_removed_week_under_concurrent_puts() {
        let store = std::sync::Arc::new(SqliteWeekStore::in_memory().unwrap());
        let writer = {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                for offset in 100..300 {
                    store.put("alice", offset, &week(0, 74)).unwrap();
                }
            })
        };

        let mut evicted = Vec::new();
        while !writer.is_finished() {
            evicted.extend(store.delete_except("alice", &[]).unwrap());
        }
        writer.join().unwrap();
        evicted.extend(store.delete_except("alice", &[]).unwrap());

        evicted.sort_unstable();
        assert_eq!(evicted, (100..300).collect::<Vec<_>>());
        assert!(store.keys("alice").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteWeekStore::new(dir.path()).unwrap();
            store.put("alice", 0, &week(458, 458)).unwrap();
        }
        let store = SqliteWeekStore::new(dir.path()).unwrap();
        assert_eq!(store.keys("alice").unwrap(), vec![0]);
        assert_eq!(store.clear("alice").unwrap(), 1);
        assert!(store.keys("alice").unwrap().is_empty());
    }

    #[test]
    fn test_legacy_row_is_restamped() {
        let cached = CachedWeek {
            offset: 0,
            week: week(458, 0),
            division_id: 458,
            updated_at: Utc::now(),
        };
        let restored = cached.into_week();
        assert!(restored.lessons().all(|l| l.division_id == 458));
    }

    #[test]
    fn test_merged_legacy_row_left_alone() {
        let cached = CachedWeek {
            offset: 0,
            week: week(0, 0),
            division_id: 0,
            updated_at: Utc::now(),
        };
        let restored = cached.into_week();
        assert!(restored.lessons().all(|l| l.division_id == 0));
    }

    #[test]
    fn test_memory_store_matches_sqlite_semantics() {
        let store = MemoryWeekStore::new();
        for offset in [1, 2, 3] {
            store.put("alice", offset, &week(0, 74)).unwrap();
        }
        store.put("bob", 9, &week(0, 74)).unwrap();

        assert_eq!(store.delete_except("alice", &[2]).unwrap(), vec![1, 3]);
        assert_eq!(store.keys("alice").unwrap(), vec![2]);
        assert_eq!(store.clear("bob").unwrap(), 1);
    }
}
