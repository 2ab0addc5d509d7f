use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::db::SystemId;
use crate::error::Result;

/// PvP activity observed in one system over the kill window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskSample {
    pub system_id: SystemId,
    pub pvp_kills: u32,
    pub sampled_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl RiskSample {
    /// Create a sample; `sampled_at` is truncated to whole milliseconds,
    /// the precision kept on disk.
    pub fn new(system_id: SystemId, pvp_kills: u32, sampled_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            system_id,
            pvp_kills,
            sampled_at: truncate_to_millis(sampled_at),
            ttl,
        }
    }

    /// Whether the sample may still be served at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.sampled_at).to_std() {
            Ok(age) => age < self.ttl,
            // Sampled "in the future": clock moved backwards, keep it.
            Err(_) => true,
        }
    }
}

fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or(timestamp)
}

struct CacheState {
    samples: HashMap<SystemId, RiskSample>,
    store: Option<Connection>,
}

/// Risk telemetry cache shared by every planning request.
///
/// Samples live in memory and are written through to a SQLite file so a
/// restarted process starts warm. All access goes through one mutex.
pub struct RouteCache {
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RouteCache")
            .field("samples", &state.samples.len())
            .field("persistent", &state.store.is_some())
            .finish()
    }
}

impl RouteCache {
    /// Open (or create) a persistent cache at `path` and load its samples.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        let cache = Self::with_store(connection)?;
        info!(
            path = %path.display(),
            samples = cache.len(),
            "risk cache opened"
        );
        Ok(cache)
    }

    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(CacheState {
                samples: HashMap::new(),
                store: None,
            }),
        }
    }

    fn with_store(connection: Connection) -> Result<Self> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS risk_samples (
                system_id INTEGER PRIMARY KEY,
                pvp_kills INTEGER NOT NULL,
                sampled_at_ms INTEGER NOT NULL,
                ttl_secs INTEGER NOT NULL
            )",
        )?;

        let mut samples = HashMap::new();
        {
            let mut stmt = connection
                .prepare("SELECT system_id, pvp_kills, sampled_at_ms, ttl_secs FROM risk_samples")?;
            let rows = stmt.query_map([], |row| {
                let system_id: SystemId = row.get(0)?;
                let pvp_kills: u32 = row.get(1)?;
                let sampled_at_ms: i64 = row.get(2)?;
                let ttl_secs: u64 = row.get(3)?;
                Ok((system_id, pvp_kills, sampled_at_ms, ttl_secs))
            })?;
            for row in rows {
                let (system_id, pvp_kills, sampled_at_ms, ttl_secs) = row?;
                let Some(sampled_at) = DateTime::from_timestamp_millis(sampled_at_ms) else {
                    debug!(system_id, sampled_at_ms, "skipping cached sample with bad timestamp");
                    continue;
                };
                samples.insert(
                    system_id,
                    RiskSample::new(system_id, pvp_kills, sampled_at, Duration::from_secs(ttl_secs)),
                );
            }
        }

        Ok(Self {
            state: Mutex::new(CacheState {
                samples,
                store: Some(connection),
            }),
        })
    }

    /// Cached sample for `system_id` and whether it is still fresh.
    pub fn get(&self, system_id: SystemId) -> Option<(RiskSample, bool)> {
        self.get_at(system_id, Utc::now())
    }

    /// As [`RouteCache::get`], judging freshness at `now`.
    pub fn get_at(&self, system_id: SystemId, now: DateTime<Utc>) -> Option<(RiskSample, bool)> {
        let state = self.state.lock();
        state.samples.get(&system_id).map(|sample| {
            let fresh = sample.is_fresh_at(now);
            (sample.clone(), fresh)
        })
    }

    /// Store `sample`, replacing any previous entry for the system.
    ///
    /// Memory is updated even when the disk write fails.
    pub fn put(&self, sample: RiskSample) -> Result<()> {
        self.put_many(std::slice::from_ref(&sample))
    }

    /// Store several samples, writing them to disk in one transaction.
    ///
    /// Blocks on SQLite; async callers run it on the blocking pool.
    pub fn put_many(&self, samples: &[RiskSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for sample in samples {
            state.samples.insert(sample.system_id, sample.clone());
        }
        if let Some(store) = state.store.as_mut() {
            let tx = store.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO risk_samples (system_id, pvp_kills, sampled_at_ms, ttl_secs)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for sample in samples {
                    stmt.execute(params![
                        sample.system_id,
                        sample.pvp_kills,
                        sample.sampled_at.timestamp_millis(),
                        sample.ttl.as_secs() as i64,
                    ])?;
                }
            }
            tx.commit()?;
        }
        debug!(samples = samples.len(), "risk samples stored");
        Ok(())
    }

    /// Drop every sample, in memory and on disk.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.samples.clear();
        if let Some(store) = &state.store {
            store.execute("DELETE FROM risk_samples", [])?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
