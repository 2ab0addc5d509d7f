//! Per-hop PvP risk annotation.
//!
//! Fresh cached samples are served directly. Everything else is fetched from
//! the kill-statistics endpoint in small concurrent batches with a pause in
//! between, so the upstream rate limit is respected. Telemetry failures never
//! fail a route: the hop falls back to a stale sample or is marked unknown.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{RiskSample, RouteCache};
use crate::config::PlannerConfig;
use crate::db::SystemId;
use crate::error::{Error, Result};
use crate::http::RetryingClient;

/// Where a hop's risk figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    /// Fetched during this request.
    Live,
    /// Served from a fresh cache entry.
    Cache,
    /// Fetch failed; an expired cache entry was used instead.
    Stale,
    /// Fetch failed and nothing was cached.
    Unknown,
}

impl fmt::Display for RiskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RiskSource::Live => "live",
            RiskSource::Cache => "cache",
            RiskSource::Stale => "stale",
            RiskSource::Unknown => "unknown",
        };
        f.write_str(value)
    }
}

/// Coarse bucket of recent PvP activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Quiet,
    Active,
    Hot,
    Unknown,
}

impl ActivityLevel {
    pub fn from_kills(pvp_kills: Option<u32>) -> Self {
        match pvp_kills {
            None => ActivityLevel::Unknown,
            Some(0) => ActivityLevel::Quiet,
            Some(1..=4) => ActivityLevel::Active,
            Some(_) => ActivityLevel::Hot,
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ActivityLevel::Quiet => "quiet",
            ActivityLevel::Active => "active",
            ActivityLevel::Hot => "hot",
            ActivityLevel::Unknown => "unknown",
        };
        f.write_str(value)
    }
}

/// Risk figure attached to one hop of a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAnnotation {
    pub system_id: SystemId,
    /// `None` when no telemetry could be obtained.
    pub pvp_kills: Option<u32>,
    pub sampled_at: Option<DateTime<Utc>>,
    pub source: RiskSource,
}

impl RiskAnnotation {
    fn from_sample(sample: &RiskSample, source: RiskSource) -> Self {
        Self {
            system_id: sample.system_id,
            pvp_kills: Some(sample.pvp_kills),
            sampled_at: Some(sample.sampled_at),
            source,
        }
    }

    pub(crate) fn unknown(system_id: SystemId) -> Self {
        Self {
            system_id,
            pvp_kills: None,
            sampled_at: None,
            source: RiskSource::Unknown,
        }
    }

    pub fn activity(&self) -> ActivityLevel {
        ActivityLevel::from_kills(self.pvp_kills)
    }

    /// True when the figure is not current (stale or missing).
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, RiskSource::Stale | RiskSource::Unknown)
    }
}

/// Kill summary as returned by the kill-statistics endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KillSummary {
    #[serde(default)]
    pub zkb: Option<KillFlags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KillFlags {
    #[serde(default)]
    pub npc: bool,
}

/// Number of player-caused kills; summaries without flags are not counted.
pub fn count_pvp_kills(kills: &[KillSummary]) -> u32 {
    let count = kills
        .iter()
        .filter(|kill| kill.zkb.as_ref().is_some_and(|flags| !flags.npc))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Resolves risk for the systems of a route.
#[derive(Debug, Clone)]
pub struct RiskAnnotator {
    client: RetryingClient,
    cache: Arc<RouteCache>,
    kills_url: String,
    kill_window: Duration,
    ttl: Duration,
    batch_size: usize,
    batch_pause: Duration,
}

impl RiskAnnotator {
    pub fn new(client: RetryingClient, cache: Arc<RouteCache>, config: &PlannerConfig) -> Self {
        Self {
            client,
            cache,
            kills_url: config.kills_url.trim_end_matches('/').to_string(),
            kill_window: config.kill_window,
            ttl: config.risk_ttl,
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause,
        }
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        &self.cache
    }

    /// Endpoint queried for `system_id`.
    pub fn kills_url_for(&self, system_id: SystemId) -> String {
        format!(
            "{base}/{system_id}/pastSeconds/{secs}/",
            base = self.kills_url,
            secs = self.kill_window.as_secs()
        )
    }

    /// Annotate every system of `path`, returning one entry per element in
    /// path order.
    ///
    /// Fails only with [`Error::Cancelled`]. Results of a cancelled run are
    /// never written to the cache.
    pub async fn annotate(
        &self,
        path: &[SystemId],
        cancel: &CancellationToken,
    ) -> Result<Vec<RiskAnnotation>> {
        let mut resolved: HashMap<SystemId, RiskAnnotation> = HashMap::with_capacity(path.len());
        let mut pending = Vec::new();
        let mut stale: HashMap<SystemId, RiskSample> = HashMap::new();
        let mut seen = HashSet::new();

        for &system_id in path {
            if !seen.insert(system_id) {
                continue;
            }
            match self.cache.get(system_id) {
                Some((sample, true)) => {
                    resolved.insert(system_id, RiskAnnotation::from_sample(&sample, RiskSource::Cache));
                }
                Some((sample, false)) => {
                    stale.insert(system_id, sample);
                    pending.push(system_id);
                }
                None => pending.push(system_id),
            }
        }

        debug!(
            systems = seen.len(),
            cached = resolved.len(),
            to_fetch = pending.len(),
            "annotating route"
        );

        for (index, batch) in pending.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.batch_pause) => {}
                }
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|&system_id| self.fetch_one(system_id, stale.get(&system_id), cancel)),
            )
            .await;
            let mut fetched = Vec::with_capacity(batch.len());
            for outcome in results {
                let (annotation, sample) = outcome?;
                fetched.extend(sample);
                resolved.insert(annotation.system_id, annotation);
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.persist(fetched).await;
        }

        let degraded = resolved.values().filter(|a| a.is_degraded()).count();
        if degraded > 0 {
            info!(degraded, "route risk partially unavailable");
        }

        Ok(path
            .iter()
            .map(|id| {
                resolved
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| RiskAnnotation::unknown(*id))
            })
            .collect())
    }

    /// Fetch one system; a live result also yields the sample to cache.
    async fn fetch_one(
        &self,
        system_id: SystemId,
        stale: Option<&RiskSample>,
        cancel: &CancellationToken,
    ) -> Result<(RiskAnnotation, Option<RiskSample>)> {
        let url = self.kills_url_for(system_id);
        match self.client.get_json::<Vec<KillSummary>>(&url, cancel).await {
            Ok(kills) => {
                let sample = RiskSample::new(system_id, count_pvp_kills(&kills), Utc::now(), self.ttl);
                let annotation = RiskAnnotation::from_sample(&sample, RiskSource::Live);
                Ok((annotation, Some(sample)))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                warn!(system_id, error = %err, "risk telemetry unavailable");
                let annotation = match stale {
                    Some(sample) => RiskAnnotation::from_sample(sample, RiskSource::Stale),
                    None => RiskAnnotation::unknown(system_id),
                };
                Ok((annotation, None))
            }
        }
    }

    /// Write a batch of live samples through the cache off the async workers.
    async fn persist(&self, samples: Vec<RiskSample>) {
        if samples.is_empty() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.put_many(&samples)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "failed to persist risk samples"),
            Err(err) => warn!(error = %err, "risk cache writer did not finish"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use reqwest::StatusCode;

    use super::*;
    use crate::http::testing::{Scripted, ScriptedTransport};
    use crate::http::RetryPolicy;

    const KILLS: &str = "http://kills.test";

    fn annotator(transport: Arc<ScriptedTransport>, cache: Arc<RouteCache>) -> RiskAnnotator {
        let config = PlannerConfig {
            kills_url: format!("{KILLS}/"),
            batch_size: 2,
            batch_pause: Duration::from_millis(1),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(10),
                multiplier: 2.0,
                request_timeout: Duration::from_millis(200),
            },
            ..PlannerConfig::default()
        };
        let client = RetryingClient::new(transport, config.retry.clone());
        RiskAnnotator::new(client, cache, &config)
    }

    fn kills_body(pvp: usize, npc: usize) -> String {
        let mut kills = Vec::new();
        kills.extend((0..pvp).map(|_| r#"{"zkb":{"npc":false}}"#));
        kills.extend((0..npc).map(|_| r#"{"zkb":{"npc":true}}"#));
        format!("[{}]", kills.join(","))
    }

    #[test]
    fn activity_levels_bucket_kill_counts() {
        assert_eq!(ActivityLevel::from_kills(None), ActivityLevel::Unknown);
        assert_eq!(ActivityLevel::from_kills(Some(0)), ActivityLevel::Quiet);
        assert_eq!(ActivityLevel::from_kills(Some(4)), ActivityLevel::Active);
        assert_eq!(ActivityLevel::from_kills(Some(5)), ActivityLevel::Hot);
    }

    #[test]
    fn npc_and_unflagged_kills_are_not_counted() {
        let kills: Vec<KillSummary> =
            serde_json::from_str(r#"[{"zkb":{"npc":false}},{"zkb":{"npc":true}},{},{"zkb":{}}]"#)
                .expect("valid summaries");
        assert_eq!(count_pvp_kills(&kills), 2);
    }

    #[tokio::test]
    async fn results_follow_path_order_and_are_cached() {
        let transport = Arc::new(ScriptedTransport::default());
        for (id, pvp) in [(1, 0), (2, 3), (3, 6)] {
            transport.push(
                &format!("{KILLS}/{id}/pastSeconds/3600/"),
                Scripted::Respond(StatusCode::OK, kills_body(pvp, 2)),
            );
        }
        let cache = Arc::new(RouteCache::in_memory());
        let annotator = annotator(transport.clone(), cache.clone());

        let annotations = annotator
            .annotate(&[3, 1, 2], &CancellationToken::new())
            .await
            .expect("annotated");

        let kills: Vec<_> = annotations.iter().map(|a| (a.system_id, a.pvp_kills)).collect();
        assert_eq!(kills, vec![(3, Some(6)), (1, Some(0)), (2, Some(3))]);
        assert!(annotations.iter().all(|a| a.source == RiskSource::Live));
        assert_eq!(cache.len(), 3);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn stale_sample_is_served_when_fetch_fails() {
        let transport = Arc::new(ScriptedTransport::default());
        let cache = Arc::new(RouteCache::in_memory());
        let old = Utc::now() - ChronoDuration::hours(3);
        cache
            .put(RiskSample::new(9, 4, old, Duration::from_secs(3600)))
            .unwrap();
        for _ in 0..3 {
            transport.push(&format!("{KILLS}/9/pastSeconds/3600/"), Scripted::Fail);
        }
        let annotator = annotator(transport.clone(), cache);

        let annotations = annotator
            .annotate(&[9, 10], &CancellationToken::new())
            .await
            .expect("degraded, not failed");

        assert_eq!(annotations[0].source, RiskSource::Stale);
        assert_eq!(annotations[0].pvp_kills, Some(4));
        assert_eq!(annotations[1].source, RiskSource::Unknown);
        assert_eq!(annotations[1].activity(), ActivityLevel::Unknown);
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn cancelled_run_writes_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(&format!("{KILLS}/1/pastSeconds/3600/"), Scripted::Hang);
        let cache = Arc::new(RouteCache::in_memory());
        let annotator = annotator(transport, cache.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = annotator.annotate(&[1], &cancel).await.expect_err("cancelled");

        assert!(matches!(err, Error::Cancelled));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn live_samples_are_written_through_to_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("risk_cache.db");
        let transport = Arc::new(ScriptedTransport::default());
        for (id, pvp) in [(1, 2), (2, 0), (3, 5)] {
            transport.push(
                &format!("{KILLS}/{id}/pastSeconds/3600/"),
                Scripted::Respond(StatusCode::OK, kills_body(pvp, 0)),
            );
        }
        let cache = Arc::new(RouteCache::open(&path).expect("open cache"));
        let annotator = annotator(transport, cache);

        annotator
            .annotate(&[1, 2, 3], &CancellationToken::new())
            .await
            .expect("annotated");

        let reopened = RouteCache::open(&path).expect("reopen cache");
        assert_eq!(reopened.len(), 3);
        let (sample, fresh) = reopened.get(3).expect("persisted");
        assert_eq!(sample.pvp_kills, 5);
        assert!(fresh);
    }
}
