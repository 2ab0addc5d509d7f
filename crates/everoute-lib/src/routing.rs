//! Route planning entry point.
//!
//! [`RoutePlanner::plan`] resolves system names, optionally merges dynamic
//! links into the stargate graph, chains shortest paths through the
//! waypoints and annotates every hop with PvP risk.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use everoute_lib::{load_starmap, PlannerConfig, RouteCache, RoutePlanner, RouteRequest};
//!
//! let starmap = Arc::new(load_starmap("topology.db".as_ref())?);
//! let cache = Arc::new(RouteCache::open("risk_cache.db".as_ref())?);
//! let planner = RoutePlanner::new(starmap, PlannerConfig::from_env(), cache)?;
//! let path = planner.plan(&RouteRequest::new("Jita", "Amarr").avoiding(["Uedama"])).await?;
//! println!("{} jumps", path.hop_count());
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::RouteCache;
use crate::config::PlannerConfig;
use crate::db::{SecurityClass, Starmap, System, SystemId};
use crate::error::{Error, Result};
use crate::graph::{build_graph, EdgeKind};
use crate::http::{ReqwestTransport, RetryingClient, Transport};
use crate::path::find_route_through;
use crate::risk::{RiskAnnotation, RiskAnnotator};
use crate::wormholes::{DynamicLinkFetcher, DynamicLinks};

/// Number of fuzzy suggestions attached to an unknown-system error.
const SUGGESTION_LIMIT: usize = 3;

/// High-level route planning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub start: String,
    pub goal: String,
    /// Systems to pass through, in order.
    pub waypoints: Vec<String>,
    /// Systems that must not appear anywhere on the route.
    pub avoid: Vec<String>,
    pub allow_dynamic_links: bool,
}

impl RouteRequest {
    /// Direct request with dynamic links enabled.
    pub fn new(start: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            goal: goal.into(),
            waypoints: Vec::new(),
            avoid: Vec::new(),
            allow_dynamic_links: true,
        }
    }

    pub fn via<I, S>(mut self, waypoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.waypoints.extend(waypoints.into_iter().map(Into::into));
        self
    }

    pub fn avoiding<I, S>(mut self, systems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avoid.extend(systems.into_iter().map(Into::into));
        self
    }

    pub fn with_dynamic_links(mut self, allow: bool) -> Self {
        self.allow_dynamic_links = allow;
        self
    }
}

/// One system of a planned route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteHop {
    pub system: System,
    pub security_class: Option<SecurityClass>,
    /// How the hop was entered; `None` for the origin.
    pub edge_kind: Option<EdgeKind>,
    pub risk: RiskAnnotation,
}

/// Planned and annotated route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePath {
    pub start: SystemId,
    pub goal: SystemId,
    pub hops: Vec<RouteHop>,
    /// Hub status, present when dynamic links were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_links: Option<DynamicLinks>,
}

impl RoutePath {
    /// Number of jumps in the route.
    pub fn hop_count(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    /// Jumps taken through wormholes.
    pub fn wormhole_jumps(&self) -> usize {
        self.hops
            .iter()
            .filter(|hop| hop.edge_kind == Some(EdgeKind::Wormhole))
            .count()
    }

    pub fn system_ids(&self) -> Vec<SystemId> {
        self.hops.iter().map(|hop| hop.system.id).collect()
    }
}

struct ActivePlan {
    id: u64,
    token: CancellationToken,
}

/// Orchestrates topology, dynamic links, path finding and risk annotation.
///
/// One planner is meant to serve one user session: starting a plan cancels
/// whichever plan it started before.
pub struct RoutePlanner {
    starmap: Arc<Starmap>,
    config: PlannerConfig,
    links: DynamicLinkFetcher,
    annotator: RiskAnnotator,
    active: Mutex<Option<ActivePlan>>,
    next_plan: AtomicU64,
}

impl std::fmt::Debug for RoutePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePlanner")
            .field("systems", &self.starmap.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RoutePlanner {
    /// Planner talking to the configured endpoints over HTTPS.
    pub fn new(starmap: Arc<Starmap>, config: PlannerConfig, cache: Arc<RouteCache>) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.user_agent, config.retry.request_timeout)?;
        Ok(Self::with_transport(starmap, config, cache, Arc::new(transport)))
    }

    /// Planner using `transport` for every external call.
    pub fn with_transport(
        starmap: Arc<Starmap>,
        config: PlannerConfig,
        cache: Arc<RouteCache>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let client = RetryingClient::new(transport, config.retry.clone());
        let links = DynamicLinkFetcher::new(
            client.clone(),
            config.signatures_url.clone(),
            config.min_wormhole_hours,
            config.wormhole_direction,
        );
        let annotator = RiskAnnotator::new(client, cache, &config);
        Self {
            starmap,
            config,
            links,
            annotator,
            active: Mutex::new(None),
            next_plan: AtomicU64::new(0),
        }
    }

    pub fn starmap(&self) -> &Starmap {
        &self.starmap
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        self.annotator.cache()
    }

    /// Resolve a system name, suggesting close matches when it is unknown.
    pub fn resolve(&self, name: &str) -> Result<SystemId> {
        self.starmap.system_id_by_name(name).ok_or_else(|| Error::UnknownSystem {
            name: name.trim().to_string(),
            suggestions: self.starmap.fuzzy_system_matches(name, SUGGESTION_LIMIT),
        })
    }

    /// Risk for a single system, through the same cache and retry path as
    /// route annotation.
    pub async fn system_risk(&self, system_id: SystemId) -> Result<RiskAnnotation> {
        let annotations = self
            .annotator
            .annotate(&[system_id], &CancellationToken::new())
            .await?;
        Ok(annotations
            .into_iter()
            .next()
            .unwrap_or_else(|| RiskAnnotation::unknown(system_id)))
    }

    /// Plan `request`, superseding any plan this planner is still running.
    ///
    /// The superseded call returns [`Error::Cancelled`].
    pub async fn plan(&self, request: &RouteRequest) -> Result<RoutePath> {
        let id = self.next_plan.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.active.lock().replace(ActivePlan {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(superseded = previous.id, plan = id, "cancelling previous plan");
            previous.token.cancel();
        }

        let result = self.plan_with_cancellation(request, token).await;

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|plan| plan.id == id) {
            *active = None;
        }
        result
    }

    /// Plan `request` under a caller-owned cancellation token.
    pub async fn plan_with_cancellation(
        &self,
        request: &RouteRequest,
        cancel: CancellationToken,
    ) -> Result<RoutePath> {
        let start = self.resolve(&request.start)?;
        let goal = self.resolve(&request.goal)?;
        let mut stops = Vec::with_capacity(request.waypoints.len() + 2);
        stops.push(start);
        for waypoint in &request.waypoints {
            stops.push(self.resolve(waypoint)?);
        }
        stops.push(goal);
        let mut avoid = request
            .avoid
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<HashSet<_>>>()?;
        self.extend_with_default_avoid(&mut avoid, &stops);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let dynamic_links = if request.allow_dynamic_links {
            Some(self.links.fetch(&self.config.hubs, &cancel).await?)
        } else {
            None
        };
        let dynamic_edges = dynamic_links
            .as_ref()
            .map(|links| links.edges.as_slice())
            .unwrap_or(&[]);

        let graph = build_graph(&self.starmap, dynamic_edges, &avoid, Utc::now());
        let route = find_route_through(&graph, &stops).map_err(|segment| Error::RouteNotFound {
            start: self.display_name(segment.from),
            goal: self.display_name(segment.to),
        })?;

        let risks = self.annotator.annotate(&route, &cancel).await?;

        let mut hops = Vec::with_capacity(route.len());
        for (index, (&system_id, risk)) in route.iter().zip(risks).enumerate() {
            let system = self
                .starmap
                .system(system_id)
                .cloned()
                .ok_or_else(|| Error::UnknownSystem {
                    name: system_id.to_string(),
                    suggestions: Vec::new(),
                })?;
            let edge_kind = index
                .checked_sub(1)
                .and_then(|previous| graph.edge_between(route[previous], system_id))
                .map(|edge| edge.kind);
            hops.push(RouteHop {
                security_class: system.security_class(),
                system,
                edge_kind,
                risk,
            });
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let path = RoutePath {
            start,
            goal,
            hops,
            dynamic_links,
        };
        info!(
            start = %request.start,
            goal = %request.goal,
            jumps = path.hop_count(),
            wormhole_jumps = path.wormhole_jumps(),
            "route planned"
        );
        Ok(path)
    }

    /// Add the configured always-avoided systems. Names missing from the
    /// dataset are skipped, and a system the request routes to or through
    /// stays reachable.
    fn extend_with_default_avoid(&self, avoid: &mut HashSet<SystemId>, stops: &[SystemId]) {
        for name in &self.config.default_avoid {
            match self.starmap.system_id_by_name(name) {
                Some(id) if stops.contains(&id) => {
                    debug!(system = %name, "requested stop overrides default avoid");
                }
                Some(id) => {
                    avoid.insert(id);
                }
                None => debug!(system = %name, "default-avoided system not in dataset"),
            }
        }
    }

    fn display_name(&self, system_id: SystemId) -> String {
        self.starmap
            .system_name(system_id)
            .map(str::to_string)
            .unwrap_or_else(|| system_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::*;
    use crate::http::testing::{Scripted, ScriptedTransport};
    use crate::http::RetryPolicy;

    fn system(id: SystemId, name: &str, security: f64) -> System {
        System {
            id,
            name: name.to_string(),
            region: Some("Heimatar".to_string()),
            constellation: None,
            security_status: Some(security),
        }
    }

    fn chain() -> Arc<Starmap> {
        let starmap = Starmap::from_parts(
            vec![
                system(1, "Alpha", 0.9),
                system(2, "Bravo", 0.5),
                system(3, "Charlie", 0.2),
                system(4, "Delta", -0.3),
            ],
            vec![(1, 2), (2, 3), (3, 4)],
        )
        .expect("valid chain");
        Arc::new(starmap)
    }

    fn planner(transport: Arc<ScriptedTransport>) -> RoutePlanner {
        planner_with(transport, test_config())
    }

    fn planner_with(transport: Arc<ScriptedTransport>, config: PlannerConfig) -> RoutePlanner {
        RoutePlanner::with_transport(chain(), config, Arc::new(RouteCache::in_memory()), transport)
    }

    fn test_config() -> PlannerConfig {
        PlannerConfig {
            signatures_url: "http://scout.test/sigs".to_string(),
            hubs: vec!["thera".to_string()],
            kills_url: "http://kills.test".to_string(),
            batch_pause: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                multiplier: 2.0,
                request_timeout: Duration::from_millis(100),
            },
            ..PlannerConfig::default()
        }
    }

    #[tokio::test]
    async fn unknown_names_carry_suggestions() {
        let planner = planner(Arc::new(ScriptedTransport::default()));
        let err = planner
            .plan(&RouteRequest::new("Alpa", "Delta"))
            .await
            .expect_err("unknown origin");
        match err {
            Error::UnknownSystem { name, suggestions } => {
                assert_eq!(name, "Alpa");
                assert_eq!(suggestions.first().map(String::as_str), Some("Alpha"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn avoided_cut_vertex_reports_segment_names() {
        let planner = planner(Arc::new(ScriptedTransport::default()));
        let request = RouteRequest::new("Alpha", "Delta")
            .avoiding(["charlie"])
            .with_dynamic_links(false);
        let err = planner.plan(&request).await.expect_err("disconnected");
        assert!(matches!(
            err,
            Error::RouteNotFound { ref start, ref goal } if start == "Alpha" && goal == "Delta"
        ));
    }

    #[tokio::test]
    async fn default_avoid_applies_unless_requested() {
        let config = PlannerConfig {
            default_avoid: vec!["Charlie".to_string(), "Nowhere".to_string()],
            ..test_config()
        };
        let planner = planner_with(Arc::new(ScriptedTransport::default()), config);

        let err = planner
            .plan(&RouteRequest::new("Alpha", "Delta").with_dynamic_links(false))
            .await
            .expect_err("Charlie is a cut vertex");
        assert!(matches!(err, Error::RouteNotFound { .. }));

        let path = planner
            .plan(&RouteRequest::new("Alpha", "Charlie").with_dynamic_links(false))
            .await
            .expect("explicit destination stays reachable");
        assert_eq!(path.system_ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn hops_record_entry_edge_and_security() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(
            "http://scout.test/sigs?system_name=thera",
            Scripted::Respond(
                StatusCode::OK,
                r#"[{"signature_type":"wormhole","completed":true,"remaining_hours":5,
                    "out_system_id":1,"in_system_id":4}]"#
                    .to_string(),
            ),
        );
        for id in [1, 4] {
            transport.push(
                &format!("http://kills.test/{id}/pastSeconds/3600/"),
                Scripted::Respond(StatusCode::OK, "[]".to_string()),
            );
        }

        let path = planner(transport)
            .plan(&RouteRequest::new("Alpha", "Delta"))
            .await
            .expect("route");

        assert_eq!(path.system_ids(), vec![1, 4]);
        assert_eq!(path.hops[0].edge_kind, None);
        assert_eq!(path.hops[1].edge_kind, Some(EdgeKind::Wormhole));
        assert_eq!(path.hops[1].security_class, Some(SecurityClass::Null));
        assert_eq!(path.wormhole_jumps(), 1);
        let hubs = &path.dynamic_links.as_ref().expect("requested").hubs;
        assert_eq!(hubs[0].links, 2);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_fetching() {
        let transport = Arc::new(ScriptedTransport::default());
        let planner = planner(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = planner
            .plan_with_cancellation(&RouteRequest::new("Alpha", "Delta"), cancel)
            .await
            .expect_err("cancelled");

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.calls(), 0);
    }
}
