use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::{Starmap, SystemId};

/// Classification for the edge used in the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Permanent stargate connection from the static dataset.
    Stargate,
    /// Temporary connection reported by the dynamic-link directory.
    Wormhole,
}

/// Lifetime details carried by wormhole edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WormholeInfo {
    pub expires_at: DateTime<Utc>,
    pub signature: Option<String>,
}

/// Directed edge within the routing graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub from: SystemId,
    pub to: SystemId,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wormhole: Option<WormholeInfo>,
}

impl Edge {
    /// Whether the edge can still be travelled at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        match &self.wormhole {
            Some(info) => info.expires_at > now,
            None => true,
        }
    }
}

/// Per-request adjacency structure used by the path finder.
///
/// Avoided systems are absent as vertices, so no edge leads into or out of
/// them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: Arc<HashMap<SystemId, Vec<Edge>>>,
}

impl Graph {
    /// Return the outgoing edges for a given system identifier.
    pub fn neighbours(&self, system: SystemId) -> &[Edge] {
        self.adjacency
            .get(&system)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `system` is a vertex of this graph.
    pub fn contains(&self, system: SystemId) -> bool {
        self.adjacency.contains_key(&system)
    }

    /// Edge used to travel from `from` to `to`, preferring stargates.
    pub fn edge_between(&self, from: SystemId, to: SystemId) -> Option<&Edge> {
        self.neighbours(from)
            .iter()
            .filter(|edge| edge.to == to)
            .min_by_key(|edge| edge.kind)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }
}

/// Merge static stargates and dynamic links into a routing graph.
///
/// Dynamic edges are taken as directed; callers wanting two-way links supply
/// both directions. Edges that have expired at `now`, or that touch a system
/// missing from the starmap, are dropped.
pub fn build_graph(
    starmap: &Starmap,
    dynamic: &[Edge],
    avoid: &HashSet<SystemId>,
    now: DateTime<Utc>,
) -> Graph {
    let mut adjacency: HashMap<SystemId, Vec<Edge>> = HashMap::with_capacity(starmap.len());

    for &system_id in starmap.systems.keys() {
        if avoid.contains(&system_id) {
            continue;
        }
        let edges = starmap
            .neighbours(system_id)
            .into_iter()
            .filter(|edge| !avoid.contains(&edge.to))
            .collect();
        adjacency.insert(system_id, edges);
    }

    let mut seen: HashSet<(SystemId, SystemId)> = HashSet::new();
    let mut added = 0usize;
    for edge in dynamic {
        if !edge.is_usable_at(now) {
            continue;
        }
        if avoid.contains(&edge.from) || avoid.contains(&edge.to) {
            continue;
        }
        if !starmap.systems.contains_key(&edge.from) || !starmap.systems.contains_key(&edge.to) {
            debug!(from = edge.from, to = edge.to, "dropping dynamic link outside dataset");
            continue;
        }
        if !seen.insert((edge.from, edge.to)) {
            continue;
        }
        if let Some(edges) = adjacency.get_mut(&edge.from) {
            edges.push(edge.clone());
            added += 1;
        }
    }

    debug!(
        vertices = adjacency.len(),
        avoided = avoid.len(),
        dynamic_edges = added,
        "routing graph built"
    );

    Graph {
        adjacency: Arc::new(adjacency),
    }
}
