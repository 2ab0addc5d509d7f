use std::collections::{HashMap, VecDeque};

use crate::db::SystemId;
use crate::graph::Graph;

/// Pair of consecutive stops that could not be connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectedSegment {
    pub from: SystemId,
    pub to: SystemId,
}

/// Find the route with the fewest jumps between `start` and `goal`.
///
/// Breadth-first search over system identifiers. Each discovered system
/// records the system it was reached from, and the path is rebuilt from those
/// parent links once the goal is found. Returns `None` when either endpoint is
/// not a vertex of `graph` (for example because it is avoided) or the two are
/// disconnected.
pub fn find_route(graph: &Graph, start: SystemId, goal: SystemId) -> Option<Vec<SystemId>> {
    if !graph.contains(start) || !graph.contains(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut parents: HashMap<SystemId, Option<SystemId>> = HashMap::new();
    let mut queue = VecDeque::new();

    parents.insert(start, None);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for edge in graph.neighbours(current) {
            let next = edge.to;
            if parents.contains_key(&next) || !graph.contains(next) {
                continue;
            }

            parents.insert(next, Some(current));
            if next == goal {
                return Some(reconstruct_path(&parents, start, goal));
            }
            queue.push_back(next);
        }
    }

    None
}

/// Chain shortest routes through an ordered list of stops.
///
/// `stops` is origin, waypoints, destination. Each consecutive pair is solved
/// independently and the shared junction system is kept once. The first
/// disconnected pair aborts the whole chain.
pub fn find_route_through(
    graph: &Graph,
    stops: &[SystemId],
) -> Result<Vec<SystemId>, DisconnectedSegment> {
    let Some((&first, _)) = stops.split_first() else {
        return Ok(Vec::new());
    };
    if stops.len() == 1 {
        return find_route(graph, first, first).ok_or(DisconnectedSegment {
            from: first,
            to: first,
        });
    }

    let mut route: Vec<SystemId> = Vec::new();
    for pair in stops.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let segment = find_route(graph, from, to).ok_or(DisconnectedSegment { from, to })?;
        let skip = usize::from(!route.is_empty());
        route.extend(segment.into_iter().skip(skip));
    }
    Ok(route)
}

fn reconstruct_path(
    parents: &HashMap<SystemId, Option<SystemId>>,
    start: SystemId,
    goal: SystemId,
) -> Vec<SystemId> {
    let mut path = Vec::new();
    let mut current = Some(goal);
    while let Some(node) = current {
        path.push(node);
        if node == start {
            break;
        }
        current = parents.get(&node).copied().flatten();
    }
    path.reverse();
    path
}
