//! Everoute library entry points.
//!
//! This crate loads the static universe topology, merges it with live
//! wormhole connections, finds the route with the fewest jumps and annotates
//! each hop with recent PvP activity. Front-ends (the CLI, a web handler)
//! should only depend on the items exported here instead of reimplementing
//! behavior.
//!

#![deny(warnings)]

pub mod cache;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod graph;
pub mod http;
pub mod path;
pub mod risk;
pub mod routing;
pub mod wormholes;

pub use cache::{RiskSample, RouteCache};
pub use config::{PlannerConfig, WormholeDirection};
pub use dataset::{default_cache_path, default_dataset_path, resolve_cache_path, resolve_dataset_path};
pub use db::{load_starmap, SecurityClass, Starmap, System, SystemId};
pub use error::{Error, Result};
pub use graph::{build_graph, Edge, EdgeKind, Graph, WormholeInfo};
pub use http::{ReqwestTransport, RetryPolicy, RetryingClient, Transport, TransportResponse};
pub use path::{find_route, find_route_through, DisconnectedSegment};
pub use risk::{ActivityLevel, RiskAnnotation, RiskAnnotator, RiskSource};
pub use routing::{RouteHop, RoutePath, RoutePlanner, RouteRequest};
pub use wormholes::{DynamicLinkFetcher, DynamicLinks, HubStatus};
