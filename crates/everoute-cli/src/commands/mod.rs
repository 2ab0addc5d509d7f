//! Subcommand handlers.
//!
//! `main.rs` parses arguments and dispatches here; each module owns one
//! subcommand.

pub mod cache;
pub mod route;
pub mod system;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use everoute_lib::{
    load_starmap, resolve_cache_path, resolve_dataset_path, PlannerConfig, RouteCache,
    RoutePlanner,
};

/// Load the dataset and risk cache and build a planner over them.
///
/// A cache that cannot be opened is replaced by an in-memory one; the
/// dataset is required.
pub fn load_planner(data_dir: Option<&Path>, cache_path: Option<&Path>) -> Result<RoutePlanner> {
    let dataset_path =
        resolve_dataset_path(data_dir).context("failed to resolve the dataset location")?;
    let starmap = load_starmap(&dataset_path)
        .with_context(|| format!("failed to load dataset from {}", dataset_path.display()))?;

    let cache = match resolve_cache_path(cache_path).and_then(|path| RouteCache::open(&path)) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(error = %err, "risk cache unavailable; using an in-memory cache");
            RouteCache::in_memory()
        }
    };

    RoutePlanner::new(Arc::new(starmap), PlannerConfig::from_env(), Arc::new(cache))
        .context("failed to initialise the HTTP client")
}
