//! Risk cache maintenance.

use std::path::Path;

use anyhow::{Context, Result};

use everoute_lib::{resolve_cache_path, RouteCache};

/// Remove every cached risk sample and report how many were dropped.
pub fn handle_cache_clear(cache_path: Option<&Path>) -> Result<()> {
    let path = resolve_cache_path(cache_path).context("failed to resolve the cache location")?;
    let cache = RouteCache::open(&path)
        .with_context(|| format!("failed to open risk cache at {}", path.display()))?;
    let removed = cache.len();
    cache.clear().context("failed to clear risk cache")?;
    println!("Cleared {removed} cached risk sample(s) from {}", path.display());
    Ok(())
}
