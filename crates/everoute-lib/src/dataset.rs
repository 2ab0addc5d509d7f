//! Locating the topology dataset and the risk cache on disk.
//!
//! Both follow the same order: an explicit path from the caller, then an
//! environment variable, then the platform directories from
//! [`directories::ProjectDirs`].

use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{Error, Result};

/// File name used when a directory is given instead of a dataset file.
pub const DATASET_FILENAME: &str = "topology.db";

/// File name of the persisted risk cache.
pub const CACHE_FILENAME: &str = "risk_cache.db";

const DATA_DIR_ENV: &str = "EVEROUTE_DATA_DIR";
const CACHE_PATH_ENV: &str = "EVEROUTE_CACHE_PATH";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "everoute", "everoute").ok_or(Error::ProjectDirsUnavailable)
}

/// Platform data location of the topology dataset.
pub fn default_dataset_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join(DATASET_FILENAME))
}

/// Platform cache location of the risk cache.
pub fn default_cache_path() -> Result<PathBuf> {
    Ok(project_dirs()?.cache_dir().join(CACHE_FILENAME))
}

/// Resolve the dataset to load.
///
/// `explicit` (then `EVEROUTE_DATA_DIR`) may name either a dataset file or a
/// directory holding [`DATASET_FILENAME`]. Existence is not checked here;
/// [`crate::load_starmap`] reports a missing file.
pub fn resolve_dataset_path(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_dataset_path_with(explicit, |key| env::var_os(key).map(PathBuf::from))
}

/// Resolve the risk cache file (`explicit`, then `EVEROUTE_CACHE_PATH`).
pub fn resolve_cache_path(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_cache_path_with(explicit, |key| env::var_os(key).map(PathBuf::from))
}

fn resolve_dataset_path_with<F>(explicit: Option<&Path>, lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let path = match explicit.map(Path::to_path_buf).or_else(|| lookup(DATA_DIR_ENV)) {
        Some(candidate) => dataset_file(candidate),
        None => default_dataset_path()?,
    };
    debug!(path = %path.display(), "resolved dataset path");
    Ok(path)
}

fn resolve_cache_path_with<F>(explicit: Option<&Path>, lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    match explicit.map(Path::to_path_buf).or_else(|| lookup(CACHE_PATH_ENV)) {
        Some(path) => Ok(path),
        None => default_cache_path(),
    }
}

fn dataset_file(candidate: PathBuf) -> PathBuf {
    if candidate.is_dir() {
        candidate.join(DATASET_FILENAME)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn explicit_file_wins_over_environment() {
        let path = resolve_dataset_path_with(Some(Path::new("/tmp/custom.json")), |_| {
            Some(PathBuf::from("/elsewhere"))
        })
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
    }

    #[test]
    fn directory_gets_default_file_name() {
        let dir = tempdir().expect("temp dir");
        let root = dir.path().to_path_buf();
        let path = resolve_dataset_path_with(None, |key| {
            (key == DATA_DIR_ENV).then(|| root.clone())
        })
        .unwrap();
        assert_eq!(path, dir.path().join(DATASET_FILENAME));
    }

    #[test]
    fn cache_path_comes_from_environment() {
        let path = resolve_cache_path_with(None, |key| {
            (key == CACHE_PATH_ENV).then(|| PathBuf::from("/var/cache/risk.db"))
        })
        .unwrap();
        assert_eq!(path, PathBuf::from("/var/cache/risk.db"));
    }
}
