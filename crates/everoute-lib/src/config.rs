//! Runtime configuration for the planner.
//!
//! [`PlannerConfig::default`] carries production values; [`PlannerConfig::from_env`]
//! overlays `EVEROUTE_*` environment variables on top of them.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::http::RetryPolicy;

const DEFAULT_SIGNATURES_URL: &str = "https://api.eve-scout.com/v2/public/signatures";
const DEFAULT_KILLS_URL: &str = "https://zkillboard.com/api/kills/systemID";
const DEFAULT_HUBS: [&str; 2] = ["thera", "turnur"];
/// Systems that cannot be transited and are avoided on every route.
const DEFAULT_AVOID: [&str; 1] = ["Zarzakh"];

/// How a reported wormhole is entered into the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WormholeDirection {
    /// Traversable from either end.
    #[default]
    Bidirectional,
    /// Only from the reported out-system to the in-system.
    OutToIn,
}

impl fmt::Display for WormholeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            WormholeDirection::Bidirectional => "bidirectional",
            WormholeDirection::OutToIn => "out-to-in",
        };
        f.write_str(value)
    }
}

impl FromStr for WormholeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bidirectional" | "both" => Ok(WormholeDirection::Bidirectional),
            "out-to-in" | "directional" => Ok(WormholeDirection::OutToIn),
            other => Err(format!("unknown wormhole direction '{other}'")),
        }
    }
}

/// Tunables for dynamic links, risk telemetry and HTTP behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Dynamic-link directory endpoint, queried with `?system_name=<hub>`.
    pub signatures_url: String,
    /// Hub systems whose connections are fetched.
    pub hubs: Vec<String>,
    /// Links with this much lifetime left or less are ignored.
    pub min_wormhole_hours: f64,
    pub wormhole_direction: WormholeDirection,
    /// Systems added to every request's avoid set when the dataset has them.
    pub default_avoid: Vec<String>,
    /// Kill-statistics endpoint; the system id and window are appended.
    pub kills_url: String,
    /// Look-back window for kill statistics.
    pub kill_window: Duration,
    /// Freshness window for cached risk samples.
    pub risk_ttl: Duration,
    /// Concurrent kill-statistics calls per batch.
    pub batch_size: usize,
    /// Pause between two batches of kill-statistics calls.
    pub batch_pause: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            signatures_url: DEFAULT_SIGNATURES_URL.to_string(),
            hubs: DEFAULT_HUBS.iter().map(|hub| hub.to_string()).collect(),
            min_wormhole_hours: 1.0,
            wormhole_direction: WormholeDirection::default(),
            default_avoid: DEFAULT_AVOID.iter().map(|name| name.to_string()).collect(),
            kills_url: DEFAULT_KILLS_URL.to_string(),
            kill_window: Duration::from_secs(3600),
            risk_ttl: Duration::from_secs(3600),
            batch_size: 5,
            batch_pause: Duration::from_millis(250),
            retry: RetryPolicy::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl PlannerConfig {
    /// Defaults overlaid with any `EVEROUTE_*` environment variables.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (used by `from_env`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("EVEROUTE_SIGNATURES_URL") {
            self.signatures_url = url;
        }
        if let Some(hubs) = lookup("EVEROUTE_HUBS") {
            self.hubs = split_list(&hubs);
        }
        if let Some(avoid) = lookup("EVEROUTE_DEFAULT_AVOID") {
            self.default_avoid = split_list(&avoid);
        }
        if let Some(url) = lookup("EVEROUTE_KILLS_URL") {
            self.kills_url = url;
        }
        if let Some(hours) = parse_var::<f64>(&lookup, "EVEROUTE_MIN_WORMHOLE_HOURS") {
            self.min_wormhole_hours = hours;
        }
        if let Some(direction) = parse_var::<WormholeDirection>(&lookup, "EVEROUTE_WORMHOLE_DIRECTION")
        {
            self.wormhole_direction = direction;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "EVEROUTE_RISK_TTL_SECS") {
            self.risk_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, "EVEROUTE_BATCH_SIZE") {
            self.batch_size = size.max(1);
        }
        if let Some(attempts) = parse_var::<usize>(&lookup, "EVEROUTE_RETRY_ATTEMPTS") {
            self.retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "EVEROUTE_RETRY_BACKOFF_MS") {
            self.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "EVEROUTE_REQUEST_TIMEOUT_SECS") {
            self.retry.request_timeout = Duration::from_secs(secs.max(1));
        }

        let limit = self.retry.growing_attempt_limit();
        if self.retry.max_attempts > limit {
            warn!(
                requested = self.retry.max_attempts,
                limit,
                "capping retry attempts so every backoff stays longer than the last"
            );
            self.retry.max_attempts = limit;
        }
        self
    }
}

/// Comma-separated list with blanks dropped; an empty value yields no entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring invalid configuration value");
            None
        }
    }
}

fn default_user_agent() -> String {
    format!("everoute-lib/{version}", version = env!("CARGO_PKG_VERSION"))
}
