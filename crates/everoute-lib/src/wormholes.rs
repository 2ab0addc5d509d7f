//! Dynamic links from the public wormhole signature directory.
//!
//! The directory is queried once per hub system for every planning run; its
//! answers are never persisted because connections appear and collapse
//! within hours.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WormholeDirection;
use crate::db::SystemId;
use crate::error::{Error, Result};
use crate::graph::{Edge, EdgeKind, WormholeInfo};
use crate::http::RetryingClient;

/// One record of the signature directory.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureRecord {
    #[serde(default)]
    pub system_name: Option<String>,
    #[serde(default)]
    pub signature_type: String,
    #[serde(default)]
    pub in_system_id: Option<SystemId>,
    #[serde(default)]
    pub out_system_id: Option<SystemId>,
    #[serde(default)]
    pub out_signature: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub remaining_hours: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of querying one hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStatus {
    pub hub: String,
    /// Usable links this hub contributed (before cross-hub de-duplication).
    pub links: usize,
    /// Most recent `updated_at` among the hub's records.
    pub last_updated: Option<DateTime<Utc>>,
    /// Set when the hub could not be queried; it then contributes nothing.
    pub error: Option<String>,
}

/// Dynamic edges for one planning run plus per-hub status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DynamicLinks {
    pub edges: Vec<Edge>,
    pub hubs: Vec<HubStatus>,
}

/// Queries the signature directory for the configured hubs.
#[derive(Debug, Clone)]
pub struct DynamicLinkFetcher {
    client: RetryingClient,
    base_url: String,
    min_remaining_hours: f64,
    direction: WormholeDirection,
}

impl DynamicLinkFetcher {
    pub fn new(
        client: RetryingClient,
        base_url: impl Into<String>,
        min_remaining_hours: f64,
        direction: WormholeDirection,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            min_remaining_hours,
            direction,
        }
    }

    /// Fetch usable links around every hub concurrently.
    ///
    /// A hub that cannot be queried is reported in its [`HubStatus`] and
    /// skipped; only cancellation fails the call.
    pub async fn fetch(&self, hubs: &[String], cancel: &CancellationToken) -> Result<DynamicLinks> {
        let now = Utc::now();
        let results = join_all(hubs.iter().map(|hub| self.fetch_hub(hub, cancel))).await;

        let mut links = DynamicLinks::default();
        let mut seen: HashSet<(SystemId, SystemId)> = HashSet::new();
        for (hub, result) in hubs.iter().zip(results) {
            match result {
                Ok(records) => {
                    let edges = usable_links(&records, self.min_remaining_hours, self.direction, now);
                    let last_updated = records.iter().filter_map(|record| record.updated_at).max();
                    debug!(hub = %hub, records = records.len(), links = edges.len(), "hub links");
                    links.hubs.push(HubStatus {
                        hub: hub.clone(),
                        links: edges.len(),
                        last_updated,
                        error: None,
                    });
                    links
                        .edges
                        .extend(edges.into_iter().filter(|edge| seen.insert((edge.from, edge.to))));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    warn!(hub = %hub, error = %err, "dynamic links unavailable for hub");
                    links.hubs.push(HubStatus {
                        hub: hub.clone(),
                        links: 0,
                        last_updated: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        info!(
            hubs = hubs.len(),
            edges = links.edges.len(),
            "dynamic links fetched"
        );
        Ok(links)
    }

    async fn fetch_hub(&self, hub: &str, cancel: &CancellationToken) -> Result<Vec<SignatureRecord>> {
        let url = Url::parse_with_params(&self.base_url, &[("system_name", hub)]).map_err(|err| {
            Error::ExternalUnavailable {
                url: self.base_url.clone(),
                attempts: 0,
                reason: err.to_string(),
            }
        })?;
        self.client.get_json(url.as_str(), cancel).await
    }
}

/// Turn raw directory records into graph edges.
///
/// Only completed wormhole records with both endpoints and more than
/// `min_remaining_hours` of life left are kept.
pub fn usable_links(
    records: &[SignatureRecord],
    min_remaining_hours: f64,
    direction: WormholeDirection,
    now: DateTime<Utc>,
) -> Vec<Edge> {
    let mut edges = Vec::new();
    for record in records {
        if !record.signature_type.eq_ignore_ascii_case("wormhole") || !record.completed {
            continue;
        }
        let Some(remaining) = record.remaining_hours.filter(|hours| hours.is_finite()) else {
            continue;
        };
        if remaining <= min_remaining_hours {
            continue;
        }
        let (Some(out_id), Some(in_id)) = (record.out_system_id, record.in_system_id) else {
            continue;
        };
        if out_id == in_id {
            continue;
        }

        let Some(expires_at) = expiry_after(now, remaining) else {
            warn!(
                out_id,
                in_id,
                remaining_hours = remaining,
                "skipping wormhole with out-of-range lifetime"
            );
            continue;
        };
        let info = WormholeInfo {
            expires_at,
            signature: record.out_signature.clone(),
        };
        edges.push(wormhole_edge(out_id, in_id, &info));
        if direction == WormholeDirection::Bidirectional {
            edges.push(wormhole_edge(in_id, out_id, &info));
        }
    }
    edges
}

/// `now` plus `hours`, or `None` when the instant is not representable.
fn expiry_after(now: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    let millis = hours * 3_600_000.0;
    if !(i64::MIN as f64..i64::MAX as f64).contains(&millis) {
        return None;
    }
    ChronoDuration::try_milliseconds(millis as i64).and_then(|lifetime| now.checked_add_signed(lifetime))
}

fn wormhole_edge(from: SystemId, to: SystemId, info: &WormholeInfo) -> Edge {
    Edge {
        from,
        to,
        kind: EdgeKind::Wormhole,
        wormhole: Some(info.clone()),
    }
}
