//! Common test utilities and fixture helpers.
//!
//! Provides the checked-in topology fixture, a scripted [`Transport`] that
//! replays canned responses per URL and counts every call, and a planner
//! wired to both with fast retry settings.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use everoute_lib::{
    load_starmap, Error, PlannerConfig, Result, RetryPolicy, RouteCache, RoutePlanner, Starmap,
    Transport, TransportResponse,
};
use parking_lot::Mutex;
use reqwest::StatusCode;

pub const SIGNATURES_URL: &str = "http://scout.test/signatures";
pub const KILLS_URL: &str = "http://kills.test/api/kills/systemID";

/// Path to the minimal topology fixture.
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures/minimal_topology.json")
}

#[allow(dead_code)]
pub fn fixture_starmap() -> Arc<Starmap> {
    Arc::new(load_starmap(&fixture_path()).expect("fixture loads"))
}

#[allow(dead_code)]
pub fn id(starmap: &Starmap, name: &str) -> i64 {
    starmap
        .system_id_by_name(name)
        .unwrap_or_else(|| panic!("{name} present in fixture"))
}

/// Kill-statistics URL the planner requests for `system_id`.
#[allow(dead_code)]
pub fn kills_url(system_id: i64) -> String {
    format!("{KILLS_URL}/{system_id}/pastSeconds/3600/")
}

/// Signature directory URL the planner requests for `hub`.
#[allow(dead_code)]
pub fn signatures_url(hub: &str) -> String {
    format!("{SIGNATURES_URL}?system_name={hub}")
}

/// JSON body with `pvp` player kills and `npc` NPC kills.
#[allow(dead_code)]
pub fn kills_body(pvp: usize, npc: usize) -> String {
    let entries: Vec<&str> = std::iter::repeat(r#"{"killmail_id":1,"zkb":{"npc":false}}"#)
        .take(pvp)
        .chain(std::iter::repeat(r#"{"killmail_id":2,"zkb":{"npc":true}}"#).take(npc))
        .collect();
    format!("[{}]", entries.join(","))
}

/// JSON body with one completed wormhole between `out_id` and `in_id`.
#[allow(dead_code)]
pub fn wormhole_body(out_id: i64, in_id: i64, remaining_hours: f64) -> String {
    format!(
        r#"[{{"id":"1","signature_type":"wormhole","system_name":"Thera","completed":true,
            "out_system_id":{out_id},"in_system_id":{in_id},"out_signature":"ABC-123",
            "remaining_hours":{remaining_hours},"updated_at":"2026-10-16T08:00:00Z"}}]"#
    )
}

#[allow(dead_code)]
pub enum Reply {
    Status(u16, String),
    Hang,
}

/// Transport replaying queued replies per URL.
///
/// A URL with nothing queued fails like a dropped connection.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn reply(&self, url: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn ok(&self, url: &str, body: impl Into<String>) -> &Self {
        self.reply(url, Reply::Status(200, body.into()))
    }

    pub fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .entry(url.to_string())
            .or_default() += 1;
        let reply = self
            .replies
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Status(code, body)) => Ok(TransportResponse::new(
                StatusCode::from_u16(code).expect("valid status"),
                body,
            )),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(Error::Timeout {
                url: url.to_string(),
                after: Duration::ZERO,
            }),
        }
    }
}

/// Configuration pointing at the scripted endpoints with millisecond backoff.
#[allow(dead_code)]
pub fn test_config(max_attempts: usize) -> PlannerConfig {
    PlannerConfig {
        signatures_url: SIGNATURES_URL.to_string(),
        hubs: vec!["thera".to_string()],
        kills_url: KILLS_URL.to_string(),
        batch_pause: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(8),
            multiplier: 2.0,
            request_timeout: Duration::from_secs(2),
        },
        ..PlannerConfig::default()
    }
}

#[allow(dead_code)]
pub fn planner(
    transport: Arc<ScriptedTransport>,
    cache: Arc<RouteCache>,
    max_attempts: usize,
) -> RoutePlanner {
    RoutePlanner::with_transport(fixture_starmap(), test_config(max_attempts), cache, transport)
}
