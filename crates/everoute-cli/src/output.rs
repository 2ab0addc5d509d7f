//! Output formatting for planned routes and system reports.

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;

use everoute_lib::{
    ActivityLevel, EdgeKind, HubStatus, RiskAnnotation, RoutePath, SecurityClass, System,
};

use crate::terminal::ColorPalette;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// One system with its neighbours and current risk.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport<'a> {
    #[serde(flatten)]
    pub system: &'a System,
    pub security_class: Option<SecurityClass>,
    pub neighbours: Vec<String>,
    pub risk: RiskAnnotation,
    pub activity: ActivityLevel,
}

pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

fn security_label(status: Option<f64>) -> String {
    status
        .map(|value| format!("{value:.1}"))
        .unwrap_or_else(|| "-".to_string())
}

fn class_label(class: Option<SecurityClass>) -> String {
    class
        .map(|class| class.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn kills_label(risk: &RiskAnnotation) -> String {
    risk.pvp_kills
        .map(|kills| kills.to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn entry_label(edge_kind: Option<EdgeKind>) -> &'static str {
    match edge_kind {
        None => "start",
        Some(EdgeKind::Stargate) => "gate",
        Some(EdgeKind::Wormhole) => "wormhole",
    }
}

/// Render a planned route as a table.
pub fn render_route_text(path: &RoutePath, palette: &ColorPalette) -> String {
    let p = palette;
    let name_width = path
        .hops
        .iter()
        .map(|hop| hop.system.name.len())
        .max()
        .unwrap_or(6)
        .max(6);

    let mut out = String::new();
    let (first, last) = match (path.hops.first(), path.hops.last()) {
        (Some(first), Some(last)) => (first.system.name.as_str(), last.system.name.as_str()),
        _ => return "Empty route\n".to_string(),
    };
    let _ = write!(
        out,
        "Route {}{first}{} -> {}{last}{}: {} jumps",
        p.white_bold,
        p.reset,
        p.white_bold,
        p.reset,
        path.hop_count()
    );
    match path.wormhole_jumps() {
        0 => out.push('\n'),
        n => {
            let _ = writeln!(out, " ({}{n} via wormhole{})", p.cyan, p.reset);
        }
    }

    let _ = writeln!(
        out,
        "{}{:>3}  {:<name_width$}  {:>5}  {:<5}  {:>5}  {:<8}  {:<7}  {:<8}{}",
        p.gray, "#", "System", "Sec", "Class", "Kills", "Activity", "Source", "Via", p.reset
    );
    for (index, hop) in path.hops.iter().enumerate() {
        let activity = hop.risk.activity();
        let via_color = match hop.edge_kind {
            Some(EdgeKind::Wormhole) => p.cyan,
            _ => "",
        };
        let via_reset = if via_color.is_empty() { "" } else { p.reset };
        let _ = writeln!(
            out,
            "{index:>3}  {:<name_width$}  {}{:>5}  {:<5}{}  {}{:>5}  {:<8}{}  {:<7}  {via_color}{:<8}{via_reset}",
            hop.system.name,
            p.security(hop.security_class),
            security_label(hop.system.security_status),
            class_label(hop.security_class),
            p.reset,
            p.activity(activity),
            kills_label(&hop.risk),
            activity.to_string(),
            p.reset,
            hop.risk.source.to_string(),
            entry_label(hop.edge_kind),
        );
    }

    if let Some(links) = &path.dynamic_links {
        for hub in &links.hubs {
            let _ = writeln!(out, "{}{}{}", p.gray, hub_line(hub), p.reset);
        }
    }

    let degraded = path.hops.iter().filter(|hop| hop.risk.is_degraded()).count();
    if degraded > 0 {
        let _ = writeln!(
            out,
            "{}Warning: kill data is stale or unavailable for {degraded} system(s){}",
            p.yellow, p.reset
        );
    }
    out
}

fn hub_line(hub: &HubStatus) -> String {
    match (&hub.error, hub.last_updated) {
        (Some(error), _) => format!("Wormholes via {}: unavailable ({error})", hub.hub),
        (None, Some(updated)) => format!(
            "Wormholes via {}: {} links, updated {}",
            hub.hub,
            hub.links,
            updated.format("%Y-%m-%d %H:%M UTC")
        ),
        (None, None) => format!("Wormholes via {}: {} links", hub.hub, hub.links),
    }
}

/// Render a system report as labelled lines.
pub fn render_system_text(report: &SystemReport<'_>, palette: &ColorPalette) -> String {
    let p = palette;
    let system = report.system;
    let mut out = String::new();
    let _ = writeln!(out, "{}{}{} ({})", p.white_bold, system.name, p.reset, system.id);
    let _ = writeln!(
        out,
        "  Region:        {}",
        system.region.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "  Constellation: {}",
        system.constellation.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "  Security:      {}{} ({}){}",
        p.security(report.security_class),
        security_label(system.security_status),
        class_label(report.security_class),
        p.reset
    );
    let neighbours = if report.neighbours.is_empty() {
        "-".to_string()
    } else {
        report.neighbours.join(", ")
    };
    let _ = writeln!(out, "  Stargates:     {neighbours}");
    let _ = writeln!(
        out,
        "  PvP kills:     {}{} ({}){} [{}]",
        p.activity(report.activity),
        kills_label(&report.risk),
        report.activity,
        p.reset,
        report.risk.source
    );
    out
}

#[cfg(test)]
mod tests {
    use everoute_lib::{RiskSource, RouteHop};

    use super::*;

    fn hop(id: i64, name: &str, sec: f64, edge: Option<EdgeKind>, kills: Option<u32>) -> RouteHop {
        let system = System {
            id,
            name: name.to_string(),
            region: None,
            constellation: None,
            security_status: Some(sec),
        };
        RouteHop {
            security_class: system.security_class(),
            system,
            edge_kind: edge,
            risk: RiskAnnotation {
                system_id: id,
                pvp_kills: kills,
                sampled_at: None,
                source: if kills.is_some() {
                    RiskSource::Live
                } else {
                    RiskSource::Unknown
                },
            },
        }
    }

    fn sample_path() -> RoutePath {
        RoutePath {
            start: 1,
            goal: 3,
            hops: vec![
                hop(1, "Rens", 0.9, None, Some(0)),
                hop(2, "Frarn", 0.6, Some(EdgeKind::Stargate), Some(6)),
                hop(3, "Onga", 0.2, Some(EdgeKind::Wormhole), None),
            ],
            dynamic_links: None,
        }
    }

    #[test]
    fn route_table_lists_every_hop() {
        let text = render_route_text(&sample_path(), &ColorPalette::plain());
        assert!(text.starts_with("Route Rens -> Onga: 2 jumps (1 via wormhole)"));
        assert!(text.contains("Frarn"));
        assert!(text.contains("hot"));
        assert!(text.contains("wormhole"));
        assert!(text.contains("live"));
        assert!(text.contains("Warning: kill data is stale or unavailable for 1 system(s)"));
    }

    #[test]
    fn route_json_carries_risk_sources() {
        let json = to_json(&sample_path()).expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["hops"][2]["risk"]["source"], "unknown");
        assert_eq!(value["hops"][2]["edge_kind"], "wormhole");
        assert_eq!(value["hops"][0]["security_class"], "high");
    }
}
