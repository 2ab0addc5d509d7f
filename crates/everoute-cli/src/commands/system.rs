//! System command handler: metadata, stargates and current PvP activity.

use anyhow::{Context, Result};

use everoute_lib::RoutePlanner;

use crate::output::{render_system_text, to_json, OutputFormat, SystemReport};
use crate::terminal::ColorPalette;

pub async fn handle_system_command(
    planner: &RoutePlanner,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let starmap = planner.starmap();
    let id = planner.resolve(name)?;
    let system = starmap
        .system(id)
        .with_context(|| format!("system {id} missing from dataset"))?;

    let mut neighbours: Vec<String> = starmap
        .stargates(id)
        .iter()
        .filter_map(|&neighbour| starmap.system_name(neighbour))
        .map(str::to_string)
        .collect();
    neighbours.sort();

    let risk = planner.system_risk(id).await?;
    let report = SystemReport {
        system,
        security_class: system.security_class(),
        neighbours,
        activity: risk.activity(),
        risk,
    };

    match format {
        OutputFormat::Text => print!("{}", render_system_text(&report, &ColorPalette::detect())),
        OutputFormat::Json => println!("{}", to_json(&report)?),
    }
    Ok(())
}
