//! Route command handler.

use anyhow::Result;

use everoute_lib::{RoutePlanner, RouteRequest};

use crate::output::{render_route_text, to_json, OutputFormat};
use crate::terminal::ColorPalette;

/// Arguments for the route command.
#[derive(Debug, Clone, Default)]
pub struct RouteCommandArgs {
    pub from: String,
    pub to: String,
    /// Waypoints, visited in order.
    pub via: Vec<String>,
    pub avoid: Vec<String>,
    /// Plan over stargates only.
    pub no_wormholes: bool,
}

impl RouteCommandArgs {
    /// Convert CLI args to a library request.
    pub fn to_request(&self) -> RouteRequest {
        RouteRequest::new(&self.from, &self.to)
            .via(self.via.iter().cloned())
            .avoiding(self.avoid.iter().cloned())
            .with_dynamic_links(!self.no_wormholes)
    }
}

/// Plan and print a route. Routing errors are returned unchanged.
pub async fn handle_route_command(
    planner: &RoutePlanner,
    args: &RouteCommandArgs,
    format: OutputFormat,
) -> Result<()> {
    let path = planner.plan(&args.to_request()).await?;
    match format {
        OutputFormat::Text => print!("{}", render_route_text(&path, &ColorPalette::detect())),
        OutputFormat::Json => println!("{}", to_json(&path)?),
    }
    Ok(())
}
