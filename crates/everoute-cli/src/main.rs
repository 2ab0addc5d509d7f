use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use everoute_cli::commands::{self, route::RouteCommandArgs};
use everoute_cli::logging::{init_logging, LoggingConfig};
use everoute_cli::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about = "Risk-aware route planning across the cluster")]
struct Cli {
    /// Dataset file, or a directory containing `topology.db` [env: EVEROUTE_DATA_DIR].
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Risk cache database path [env: EVEROUTE_CACHE_PATH].
    #[arg(long, global = true)]
    cache_path: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a route and annotate every jump with recent PvP activity.
    Route {
        /// Starting system name.
        #[arg(long = "from")]
        from: String,
        /// Destination system name.
        #[arg(long = "to")]
        to: String,
        /// Waypoint to pass through (repeatable, visited in order).
        #[arg(long = "via")]
        via: Vec<String>,
        /// System to avoid (repeatable).
        #[arg(long = "avoid")]
        avoid: Vec<String>,
        /// Ignore wormhole connections.
        #[arg(long)]
        no_wormholes: bool,
    },
    /// Show a system's metadata, stargates and current PvP kills.
    System {
        /// System name (case-insensitive).
        name: String,
    },
    /// Manage the risk cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove every cached risk sample.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LoggingConfig::from_env());
    let cli = Cli::parse();

    match cli.command {
        Command::Route {
            from,
            to,
            via,
            avoid,
            no_wormholes,
        } => {
            let planner = commands::load_planner(cli.data_dir.as_deref(), cli.cache_path.as_deref())?;
            let args = RouteCommandArgs {
                from,
                to,
                via,
                avoid,
                no_wormholes,
            };
            commands::route::handle_route_command(&planner, &args, cli.format).await
        }
        Command::System { name } => {
            let planner = commands::load_planner(cli.data_dir.as_deref(), cli.cache_path.as_deref())?;
            commands::system::handle_system_command(&planner, &name, cli.format).await
        }
        Command::Cache {
            action: CacheAction::Clear,
        } => commands::cache::handle_cache_clear(cli.cache_path.as_deref()),
    }
}
