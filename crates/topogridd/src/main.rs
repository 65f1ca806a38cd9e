//! topogridd — the topogrid deployment engine.
//!
//! Loads a `topology.toml`, applies a `topogrid.toml` engine config and
//! either plans the deployment against a dry-run backend, launches it for
//! real or prints the per-node schedules.
//!
//! # Usage
//!
//! ```text
//! topogridd plan --topology lab.toml --output plan.json
//! topogridd launch --topology lab.toml --config /etc/topogrid.toml
//! topogridd schedule --topology lab.toml --node web-1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod load;

const DEFAULT_LOG_FILTER: &str = "info,topogrid=debug";

#[derive(Parser)]
#[command(
    name = "topogridd",
    about = "topogrid — virtual network topology deployment engine",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate and register a topology against a dry-run backend.
    Plan {
        #[arg(short, long)]
        topology: PathBuf,
        /// Engine config (topogrid.toml). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the plan here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload schedules and deploy the topology.
    Launch {
        #[arg(short, long)]
        topology: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print node schedules grouped by start time.
    Schedule {
        #[arg(short, long)]
        topology: PathBuf,
        /// Only this node.
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Print an engine config with every default filled in.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Command::Plan {
            topology,
            config,
            output,
        } => commands::plan::run(&topology, config.as_deref(), output.as_deref()).await,
        Command::Launch { topology, config } => {
            commands::launch::run(&topology, config.as_deref()).await
        }
        Command::Schedule { topology, node } => {
            commands::schedule::run(&topology, node.as_deref())
        }
        Command::Config => {
            print!("{}", topo_core::EngineConfig::scaffold()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
