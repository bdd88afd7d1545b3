//! # Beadboard CLI (`beadboard`)
//!
//! Starts the dashboard API server, or runs a one-off query against the
//! town's rigs from the command line.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `beadboard` / `beadboard serve` | Start the HTTP API server |
//! | `beadboard sources` | List discovered rigs and their prefixes |
//! | `beadboard list` | Print beads from every rig as JSON |
//! | `beadboard show <id>` | Print one bead as JSON |
//!
//! ## Examples
//!
//! ```bash
//! # Serve on the configured address, town found from the working directory
//! beadboard
//!
//! # Serve a specific town on another port
//! beadboard --town ~/gt serve --port 8080
//!
//! # Open beads of type bug, across all rigs
//! beadboard list --status open --type bug
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beadboard::aggregate::Aggregator;
use beadboard::config::{ConfigStore, DEFAULT_HOST, DEFAULT_PORT};
use beadboard::registry::SourceRegistry;
use beadboard::server::{run_server, AppState};
use beadboard::sources;
use beadboard::tool::{BdCli, GtCli, ListFilter};
use beadboard::town;

/// Beadboard: one dashboard for the beads of every rig in a town.
#[derive(Parser)]
#[command(
    name = "beadboard",
    about = "Beadboard: one dashboard for the beads of every rig in a town",
    version
)]
struct Cli {
    /// Town root directory.
    ///
    /// When omitted, walks up from the working directory looking for a
    /// `mayor/` directory or `.gastown` marker.
    #[arg(long, global = true)]
    town: Option<PathBuf>,

    /// Path to the dashboard config file (JSON).
    #[arg(long, global = true, default_value = "./config.json")]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Seconds to wait for each `bd` / `gt` invocation.
    #[arg(long, global = true, default_value_t = 15)]
    tool_timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server (default).
    Serve {
        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind (overrides the config file).
        #[arg(long)]
        host: Option<String>,
    },

    /// List discovered rigs, their prefixes, and whether their beads directory exists.
    Sources,

    /// Print beads from every rig as a JSON array.
    List {
        /// Status filter, passed through to `bd list --status`.
        #[arg(long)]
        status: Option<String>,

        /// Type filter, passed through to `bd list --type`.
        #[arg(long = "type")]
        bead_type: Option<String>,
    },

    /// Print one bead as JSON.
    Show {
        /// Bead id, e.g. `ri-abc123`.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        town,
        config,
        log_level,
        tool_timeout,
        command,
    } = Cli::parse();

    init_logging(&log_level)?;

    let town_root = match town {
        Some(dir) => dir,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            town::find_town_root(&cwd)
        }
    };
    let timeout = Duration::from_secs(tool_timeout);

    let registry = Arc::new(SourceRegistry::build(&town_root));
    let aggregator = Aggregator::new(
        registry.clone(),
        Arc::new(BdCli::for_town(&town_root, timeout)),
    )
    .with_source_timeout(timeout);

    match command.unwrap_or(Commands::Serve {
        port: None,
        host: None,
    }) {
        Commands::Serve { port, host } => {
            let store = Arc::new(ConfigStore::new(config));
            let mut server = store.load().await.server;
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(host) = host {
                server.host = host;
            }
            if server.port == 0 {
                server.port = DEFAULT_PORT;
            }
            if server.host.is_empty() {
                server.host = DEFAULT_HOST.to_string();
            }

            let state = AppState {
                aggregator,
                town: GtCli::for_town(&town_root, timeout),
                config: store,
            };
            run_server(state, &server.bind_addr()).await?;
        }
        Commands::Sources => {
            sources::list_sources(&registry)?;
        }
        Commands::List { status, bead_type } => {
            let beads = aggregator.list_all(&ListFilter { status, bead_type }).await;
            println!("{}", serde_json::to_string_pretty(&beads)?);
        }
        Commands::Show { id } => {
            let bead = aggregator.detail(&id).await?;
            println!("{}", serde_json::to_string_pretty(&bead)?);
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    Ok(())
}
