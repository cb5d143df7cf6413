//! modlink command-line runner
//!
//! Loads an entry module from disk, links its import graph and runs it, with
//! `node:process` and `node:path` available as builtin modules.

mod builtins;
mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use modlink_engine::LoaderConfig;
use std::path::{Path, PathBuf};

/// Configuration file picked up from the project root when `--config` is absent
const CONFIG_FILE: &str = "modlink.toml";

#[derive(Parser)]
#[command(name = "modlink")]
#[command(about = "Resolve, link and run module graphs", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./modlink.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root that absolute module paths map onto
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). MODLINK_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an entry module and drain its dynamic imports
    Run {
        /// Entry module file
        entry: String,
        /// Arguments exposed through node:process
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Link an entry module without running it and print the module graph
    Graph {
        /// Entry module file
        entry: String,
        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.root)?;

    match cli.command {
        Commands::Run { entry, args } => commands::run::execute(config, &entry, &args),
        Commands::Graph { entry, json } => commands::graph::execute(config, &entry, json),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("MODLINK_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<LoaderConfig> {
    let config = match path {
        Some(path) => LoaderConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let default = root
                .as_deref()
                .unwrap_or_else(|| Path::new("."))
                .join(CONFIG_FILE);
            if default.is_file() {
                LoaderConfig::load(&default)
                    .with_context(|| format!("Failed to load {}", default.display()))?
            } else {
                LoaderConfig::default()
            }
        }
    };

    Ok(match root {
        Some(root) => config.with_root(root),
        None => config,
    })
}
