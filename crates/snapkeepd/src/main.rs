//! snapkeepd: scheduled snapshots with a retention window.
//!
//! Reads one TOML file describing what to snapshot (`[frontend]`), where to
//! store it (`[backend]`), and how often and for how long (`[snapshot]`).
//!
//! # Usage
//!
//! ```text
//! snapkeepd --config /etc/snapkeep/orders.toml run
//! snapkeepd --config /etc/snapkeep/orders.toml list --max 20
//! snapkeepd --config /etc/snapkeep/orders.toml restore --key orders.1717236000.sql --out dump.sql
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "snapkeepd", about = "Scheduled snapshots with retention", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C, then take a final snapshot.
    Run,
    /// Take one snapshot now and print its key.
    Snapshot,
    /// Delete snapshots older than the retention window once.
    Purge,
    /// List stored snapshot keys, oldest first.
    List {
        /// Stop after this many keys.
        #[arg(long)]
        max: Option<usize>,
    },
    /// Print the key of the most recent snapshot.
    Latest,
    /// Write a stored snapshot to a file or stdout.
    Restore {
        #[arg(long)]
        key: String,
        /// Output file (default: stdout).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,snapkeep=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = DaemonConfig::from_file(&cli.config)?;

    match cli.command {
        Command::Run => commands::run::run(config).await,
        Command::Snapshot => commands::inspect::snapshot(&config).await,
        Command::Purge => commands::inspect::purge(&config).await,
        Command::List { max } => commands::inspect::list(&config, max).await,
        Command::Latest => commands::inspect::latest(&config).await,
        Command::Restore { key, out } => {
            commands::inspect::restore(&config, &key, out.as_deref()).await
        }
    }
}
