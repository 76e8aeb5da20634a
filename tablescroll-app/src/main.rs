use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tablescroll_common::observability::{LogConfig, init_logging};
use tablescroll_config::{TablescrollConfig, TablescrollConfigLoader, default_config_path};
use tablescroll_core::ScrollRequest;
use wire::Wiring;
mod wire;

/// Human-like scroll, observe and extract for virtualized web tables.
#[derive(Debug, Parser)]
#[command(name = "tablescroll", version)]
struct Cli {
    /// YAML config file; defaults to ./tablescroll.yaml when present.
    #[arg(long, global = true, env = "TABLESCROLL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scroll, judge and extract until the end of the table.
    Run {
        /// Continue an existing store instead of creating a timestamped one.
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
    },
    /// One human-like scroll.
    Scroll {
        #[arg(long, allow_hyphen_values = true)]
        dy: i64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        dx: i64,
        #[arg(long)]
        url: Option<String>,
    },
    /// One stop/continue judgment of the current view.
    Check {
        #[arg(long)]
        url: Option<String>,
    },
    /// Extract the visible rows once and merge them into the store.
    Extract {
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Check that the vision service answers.
    Probe,
}

fn load_config(cli: &Cli) -> Result<TablescrollConfig> {
    let loader = match cli.config.clone().or_else(default_config_path) {
        Some(path) => TablescrollConfigLoader::new().with_file(path),
        None => TablescrollConfigLoader::new(),
    };
    let mut cfg = loader.load()?;
    match &cli.command {
        Command::Run { store, url } | Command::Extract { store, url } => {
            if store.is_some() {
                cfg.store.path = store.clone();
            }
            if url.is_some() {
                cfg.browser.start_url = url.clone();
            }
        }
        Command::Scroll { url, .. } | Command::Check { url } => {
            if url.is_some() {
                cfg.browser.start_url = url.clone();
            }
        }
        Command::Probe => {}
    }
    Ok(cfg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let log_path = init_logging(LogConfig {
        app_name: "tablescroll",
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    tracing::debug!(log = %log_path.display(), command = ?cli.command, "app.start");

    let wiring = Wiring::new(cfg);
    match cli.command {
        Command::Run { .. } => print_json(&wiring.run().await?),
        Command::Scroll { dx, dy, .. } => print_json(&wiring.scroll(ScrollRequest::new(dx, dy)).await?),
        Command::Check { .. } => print_json(&wiring.check().await?),
        Command::Extract { .. } => print_json(&wiring.extract().await?),
        Command::Probe => print_json(&wiring.probe().await?),
    }
}
