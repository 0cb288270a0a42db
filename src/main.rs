use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use trail_importer::commands::{self, ImportRequest};
use trail_importer::regions::RegionScope;
use trail_importer::{AppConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "trail-importer")]
#[command(about = "Imports AI-generated hiking trails into a local catalog")]
#[command(version)]
struct Args {
    /// Directory holding the trail database and run journal
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and merge trails for every region of a country
    Import {
        /// ISO 3166-1 alpha-2 country code
        country_code: String,
        /// Trails requested per region, clamped to 5..=30
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Enumerate `subdivisions` or `parks`
        #[arg(short, long, default_value = "subdivisions", value_parser = parse_scope)]
        scope: RegionScope,
    },
    /// Load curated trails from a seed file
    Seed {
        path: PathBuf,
        /// Delete every stored trail first
        #[arg(long)]
        reset: bool,
    },
    /// Print stored trails for a country
    List {
        country_code: String,
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Print the last import summary for a country
    Last { country_code: String },
    /// Print storage paths and the redacted configuration
    Health,
}

fn parse_scope(value: &str) -> Result<RegionScope, String> {
    RegionScope::parse(value).ok_or_else(|| format!("unknown scope `{value}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    let state = AppState::initialize(config).context("failed to initialize importer state")?;

    match args.command {
        Command::Import {
            country_code,
            limit,
            scope,
        } => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!(target: "cli", "interrupt received; finishing in-flight regions");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let request = ImportRequest {
                country_code,
                limit_per_state: limit,
                scope: Some(scope),
            };
            let summary = commands::run_import_with_cancel(&state, request, Some(cancel))
                .await
                .context("import could not start")?;
            info!(
                target: "cli",
                created = summary.trails_created,
                cost_usd = summary.total_cost_usd,
                "import complete"
            );
            print_json(&summary)?;
        }
        Command::Seed { path, reset } => {
            let summary = commands::seed_trails(&state, &path, reset)
                .with_context(|| format!("failed to seed trails from {}", path.display()))?;
            print_json(&summary)?;
        }
        Command::List {
            country_code,
            region,
        } => {
            let trails = commands::list_trails(&state, &country_code, region.as_deref())
                .context("failed to list trails")?;
            print_json(&trails)?;
        }
        Command::Last { country_code } => {
            let summary = commands::last_import(&state, &country_code)
                .context("failed to read last import summary")?;
            print_json(&summary)?;
        }
        Command::Health => {
            print_json(&commands::importer_health(&state)?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
