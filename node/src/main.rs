//! Safe Index Binary

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use safe_app::{codec, RESERVE_MAGIC};
use safe_core::{EngineKind, Height, NodeConfig};
use safe_node::NodeRuntime;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safe-index")]
#[command(about = "Safe application and asset index tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Storage engine
    #[arg(long, global = true, value_enum)]
    engine: Option<Engine>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    Memory,
    Sled,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a sealed or bare command payload given as hex
    Decode {
        payload: String,
    },

    /// List applications visible at a height
    Apps {
        /// Defaults to the index tip
        #[arg(long)]
        height: Option<u32>,
    },

    /// List assets visible at a height
    Assets {
        #[arg(long)]
        height: Option<u32>,
    },

    /// Check whether a name is taken
    Exists {
        #[arg(value_enum)]
        kind: NameKind,

        name: String,

        #[arg(long)]
        height: Option<u32>,
    },

    /// Print per-index entry counts and the snapshot digest
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum NameKind {
    App,
    Asset,
    ShortName,
    Account,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(engine) = cli.engine {
        config.index.engine = match engine {
            Engine::Memory => EngineKind::Memory,
            Engine::Sled => EngineKind::Sled,
        };
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Decode { payload } = &cli.command {
        let bytes = hex::decode(payload.trim()).context("payload is not valid hex")?;
        let message = if bytes.starts_with(RESERVE_MAGIC) {
            codec::decode_reserve(&bytes)?
        } else {
            codec::decode(&bytes)?
        };
        return print_json(&message);
    }

    let runtime = NodeRuntime::new(config)?;
    let at = |height: Option<u32>| height.map(Height).unwrap_or_else(|| runtime.best_height());

    match cli.command {
        Commands::Decode { .. } => {}

        Commands::Apps { height } => {
            let reader = runtime.reader_at(at(height));
            let apps: Vec<_> = reader
                .list_apps()?
                .into_iter()
                .map(|(id, info)| {
                    serde_json::json!({
                        "id": id.to_hex(),
                        "name": info.profile.name,
                        "admin": info.admin.to_string(),
                        "height": info.height.0,
                    })
                })
                .collect();
            print_json(&apps)?;
        }

        Commands::Assets { height } => {
            let reader = runtime.reader_at(at(height));
            let mut assets = Vec::new();
            for (id, info) in reader.list_assets()? {
                assets.push(serde_json::json!({
                    "id": id.to_hex(),
                    "short_name": info.profile.short_name,
                    "name": info.profile.name,
                    "issuer": info.issuer.to_string(),
                    "total": info.profile.total_amount.0,
                    "issued": reader.issued_supply(&id)?.0,
                    "height": info.height.0,
                }));
            }
            print_json(&assets)?;
        }

        Commands::Exists { kind, name, height } => {
            let reader = runtime.reader_at(at(height));
            let exists = match kind {
                NameKind::App => reader.exists_app_name(&name, false)?,
                NameKind::Asset => reader.exists_asset_name(&name, false)?,
                NameKind::ShortName => reader.exists_short_name(&name, false)?,
                NameKind::Account => reader.exists_virtual_account_name(&name, false)?,
            };
            print_json(&serde_json::json!({
                "name": name,
                "height": reader.height().0,
                "exists": exists,
            }))?;
        }

        Commands::Stats => {
            print_json(&runtime.stats()?)?;
        }
    }

    runtime.shutdown()?;
    info!("Done");
    Ok(())
}
