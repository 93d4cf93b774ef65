use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::storage::open_storage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sweeper::orphan::{ObjectStoreIo, RemoveOrphanFiles};

#[derive(Parser)]
#[command(name = "tablesweep")]
#[command(about = "tablesweep - remove orphan files from table storage locations")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove files under a location that no live path references
    Remove(RemoveArgs),
    #[command(flatten)]
    Common(CommonCommands),
}

#[derive(Args, Debug)]
struct RemoveArgs {
    /// Table location to clean, as listed by the storage (e.g. s3://bucket/db/t)
    #[arg(long)]
    location: String,

    /// File with one live path per line; blank lines and `#` comments are ignored
    #[arg(long)]
    live_files: PathBuf,

    /// Only remove files modified before this RFC 3339 timestamp
    /// (default: now minus the configured grace period)
    #[arg(long)]
    older_than: Option<DateTime<Utc>>,

    /// Table property, KEY=VALUE; `gc.enabled=false` refuses to run
    #[arg(long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Override the configured dry-run setting
    #[arg(long, conflicts_with = "no_dry_run")]
    dry_run: bool,

    #[arg(long)]
    no_dry_run: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn read_live_files(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read live files from {}", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn remove(args: RemoveArgs, config: &common::Configuration) -> Result<()> {
    let mut orphan_config = config.orphan_cleanup.clone();
    orphan_config
        .validate()
        .context("Invalid orphan cleanup configuration")?;

    if !orphan_config.enabled {
        log::info!("Orphan cleanup is disabled in configuration (orphan_cleanup.enabled = false)");
        log::info!("Set TABLESWEEP__ORPHAN_CLEANUP__ENABLED=true or enable it in the config file");
        return Ok(());
    }

    if args.dry_run {
        orphan_config.dry_run = true;
    } else if args.no_dry_run {
        orphan_config.dry_run = false;
    }

    let live_files = read_live_files(&args.live_files)?;
    let properties: HashMap<String, String> = args.properties.into_iter().collect();
    let storage = open_storage(&config.storage).context("Failed to open storage")?;

    log::info!(
        "Removing orphan files under {} ({} live paths, storage root {})",
        args.location,
        live_files.len(),
        storage.root_url
    );

    let mut action =
        RemoveOrphanFiles::for_object_store(&args.location, &properties, ObjectStoreIo::from(storage))?
            .with_config(&orphan_config)?;
    if let Some(older_than) = args.older_than {
        action = action.older_than(older_than);
    }

    let result = action.execute(live_files).await?;

    let summary = serde_json::json!({
        "location": result.location,
        "older_than": result.older_than,
        "dry_run": result.report.dry_run,
        "attempted": result.report.attempted_count(),
        "deleted": result.report.deleted_count(),
        "failed": result.report.failed_count(),
        "bytes_freed": result.report.bytes_freed(),
        "orphan_files": result.orphan_files,
        "failures": result
            .report
            .failures()
            .map(|(path, error)| serde_json::json!({ "path": path, "error": error }))
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Commands::Remove(args) => remove(args, &config).await,
        Commands::Common(CommonCommands::Config { json }) => utils::display_config(&config, json),
        Commands::Common(CommonCommands::Validate) => {
            utils::validate_config(&config)?;
            config
                .orphan_cleanup
                .validate()
                .context("Invalid orphan cleanup configuration")?;
            tracing::info!("Configuration validation passed");
            Ok(())
        }
        Commands::Common(CommonCommands::Version) => {
            println!("{}", utils::version_info());
            Ok(())
        }
    }
}
