use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by the tablesweep binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that only inspect configuration
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use crate::storage::storage_root_url;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments; `RUST_LOG` wins when set
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            let orphan = &config.orphan_cleanup;
            println!("tablesweep configuration:");
            println!("=========================");
            println!("Storage DSN: {}", config.storage.dsn);
            println!("Orphan cleanup enabled: {}", orphan.enabled);
            println!("Dry run: {}", orphan.dry_run);
            println!("Grace period: {}h", orphan.grace_period_hours);
            println!(
                "Listing budget: depth {}, {} direct subdirectories",
                orphan.max_listing_depth, orphan.max_direct_subdirs
            );
            println!("Listing parallelism: {}", orphan.parallelism);
            println!("Delete concurrency: {}", orphan.delete_concurrency);
        }
        Ok(())
    }

    /// Validate the storage section
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.storage.dsn.is_empty() {
            anyhow::bail!("Storage DSN cannot be empty");
        }
        storage_root_url(&config.storage.dsn).context("Invalid storage configuration")?;

        Ok(())
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
