use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tablesweep.toml";

/// Prefix for environment overrides, e.g. `TABLESWEEP__STORAGE__DSN`.
pub const ENV_PREFIX: &str = "TABLESWEEP__";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage DSN of the warehouse root (file://, memory://, s3://)
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file:///.data/warehouse"),
        }
    }
}

/// Upper bound for `grace_period_hours` (about 100 years).
pub const MAX_GRACE_PERIOD_HOURS: u64 = 100 * 365 * 24;

/// Orphan file cleanup configuration.
///
/// ## Safety Defaults
///
/// - `enabled`: false (must be explicitly enabled)
/// - `dry_run`: true (logs actions without executing)
/// - `grace_period_hours`: 72 (files younger than three days are never deleted)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrphanCleanupConfig {
    /// Enable orphan file cleanup.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__ENABLED
    #[serde(default)]
    pub enabled: bool,

    /// Minimum age in hours for a file to be considered for cleanup.
    ///
    /// Files written by in-flight commits are not referenced yet; the grace
    /// period keeps them out of reach.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__GRACE_PERIOD_HOURS
    #[serde(default = "default_grace_period_hours")]
    pub grace_period_hours: u64,

    /// Dry-run mode: identify orphans but don't delete.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__DRY_RUN
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Upper bound on concurrent listing workers for deferred subtrees.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__PARALLELISM
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Directory levels listed sequentially before subtrees are handed to workers.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__MAX_LISTING_DEPTH
    #[serde(default = "default_max_listing_depth")]
    pub max_listing_depth: usize,

    /// A directory with more direct subdirectories than this hands all of
    /// them to workers instead of descending on the coordinator.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__MAX_DIRECT_SUBDIRS
    #[serde(default = "default_max_direct_subdirs")]
    pub max_direct_subdirs: usize,

    /// Number of deletions in flight at once. 1 deletes sequentially.
    ///
    /// Env: TABLESWEEP__ORPHAN_CLEANUP__DELETE_CONCURRENCY
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
}

fn default_grace_period_hours() -> u64 {
    72 // 3 days
}

fn default_dry_run() -> bool {
    true
}

fn default_parallelism() -> usize {
    64
}

fn default_max_listing_depth() -> usize {
    3
}

fn default_max_direct_subdirs() -> usize {
    10
}

fn default_delete_concurrency() -> usize {
    1
}

impl Default for OrphanCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            grace_period_hours: default_grace_period_hours(),
            dry_run: default_dry_run(),
            parallelism: default_parallelism(),
            max_listing_depth: default_max_listing_depth(),
            max_direct_subdirs: default_max_direct_subdirs(),
            delete_concurrency: default_delete_concurrency(),
        }
    }
}

impl OrphanCleanupConfig {
    /// Validate the orphan cleanup configuration.
    ///
    /// A zero grace period is allowed; it only makes sense for tests and for
    /// locations with no concurrent writers.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.grace_period_hours > MAX_GRACE_PERIOD_HOURS {
            anyhow::bail!(
                "grace_period_hours must be at most {MAX_GRACE_PERIOD_HOURS}, got {}",
                self.grace_period_hours
            );
        }

        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be positive, got {}", self.parallelism);
        }

        if self.max_listing_depth == 0 {
            anyhow::bail!(
                "max_listing_depth must be positive, got {}",
                self.max_listing_depth
            );
        }

        if self.delete_concurrency == 0 {
            anyhow::bail!(
                "delete_concurrency must be positive, got {}",
                self.delete_concurrency
            );
        }

        Ok(())
    }

    /// Get the grace period as a Duration. Saturates instead of overflowing.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_hours.saturating_mul(3600))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Object storage holding the table files
    #[serde(default)]
    pub storage: StorageConfig,
    /// Orphan file cleanup
    #[serde(default)]
    pub orphan_cleanup: OrphanCleanupConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    /// Load defaults, then `tablesweep.toml` if present, then environment overrides.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Same layering as [`Configuration::load`] but with an explicit file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.storage.dsn, "file:///.data/warehouse");
        assert!(!config.orphan_cleanup.enabled);
        assert!(config.orphan_cleanup.dry_run);
        assert_eq!(config.orphan_cleanup.grace_period_hours, 72);
        assert_eq!(config.orphan_cleanup.max_listing_depth, 3);
        assert_eq!(config.orphan_cleanup.max_direct_subdirs, 10);
    }

    #[test]
    fn test_orphan_cleanup_validation() {
        assert!(OrphanCleanupConfig::default().validate().is_ok());

        for config in [
            OrphanCleanupConfig {
                parallelism: 0,
                ..Default::default()
            },
            OrphanCleanupConfig {
                max_listing_depth: 0,
                ..Default::default()
            },
            OrphanCleanupConfig {
                delete_concurrency: 0,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    fn test_zero_grace_period_is_allowed() {
        let config = OrphanCleanupConfig {
            grace_period_hours: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_period(), Duration::ZERO);
    }

    #[test]
    fn test_huge_grace_period_is_rejected() {
        let config = OrphanCleanupConfig {
            grace_period_hours: 1_000_000_000_000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grace_period_hours"));

        let config = OrphanCleanupConfig {
            grace_period_hours: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.grace_period(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.storage.dsn, "file:///.data/warehouse");
            assert_eq!(config.orphan_cleanup.parallelism, 64);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [storage]
                dsn = "memory://"

                [orphan_cleanup]
                enabled = true
                grace_period_hours = 1
                "#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.storage.dsn, "memory://");
            assert!(config.orphan_cleanup.enabled);
            assert_eq!(config.orphan_cleanup.grace_period_hours, 1);
            // untouched keys keep their defaults
            assert_eq!(config.orphan_cleanup.max_direct_subdirs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[orphan_cleanup]\ndry_run = true\n")?;
            jail.set_env("TABLESWEEP__ORPHAN_CLEANUP__DRY_RUN", "false");
            jail.set_env("TABLESWEEP__STORAGE__DSN", "file:///tmp/warehouse");

            let config = Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert!(!config.orphan_cleanup.dry_run);
            assert_eq!(config.storage.dsn, "file:///tmp/warehouse");
            Ok(())
        });
    }
}
