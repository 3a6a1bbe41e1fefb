use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{FindError, FindResult};

/// Match criteria applied to every file a crawl visits.
///
/// All configured criteria must hold for a file to match. Criteria left as `None` are not
/// evaluated, so an empty `MatchCriteria` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// Literal, case-sensitive substring of the file's base name
    #[serde(default)]
    pub name: Option<String>,

    /// Exact size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    /// Modification time must be strictly later than this many seconds since the epoch
    #[serde(default)]
    pub newer_than: Option<i64>,

    /// Suppress per-match output
    #[serde(default)]
    pub silent: bool,
}

/// Configuration for a pfind run.
///
/// # Configuration Locations
///
/// Values are read from the following files, later ones taking precedence:
/// 1. Global `$HOME/.config/pfind/config.yaml`
/// 2. Local `.pfind.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command-line arguments are merged on top with `merge_with_cli`.
///
/// ```yaml
/// criteria:
///   name: ".log"
///   newer_than: 1700000000
///   silent: true
///
/// # Number of pool members (default: CPU cores)
/// pool_size: 8
///
/// human_readable: true
/// log_level: "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindConfig {
    /// Directory whose immediate subdirectories are crawled
    #[serde(default)]
    pub root_path: PathBuf,

    /// Predicate parameters
    #[serde(default)]
    pub criteria: MatchCriteria,

    /// Number of cooperating pool members; `None` means one per CPU
    #[serde(default)]
    pub pool_size: Option<NonZeroUsize>,

    /// Print sizes as 1.5K, 20M, ...
    #[serde(default)]
    pub human_readable: bool,

    /// Debug logging of per-rank progress
    #[serde(default)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

pub fn default_pool_size() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::new(),
            criteria: MatchCriteria::default(),
            pool_size: None,
            human_readable: false,
            verbose: false,
            log_level: default_log_level(),
        }
    }
}

impl FindConfig {
    /// Creates a configuration for `root_path` with everything else defaulted
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }

    /// Loads configuration, adding a specific file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> FindResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(FindError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("pfind/config.yaml")),
            Some(PathBuf::from(".pfind.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: FindConfig) -> Self {
        // CLI values take precedence over config file values
        if !cli_config.root_path.as_os_str().is_empty() {
            self.root_path = cli_config.root_path;
        }
        if cli_config.criteria.name.is_some() {
            self.criteria.name = cli_config.criteria.name;
        }
        if cli_config.criteria.size.is_some() {
            self.criteria.size = cli_config.criteria.size;
        }
        if cli_config.criteria.newer_than.is_some() {
            self.criteria.newer_than = cli_config.criteria.newer_than;
        }
        if cli_config.criteria.silent {
            self.criteria.silent = true;
        }
        // Always use the CLI member count if specified
        if cli_config.pool_size.is_some() {
            self.pool_size = cli_config.pool_size;
        }
        if cli_config.human_readable {
            self.human_readable = true;
        }
        if cli_config.verbose {
            self.verbose = true;
        }
        if cli_config.log_level != default_log_level() {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// Members to start: the configured count, or one per CPU
    pub fn pool_size(&self) -> NonZeroUsize {
        self.pool_size.unwrap_or_else(default_pool_size)
    }

    /// Checks the merged configuration before the pool starts
    pub fn validate(&self) -> FindResult<()> {
        if self.root_path.as_os_str().is_empty() {
            return Err(FindError::config_error("no directory to search"));
        }
        Ok(())
    }
}

/// Parses a newer-than threshold given either as integer seconds since the epoch or as an
/// RFC 3339 timestamp such as `2024-01-01T00:00:00Z`.
pub fn parse_timestamp(text: &str) -> FindResult<i64> {
    let trimmed = text.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }

    let time = humantime::parse_rfc3339_weak(trimmed)
        .map_err(|_| FindError::InvalidTimestamp(text.to_string()))?;
    Ok(seconds_since_epoch(time))
}

/// Whole seconds between the epoch and `time`, rounded towards negative infinity
pub fn seconds_since_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => {
            let before = before.duration();
            let whole = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -whole - 1
            } else {
                -whole
            }
        }
    }
}
