//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SquidError};
use crate::queue::job::JobField;
use crate::queue::parser::LONG_REASON_SENTINEL;

/// Full squid configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// External Slurm commands and how squeue is asked for output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub squeue_bin: PathBuf,
    pub scontrol_bin: PathBuf,
    pub scancel_bin: PathBuf,
    /// Whose queue to show; empty means the invoking user.
    pub user: String,
    /// Pad requested for every squeue column.
    pub column_width: usize,
}

/// Interactive dashboard behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Automatic refresh period; 0 refreshes only on request.
    pub refresh_ms: u64,
    /// Field key preselected in the filter bar.
    pub default_filter_attribute: String,
    /// Ask before hold/release/kill of every listed job.
    pub confirm_bulk: bool,
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub activity_log_enabled: bool,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

/// Filesystem paths used by squid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            squeue_bin: PathBuf::from("squeue"),
            scontrol_bin: PathBuf::from("scontrol"),
            scancel_bin: PathBuf::from("scancel"),
            user: String::new(),
            column_width: 1_000,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 10_000,
            default_filter_attribute: JobField::Name.key().to_string(),
            confirm_bulk: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log_enabled: true,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            config_file: home.join(".config").join("squid").join("config.toml"),
            activity_log: home
                .join(".local")
                .join("share")
                .join("squid")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SquidError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml(&raw)?
        } else if path.is_some() {
            return Err(SquidError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.paths.activity_log = expand_home(&cfg.paths.activity_log);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|error| SquidError::Serialization {
            context: "toml",
            details: error.to_string(),
        })
    }

    /// Filter attribute preselected by the dashboard.
    #[must_use]
    pub fn default_filter_field(&self) -> Option<JobField> {
        self.dashboard.default_filter_attribute.parse().ok()
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SQUID_SQUEUE_BIN") {
            self.scheduler.squeue_bin = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SQUID_SCONTROL_BIN") {
            self.scheduler.scontrol_bin = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SQUID_SCANCEL_BIN") {
            self.scheduler.scancel_bin = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SQUID_USER") {
            self.scheduler.user = raw;
        }
        if let Some(raw) = lookup("SQUID_COLUMN_WIDTH") {
            self.scheduler.column_width = parse_env("SQUID_COLUMN_WIDTH", &raw)?;
        }
        if let Some(raw) = lookup("SQUID_REFRESH_MS") {
            self.dashboard.refresh_ms = parse_env("SQUID_REFRESH_MS", &raw)?;
        }
        if let Some(raw) = lookup("SQUID_DEFAULT_FILTER") {
            self.dashboard.default_filter_attribute = raw;
        }
        if let Some(raw) = lookup("SQUID_CONFIRM_BULK") {
            self.dashboard.confirm_bulk = parse_env("SQUID_CONFIRM_BULK", &raw)?;
        }
        if let Some(raw) = lookup("SQUID_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SQUID_ACTIVITY_LOG_ENABLED") {
            self.logging.activity_log_enabled = parse_env("SQUID_ACTIVITY_LOG_ENABLED", &raw)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        for (name, bin) in [
            ("scheduler.squeue_bin", &self.scheduler.squeue_bin),
            ("scheduler.scontrol_bin", &self.scheduler.scontrol_bin),
            ("scheduler.scancel_bin", &self.scheduler.scancel_bin),
        ] {
            if bin.as_os_str().is_empty() {
                return Err(SquidError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }

        // Narrower columns let squeue truncate values into each other.
        let min_width = LONG_REASON_SENTINEL.len() + 1;
        if self.scheduler.column_width < min_width {
            return Err(SquidError::InvalidConfig {
                details: format!(
                    "scheduler.column_width must be >= {min_width}, got {}",
                    self.scheduler.column_width
                ),
            });
        }

        if self.default_filter_field().is_none() {
            return Err(SquidError::InvalidConfig {
                details: format!(
                    "dashboard.default_filter_attribute {:?} is not a job field",
                    self.dashboard.default_filter_attribute
                ),
            });
        }

        if self.logging.max_size_bytes == 0 || self.logging.max_rotated_files == 0 {
            return Err(SquidError::InvalidConfig {
                details: "logging.max_size_bytes and logging.max_rotated_files must be > 0"
                    .to_string(),
            });
        }

        Ok(())
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[SQUID-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    path.strip_prefix("~")
        .map_or_else(|_| path.to_path_buf(), |rest| home_dir().join(rest))
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| SquidError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
