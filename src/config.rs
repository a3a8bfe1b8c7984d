use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TodoError};

/// Seconds until a reminder fires when none is given explicitly.
pub const DEFAULT_REMINDER_DELAY_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: Option<PathBuf>,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReminderConfig {
    #[serde(default = "default_delay")]
    pub default_delay_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: DEFAULT_REMINDER_DELAY_SECS,
        }
    }
}

fn default_delay() -> u64 {
    DEFAULT_REMINDER_DELAY_SECS
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub level: Option<String>,
}

/// `$HOME/.todosync`, or `./.todosync` without a home directory.
pub fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".todosync")
}

pub fn default_config_path() -> PathBuf {
    home_dir().join("config.toml")
}

pub fn default_db_path() -> PathBuf {
    home_dir().join("todosync.db")
}

impl Config {
    /// Load from `path`, or from `~/.todosync/config.toml` when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => Self::load_from(&default_config_path()),
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        let config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                TodoError::Config(format!("failed to parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => {
                return Err(TodoError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(level) = &self.log.level {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(TodoError::Config(format!(
                    "{}: log.level '{level}' must be one of off, error, warn, info, debug, trace",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Database path: explicit flag/env, then config file, then the default.
    pub fn db_path(&self, cli_db: Option<PathBuf>) -> PathBuf {
        cli_db
            .or_else(|| self.db.clone())
            .unwrap_or_else(default_db_path)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log
            .level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(log::LevelFilter::Warn)
    }
}
