//! ADAPT configuration.
//!
//! Loaded from `~/.adapt/config.toml`. Every key is optional and a missing
//! file means defaults.
//!
//! The database path is resolved through a chain:
//!
//! 1. `--db <path>`: explicit per-command override
//! 2. `ADAPT_DB` env var
//! 3. `database` in the config file
//! 4. `~/.adapt/adapt.sqlite`

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// Environment variable naming the database file.
pub const DATABASE_ENV: &str = "ADAPT_DB";

/// Poll interval when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Log filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// ADAPT configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Database file shared by every ADAPT process.
    pub database: Option<PathBuf>,

    /// Sleep between reconciliation ticks, in milliseconds.
    pub poll_interval_ms: Option<u64>,

    /// `tracing` filter directive, e.g. `"info"` or `"adapt=debug"`.
    pub log: Option<String>,
}

impl Config {
    /// Load config from `~/.adapt/config.toml`.
    pub fn load() -> Result<Self, String> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from `path`. A missing file yields the defaults; an
    /// unreadable or invalid one is an error.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        let config: Self = toml::from_str(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;

        if config.poll_interval_ms == Some(0) {
            return Err(format!(
                "poll-interval-ms must be positive in {}",
                path.display()
            ));
        }

        Ok(config)
    }

    /// The config file path: `~/.adapt/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".adapt").join("config.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }

    pub fn log_filter(&self) -> &str {
        self.log
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Resolve the database path from the chain in the module docs.
    pub fn resolve_database(&self, explicit: Option<&Path>) -> Result<PathBuf, String> {
        let from_env = env::var_os(DATABASE_ENV).map(PathBuf::from);
        self.resolve_database_with(explicit, from_env)
    }

    fn resolve_database_with(
        &self,
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
    ) -> Result<PathBuf, String> {
        // 1. Explicit --db flag.
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // 2. ADAPT_DB environment variable.
        if let Some(path) = from_env
            && !path.as_os_str().is_empty()
        {
            return Ok(path);
        }

        // 3. Config file.
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }

        // 4. Home directory default.
        Storage::default_path().ok_or_else(|| {
            format!(
                "could not determine home directory: pass --db <path> or set {DATABASE_ENV}"
            )
        })
    }
}
