//! Configuration file handling
//!
//! The file is found in one of two places: a path given explicitly (the
//! `--config` flag or `QUERY_CACHE_CONFIG`), or `query-cache/config.toml`
//! under the user's config directory. A missing file means defaults.

pub mod schema;

pub use schema::Config;

use crate::error::{QueryCacheError, QueryCacheResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const APP_DIR: &str = "query-cache";
const FILE_NAME: &str = "config.toml";

/// Where the config file path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    Explicit(PathBuf),
    UserDefault(PathBuf),
}

impl ConfigLocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(path) | Self::UserDefault(path) => path,
        }
    }
}

/// What `init` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    Overwritten,
    AlreadyExists,
}

/// Reads and writes the config file at one resolved location
#[derive(Debug, Clone)]
pub struct ConfigManager {
    location: ConfigLocation,
}

impl ConfigManager {
    /// Resolve the config location, preferring an explicit path
    pub fn locate(explicit: Option<PathBuf>) -> Self {
        let location = match explicit {
            Some(path) => ConfigLocation::Explicit(path),
            None => ConfigLocation::UserDefault(Self::user_default_path()),
        };
        debug!(?location, "Resolved config location");
        Self { location }
    }

    /// `<config dir>/query-cache/config.toml`, relative to `.` when the
    /// platform has no config directory
    pub fn user_default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(FILE_NAME)
    }

    pub fn location(&self) -> &ConfigLocation {
        &self.location
    }

    pub fn path(&self) -> &Path {
        self.location.path()
    }

    /// Read the config file; defaults when it does not exist
    pub async fn load(&self) -> QueryCacheResult<Config> {
        let path = self.path();
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(QueryCacheError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ))
            }
        };

        toml::from_str(&text).map_err(|e| QueryCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })
    }

    /// Write `config`, creating parent directories as needed
    pub async fn save(&self, config: &Config) -> QueryCacheResult<()> {
        let path = self.path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| QueryCacheError::ConfigDirCreate {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let text = toml::to_string_pretty(config)?;
        fs::write(path, text)
            .await
            .map_err(|e| QueryCacheError::io(format!("writing config to {}", path.display()), e))?;

        info!("Wrote config to {}", path.display());
        Ok(())
    }

    /// Write a default config unless one exists and `force` is unset
    pub async fn init(&self, force: bool) -> QueryCacheResult<InitOutcome> {
        let exists = fs::try_exists(self.path()).await.unwrap_or(false);
        if exists && !force {
            return Ok(InitOutcome::AlreadyExists);
        }

        self.save(&Config::default()).await?;
        Ok(if exists {
            InitOutcome::Overwritten
        } else {
            InitOutcome::Created
        })
    }
}
