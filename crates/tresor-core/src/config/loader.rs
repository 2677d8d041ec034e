//! Configuration loader with precedence
//!
//! Loads configuration from the following sources (low to high):
//! 1. Built-in defaults
//! 2. Config file: explicit `--config` path, else the first of
//!    `./config.yaml` and `/etc/tresor/config.yaml` that exists
//! 3. Environment variables (`TRESOR_*` prefix)

use crate::config::types::TresorConfig;
use crate::error::{Error, Result};
use crate::security::Token;
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use std::str::FromStr;
use tracing::debug;

/// Config file locations searched when no explicit path is given
const DEFAULT_SEARCH_PATHS: &[&str] = &["config.yaml", "/etc/tresor/config.yaml"];

/// Configuration loader
pub struct ConfigLoader {
    search_paths: Vec<Utf8PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader searching the default locations
    pub fn new() -> Self {
        Self {
            search_paths: DEFAULT_SEARCH_PATHS
                .iter()
                .map(|p| Utf8PathBuf::from(*p))
                .collect(),
        }
    }

    /// Create a loader with custom search locations
    pub fn with_search_paths(search_paths: Vec<Utf8PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load configuration with precedence applied
    ///
    /// An explicit path must exist. Without one, a missing config file is not
    /// an error: the process may be configured through the environment alone.
    pub fn load(&self, explicit: Option<&Utf8Path>) -> Result<TresorConfig> {
        let config = match explicit {
            Some(path) => Self::load_file(path)?,
            None => match self.search_paths.iter().find(|p| p.exists()) {
                Some(path) => Self::load_file(path)?,
                None => {
                    debug!("No config file found, using defaults and environment");
                    TresorConfig::default()
                }
            },
        };

        Self::apply_env_overrides(config)
    }

    fn load_file(path: &Utf8Path) -> Result<TresorConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        debug!("Loading configuration from {}", path);

        // An empty file deserializes to unit, not to a mapping.
        if content.trim().is_empty() {
            return Ok(TresorConfig::default());
        }

        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Apply `TRESOR_*` environment variable overrides
    fn apply_env_overrides(mut config: TresorConfig) -> Result<TresorConfig> {
        if let Ok(val) = env::var("TRESOR_BACKUP_REPO") {
            config.repository.url = val;
        }

        if let Ok(val) = env::var("TRESOR_BACKUP_BRANCH") {
            config.repository.branch = val;
        }

        if let Ok(val) = env::var("TRESOR_BACKUP_USERNAME") {
            config.repository.username = val;
        }

        if let Ok(val) = env::var("TRESOR_BACKUP_TOKEN") {
            config.repository.token = Token::new(val);
        }

        if let Ok(val) = env::var("TRESOR_BACKUP_CLONE_DIR") {
            config.repository.clone_dir = if val.is_empty() {
                None
            } else {
                Some(Utf8PathBuf::from(val))
            };
        }

        if let Ok(val) = env::var("TRESOR_AUTHOR_NAME") {
            config.author.name = val;
        }

        if let Ok(val) = env::var("TRESOR_AUTHOR_EMAIL") {
            config.author.email = val;
        }

        if let Ok(val) = env::var("TRESOR_CONTROL_PLANE_VERSION") {
            config.controller.control_plane_version = val;
        }

        if let Some(secs) = parse_env::<u64>("TRESOR_REQUEUE_ERROR_SECS")? {
            config.controller.requeue_error_secs = secs;
        }

        if let Some(secs) = parse_env::<u64>("TRESOR_REQUEUE_RETRY_SECS")? {
            config.controller.requeue_retry_secs = secs;
        }

        if let Some(secs) = parse_env::<u64>("TRESOR_OPERATION_TIMEOUT_SECS")? {
            config.controller.operation_timeout_secs = secs;
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} must be a valid number", name))),
        Err(_) => Ok(None),
    }
}
