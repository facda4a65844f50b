// ABOUTME: User-level settings read from <config dir>/rig/config.toml
// Missing file means defaults; only the Docker connection is configurable today

use super::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker: DockerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    /// Overrides DOCKER_HOST, e.g. "unix:///Users/me/.colima/default/docker.sock"
    pub host: Option<String>,
    /// Grace period before the engine kills a stopping container
    pub stop_timeout_secs: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            docker: DockerSettings::default(),
        }
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            host: None,
            stop_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rig").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No app config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::App(format!("{}: {}", path.display(), e)))
    }
}
