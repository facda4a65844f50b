// ABOUTME: Project identity derived from the working directory and config content
// Image and container names are pure functions of the project name; tags hash the config bytes

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file
pub const CONFIG_FILE_NAME: &str = ".rig.yml";

/// Number of hex characters of the config hash used as image tag
pub const HASH_LENGTH: usize = 12;

/// Prefix shared by every image repository and container this tool owns
pub const NAME_PREFIX: &str = "rig-";

/// Identity of one project: its name and host workspace directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    workspace: PathBuf,
}

impl Project {
    /// Derives the project name from the last component of `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let workspace = dir.into();
        let name = workspace
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        Self { name, workspace }
    }

    /// A project known only by name, as used by `down` and `destroy`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace: PathBuf::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config_path(&self) -> PathBuf {
        config_path(&self.workspace)
    }

    pub fn repository(&self) -> String {
        repository_name(&self.name)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.name)
    }

    pub fn image_reference(&self, config_bytes: &[u8]) -> ImageReference {
        ImageReference::for_project(&self.name, config_bytes)
    }
}

/// An image `repository:tag` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// The reference for `project` at the given configuration content.
    pub fn for_project(project: &str, config_bytes: &[u8]) -> Self {
        Self::new(repository_name(project), compute_hash(config_bytes))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Truncated SHA-256 of `data`, hex encoded.
pub fn compute_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut encoded = hex::encode(digest);
    encoded.truncate(HASH_LENGTH);
    encoded
}

pub fn repository_name(project: &str) -> String {
    format!("{}{}", NAME_PREFIX, project)
}

pub fn container_name(project: &str) -> String {
    format!("{}{}", NAME_PREFIX, project)
}

/// Strips the `rig-` prefix for display.
pub fn project_from_container_name(name: &str) -> Option<&str> {
    name.trim_start_matches('/').strip_prefix(NAME_PREFIX)
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

pub fn config_exists(dir: &Path) -> bool {
    config_path(dir).is_file()
}
