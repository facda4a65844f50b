// ABOUTME: Project configuration loaded from .rig.yml plus user-level app settings
// The raw file bytes are retained because the image tag is derived from them

pub mod app_config;
pub mod ports;

pub use app_config::AppConfig;
pub use ports::{PortMapping, PortSpecError};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CODE_SERVER_PORT: u16 = 8080;

pub const SUPPORTED_LANGUAGES: &[&str] = &["go", "node", "rust", "java", "python", "ruby"];

lazy_static! {
    static ref ENV_REFERENCE: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unsupported language: {0} (supported: go, node, rust, java, python, ruby)")]
    UnsupportedLanguage(String),
    #[error("invalid build system {build_system:?} for language {language} (valid: {valid})")]
    InvalidBuildSystem {
        language: String,
        build_system: String,
        valid: String,
    },
    #[error("invalid port {spec:?}: {source}")]
    InvalidPort {
        spec: String,
        #[source]
        source: PortSpecError,
    },
    #[error("unsupported shell: {0} (supported: bash, zsh, fish)")]
    InvalidShell(String),
    #[error("app config error: {0}")]
    App(String),
}

/// Interactive shell installed in the image and used as the default command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shell {
    Bash,
    #[default]
    Zsh,
    Fish,
}

impl Shell {
    pub fn name(&self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
        }
    }

    pub fn path(&self) -> String {
        format!("/bin/{}", self.name())
    }
}

impl FromStr for Shell {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            "fish" => Ok(Shell::Fish),
            other => Err(ConfigError::InvalidShell(other.to_string())),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One language runtime entry under `languages:`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LanguageConfig {
    /// "20.10.0", "lts", "latest", or empty for latest
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build_system: Option<String>,
    #[serde(default)]
    pub build_system_version: Option<String>,
}

impl LanguageConfig {
    pub fn version(&self) -> &str {
        match self.version.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => "latest",
        }
    }
}

/// Build systems accepted for each language; go has none beyond the toolchain
pub fn build_systems_for(language: &str) -> &'static [&'static str] {
    match language {
        "node" => &["npm", "yarn", "pnpm"],
        "rust" => &["cargo"],
        "java" => &["gradle", "maven", "ant", "sbt"],
        "python" => &["pip", "poetry", "pipenv"],
        "ruby" => &["bundler", "gem"],
        _ => &[],
    }
}

// `languages:` followed only by comments parses as null
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The resolved `.rig.yml` for one session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub languages: BTreeMap<String, LanguageConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub code_server: bool,
    #[serde(default)]
    pub code_server_port: Option<u16>,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self, ConfigError> {
        // An empty file is a valid, empty configuration
        let mut config: SessionConfig = if data.iter().all(u8::is_ascii_whitespace) {
            SessionConfig::default()
        } else {
            serde_yaml::from_slice::<Option<SessionConfig>>(data)?.unwrap_or_default()
        };
        config.raw = data.to_vec();
        Ok(config)
    }

    /// Bytes the configuration was parsed from; the image tag hashes these.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (language, language_config) in &self.languages {
            if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
                return Err(ConfigError::UnsupportedLanguage(language.clone()));
            }
            if let Some(build_system) = language_config.build_system.as_deref() {
                if build_system.is_empty() {
                    continue;
                }
                let valid = build_systems_for(language);
                if !valid.contains(&build_system) {
                    return Err(ConfigError::InvalidBuildSystem {
                        language: language.clone(),
                        build_system: build_system.to_string(),
                        valid: valid.join(", "),
                    });
                }
            }
        }

        for spec in &self.ports {
            PortMapping::parse(spec).map_err(|source| ConfigError::InvalidPort {
                spec: spec.clone(),
                source,
            })?;
        }

        if let Some(shell) = self.shell.as_deref() {
            if !shell.is_empty() {
                shell.parse::<Shell>()?;
            }
        }

        Ok(())
    }

    /// Replaces `${VAR}` and `$VAR` in env values with host values; unset expands to "".
    pub fn expand_env_vars(&mut self) {
        self.expand_env_with(|name| std::env::var(name).ok());
    }

    pub fn expand_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for value in self.env.values_mut() {
            let expanded = ENV_REFERENCE.replace_all(value.as_str(), |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                lookup(name).unwrap_or_default()
            });
            *value = expanded.into_owned();
        }
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.languages.contains_key(language)
    }

    pub fn shell(&self) -> Shell {
        self.shell
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Command run when no explicit command is given.
    pub fn default_command(&self) -> Vec<String> {
        vec![self.shell().path()]
    }

    pub fn code_server_port(&self) -> u16 {
        match self.code_server_port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_CODE_SERVER_PORT,
        }
    }

    /// Configured ports, plus the code-server port when enabled and not yet published.
    pub fn all_ports(&self) -> Vec<String> {
        let mut ports = self.ports.clone();
        if self.code_server {
            let port = self.code_server_port();
            if !ports.iter().any(|p| PortMapping::spec_mentions(p, port)) {
                ports.push(port.to_string());
            }
        }
        ports
    }

    pub fn port_mappings(&self) -> Result<Vec<PortMapping>, ConfigError> {
        self.all_ports()
            .iter()
            .map(|spec| {
                PortMapping::parse(spec).map_err(|source| ConfigError::InvalidPort {
                    spec: spec.clone(),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
languages:
  node:
    version: "lts"
    build_system: pnpm
  python:
    version: "3.12"
    build_system: poetry
    build_system_version: "1.7.0"
ports:
  - "3000"
  - "8080:9090"
env:
  API_KEY: "${RIG_TEST_KEY}"
  DATABASE_URL: "postgres://$RIG_TEST_HOST:5432/dev"
shell: bash
"#;

    #[test]
    fn test_parse_sample() {
        let config = SessionConfig::parse(SAMPLE.as_bytes()).unwrap();
        assert!(config.has_language("node"));
        assert!(config.has_language("python"));
        assert!(!config.has_language("go"));
        assert_eq!(config.languages["node"].version(), "lts");
        assert_eq!(config.ports, vec!["3000", "8080:9090"]);
        assert_eq!(config.shell(), Shell::Bash);
        assert_eq!(config.raw(), SAMPLE.as_bytes());
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = SessionConfig::parse(b"").unwrap();
        assert!(config.languages.is_empty());
        assert_eq!(config.shell(), Shell::Zsh);
        assert_eq!(config.default_command(), vec!["/bin/zsh".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_null_sections_are_empty() {
        let config = SessionConfig::parse(b"languages:\n  # node: {}\nports:\nenv:\n").unwrap();
        assert!(config.languages.is_empty());
        assert!(config.ports.is_empty());
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            SessionConfig::parse(b"languages: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_language() {
        let config = SessionConfig::parse(b"languages:\n  cobol: {}\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedLanguage(lang)) if lang == "cobol"
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_build_system() {
        let config =
            SessionConfig::parse(b"languages:\n  node:\n    build_system: maven\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBuildSystem { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_port_and_shell() {
        let config = SessionConfig::parse(b"ports: [\"8080:9090:1\"]\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort { .. })));

        let config = SessionConfig::parse(b"shell: tcsh\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidShell(s)) if s == "tcsh"));
    }

    #[test]
    fn test_expand_env_vars() {
        let mut config = SessionConfig::parse(SAMPLE.as_bytes()).unwrap();
        config.expand_env_with(|name| match name {
            "RIG_TEST_KEY" => Some("secret".to_string()),
            "RIG_TEST_HOST" => Some("db".to_string()),
            _ => None,
        });
        assert_eq!(config.env["API_KEY"], "secret");
        assert_eq!(config.env["DATABASE_URL"], "postgres://db:5432/dev");

        let mut config = SessionConfig::parse(b"env:\n  MISSING: \"${NOPE}x\"\n").unwrap();
        config.expand_env_with(|_| None);
        assert_eq!(config.env["MISSING"], "x");
    }

    #[test]
    fn test_all_ports_adds_code_server() {
        let config = SessionConfig::parse(b"ports: [\"3000\"]\ncode_server: true\n").unwrap();
        assert_eq!(config.all_ports(), vec!["3000", "8080"]);

        let config =
            SessionConfig::parse(b"ports: [\"9000:8080\"]\ncode_server: true\n").unwrap();
        assert_eq!(config.all_ports(), vec!["9000:8080"]);

        let config =
            SessionConfig::parse(b"code_server: true\ncode_server_port: 8443\n").unwrap();
        assert_eq!(
            config.port_mappings().unwrap(),
            vec![PortMapping::new(8443, 8443)]
        );
    }
}
