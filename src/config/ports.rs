// ABOUTME: Port mapping grammar for .rig.yml port entries
// Accepts "<port>" (same on host and container) or "<host>:<container>"

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("invalid port number: {0}")]
    InvalidPort(String),
    #[error("invalid host port: {0}")]
    InvalidHostPort(String),
    #[error("invalid container port: {0}")]
    InvalidContainerPort(String),
    #[error("invalid format, expected 'port' or 'host:container'")]
    InvalidFormat,
}

/// A TCP port published from the container to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }

    pub fn parse(spec: &str) -> Result<Self, PortSpecError> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [port] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| PortSpecError::InvalidPort(port.to_string()))?;
                Ok(Self::new(port, port))
            }
            [host, container] => {
                let host = host
                    .parse::<u16>()
                    .map_err(|_| PortSpecError::InvalidHostPort(host.to_string()))?;
                let container = container
                    .parse::<u16>()
                    .map_err(|_| PortSpecError::InvalidContainerPort(container.to_string()))?;
                Ok(Self::new(host, container))
            }
            _ => Err(PortSpecError::InvalidFormat),
        }
    }

    /// Docker's key for the container side, e.g. `3000/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/tcp", self.container)
    }

    /// True when `spec` already publishes `port` on either side.
    pub fn spec_mentions(spec: &str, port: u16) -> bool {
        let port = port.to_string();
        spec == port || spec.starts_with(&format!("{}:", port)) || spec.ends_with(&format!(":{}", port))
    }
}

impl FromStr for PortMapping {
    type Err = PortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}
