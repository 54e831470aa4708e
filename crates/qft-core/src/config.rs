//! Configuration loaded from TOML.
//!
//! Every key is optional; missing keys fall back to `QftConfig::default()`.
//!
//! ```toml
//! data_dir = "/var/lib/qft"
//! listen_addr = "0.0.0.0:23333"
//! server_name = "qft-server"
//! event_buffer = 1024
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Runtime configuration shared by both roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QftConfig {
    /// Root for trust material (`<data_dir>/cert/`) and engine state.
    pub data_dir: PathBuf,

    /// Address the receiver listens on.
    pub listen_addr: SocketAddr,

    /// TLS server name used for the certificate and when connecting.
    pub server_name: String,

    /// Capacity of the snapshot channel between engine and ingest loop.
    pub event_buffer: usize,
}

impl Default for QftConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("qft-data"),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 23333)),
            server_name: "qft-server".to_string(),
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("event_buffer must be at least 1")]
    ZeroEventBuffer,
}

impl QftConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: QftConfig = toml::from_str(content)?;
        config.validate()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        Ok(self)
    }
}
