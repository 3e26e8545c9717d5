use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::defaults;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Recognized configuration options.
///
/// Durations are integral seconds. `address_verify_map` empty means the
/// verifier keeps its cache in memory only; `proxy_read_maps` is the
/// whitespace-separated allow-list of `proxy:type:name` references.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Backing store path for the verification cache; empty = memory only.
    #[serde(default)]
    pub address_verify_map: String,

    /// Envelope sender for probe messages; `<>` or empty = null sender.
    #[serde(default = "defaults::address_verify_sender")]
    pub address_verify_sender: String,

    #[serde(default = "defaults::positive_expire_time")]
    pub address_verify_positive_expire_time: u64,

    #[serde(default = "defaults::positive_refresh_time")]
    pub address_verify_positive_refresh_time: u64,

    #[serde(default = "defaults::negative_expire_time")]
    pub address_verify_negative_expire_time: u64,

    #[serde(default = "defaults::negative_refresh_time")]
    pub address_verify_negative_refresh_time: u64,

    /// Persist DEFER/BOUNCE results and in-progress markers.
    #[serde(default = "defaults::negative_cache")]
    pub address_verify_negative_cache: bool,

    /// Whitespace-separated `proxy:type:name` references the proxy may open.
    #[serde(default)]
    pub proxy_read_maps: String,

    /// Mail queue root; probe messages land in its `incoming` directory.
    #[serde(default = "defaults::queue_directory")]
    pub queue_directory: PathBuf,

    /// Connections served before a process recycles itself; 0 = unlimited.
    #[serde(default = "defaults::max_use")]
    pub max_use: u32,

    /// Seconds a process may sit idle before exiting; 0 = forever.
    #[serde(default = "defaults::max_idle")]
    pub max_idle: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            address_verify_map: String::new(),
            address_verify_sender: defaults::address_verify_sender(),
            address_verify_positive_expire_time: defaults::positive_expire_time(),
            address_verify_positive_refresh_time: defaults::positive_refresh_time(),
            address_verify_negative_expire_time: defaults::negative_expire_time(),
            address_verify_negative_refresh_time: defaults::negative_refresh_time(),
            address_verify_negative_cache: defaults::negative_cache(),
            proxy_read_maps: String::new(),
            queue_directory: defaults::queue_directory(),
            max_use: defaults::max_use(),
            max_idle: defaults::max_idle(),
        }
    }
}

impl Params {
    /// Load parameters from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Probe sender with null-sender forms collapsed to the empty string.
    ///
    /// `<>`, the empty string, and surrounding whitespace all normalize to
    /// `""`; the queue writer renders that as the literal `<>` on the wire.
    pub fn normalized_sender(&self) -> String {
        let sender = self.address_verify_sender.trim();
        if sender.is_empty() || sender == "<>" {
            String::new()
        } else {
            sender.to_string()
        }
    }
}
