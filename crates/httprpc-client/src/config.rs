use httprpc_common::protocol::error::{Result, RpcError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How the round-robin cursor of a service advances during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Advance once per selection, so the first candidate visits every
    /// address in turn.
    #[default]
    PerCall,
    /// Advance once for every address visited while building the candidate
    /// list. A service with N addresses moves its starting point by N per
    /// selection, so while the address set is stable every selection starts
    /// at the same address.
    PerAddress,
}

/// Client configuration.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides:
///
/// ```toml
/// sync_interval_secs = 10
/// sync_delete_stale = true
/// rotation = "per_address"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connect timeout of pools created for newly learned addresses
    pub connect_timeout_ms: u64,
    /// Read/write timeout of pools created for newly learned addresses
    pub rw_timeout_ms: u64,
    /// Timeout of find-service and find-services calls
    pub nameserver_timeout_ms: u64,
    /// Interval used by `auto_sync_services` when none is given
    pub sync_interval_secs: u64,
    /// Drop cached addresses the nameserver no longer reports
    pub sync_delete_stale: bool,
    /// Also drop stale addresses of the nameserver's own services
    pub sync_delete_nameserver: bool,
    pub monitor_check_interval_secs: u64,
    pub monitor_connect_timeout_ms: u64,
    /// Idle connections kept per address
    pub pool_max_idle: usize,
    /// How long a pool stays dead after a failed connect
    pub pool_retry_interval_ms: u64,
    pub rotation: RotationPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            rw_timeout_ms: 30_000,
            nameserver_timeout_ms: 30_000,
            sync_interval_secs: 3,
            sync_delete_stale: true,
            sync_delete_nameserver: false,
            monitor_check_interval_secs: 1,
            monitor_connect_timeout_ms: 1_000,
            pool_max_idle: 16,
            pool_retry_interval_ms: 1_000,
            rotation: RotationPolicy::PerCall,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RpcError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml(&contents)
            .map_err(|e| RpcError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn rw_timeout(&self) -> Duration {
        Duration::from_millis(self.rw_timeout_ms)
    }

    pub fn nameserver_timeout(&self) -> Duration {
        Duration::from_millis(self.nameserver_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn monitor_check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_check_interval_secs)
    }

    pub fn monitor_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_connect_timeout_ms)
    }

    pub fn pool_retry_interval(&self) -> Duration {
        Duration::from_millis(self.pool_retry_interval_ms)
    }
}
