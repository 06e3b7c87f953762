//! Authorization core configuration with validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default guardian set resolution budget (connect + both contract reads).
pub const DEFAULT_RESOLVER_TIMEOUT_SECS: u64 = 5;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Permissions file
    pub permissions_file: PathBuf,
    /// Permission reload behaviour
    pub reload: ReloadConfig,
    /// Guardian set resolver endpoint
    pub guardian: GuardianResolverConfig,
    /// Logging
    pub telemetry: TelemetryConfig,
}

impl AuthConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permissions_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingPermissionsFile);
        }

        if self.reload.enabled && self.reload.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(
                "poll_interval_secs cannot be 0 when reload is enabled".into(),
            ));
        }

        self.guardian.validate()
    }
}

/// Permission file reload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Watch the permissions file for changes
    pub enabled: bool,
    /// How often to check the file's modification time
    pub poll_interval_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 10,
        }
    }
}

impl ReloadConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Guardian set resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianResolverConfig {
    /// JSON-RPC endpoint of the chain hosting the core bridge
    pub rpc_url: Option<String>,
    /// Core bridge contract address
    pub core_bridge_address: Option<String>,
    /// Budget for the whole resolution
    pub timeout_secs: u64,
}

impl Default for GuardianResolverConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            core_bridge_address: None,
            timeout_secs: DEFAULT_RESOLVER_TIMEOUT_SECS,
        }
    }
}

impl GuardianResolverConfig {
    /// Resolution budget as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate resolver settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "guardian timeout_secs cannot be 0".into(),
            ));
        }

        // Either both or neither
        if self.rpc_url.is_some() != self.core_bridge_address.is_some() {
            return Err(ConfigError::IncompleteResolver);
        }

        if let Some(url) = &self.rpc_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidRpcUrl(url.clone()));
            }
        }

        Ok(())
    }

    /// Whether an endpoint is configured
    pub fn is_configured(&self) -> bool {
        self.rpc_url.is_some() && self.core_bridge_address.is_some()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of pretty output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No permissions file configured
    #[error("permissions file is not configured")]
    MissingPermissionsFile,
    /// Invalid interval
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Only one of rpc_url / core_bridge_address set
    #[error("guardian resolver needs both rpc_url and core_bridge_address")]
    IncompleteResolver,
    /// RPC URL is not http(s)
    #[error("invalid rpc url: {0}")]
    InvalidRpcUrl(String),
}
