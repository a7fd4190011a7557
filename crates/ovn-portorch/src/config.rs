//! Configuration file support for portorchd
//!
//! Loads and validates the reconciler configuration from TOML files.
//! Default location: /etc/neutron/ovn-portorch.toml

use crate::error::{PortOrchError, Result};
use ovn_orch_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/neutron/ovn-portorch.toml";

/// OVN integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvnConfig {
    /// Directory holding vhost-user sockets on compute hosts
    #[serde(default = "default_vhost_sock_dir")]
    pub vhost_sock_dir: PathBuf,

    /// Name of the HA chassis group external ports join
    #[serde(default = "default_ha_chassis_group")]
    pub default_ha_chassis_group: String,
}

/// Per-network worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Bounded queue depth for each network worker
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Seconds a worker may sit idle before it is retired
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Backend retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per backend call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single delay in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// Periodic maintenance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between HA chassis group membership repairs
    #[serde(default = "default_maintenance_interval")]
    pub interval_secs: u64,
}

/// Complete portorchd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortOrchConfig {
    #[serde(default)]
    pub ovn: OvnConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

// Default functions
fn default_vhost_sock_dir() -> PathBuf {
    PathBuf::from("/var/run/openvswitch")
}

fn default_ha_chassis_group() -> String {
    "default_ha_chassis_group".to_string()
}

fn default_queue_depth() -> usize {
    256
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    2000
}

fn default_maintenance_interval() -> u64 {
    300
}

// Default implementations
impl Default for OvnConfig {
    fn default() -> Self {
        Self {
            vhost_sock_dir: default_vhost_sock_dir(),
            default_ha_chassis_group: default_ha_chassis_group(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_maintenance_interval(),
        }
    }
}

impl DispatcherConfig {
    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl RetryConfig {
    /// Builds the backoff policy used around backend calls
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl PortOrchConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    PortOrchError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(PortOrchError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            PortOrchError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path.as_ref(), content)?;

        Ok(())
    }

    /// Get maintenance interval as Duration
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance.interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ovn.default_ha_chassis_group.trim().is_empty() {
            return Err(PortOrchError::Configuration(
                "default_ha_chassis_group must not be empty".to_string(),
            ));
        }

        if self.dispatcher.queue_depth == 0 {
            return Err(PortOrchError::Configuration(
                "queue_depth must be > 0".to_string(),
            ));
        }

        if self.dispatcher.idle_timeout_secs == 0 {
            return Err(PortOrchError::Configuration(
                "idle_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(PortOrchError::Configuration(
                "max_attempts must be > 0".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(PortOrchError::Configuration(
                "initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }

        if self.maintenance.interval_secs == 0 {
            return Err(PortOrchError::Configuration(
                "maintenance interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortOrchConfig::default();
        assert_eq!(
            config.ovn.vhost_sock_dir,
            PathBuf::from("/var/run/openvswitch")
        );
        assert_eq!(config.ovn.default_ha_chassis_group, "default_ha_chassis_group");
        assert_eq!(config.dispatcher.queue_depth, 256);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = PortOrchConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_group() {
        let mut config = PortOrchConfig::default();
        config.ovn.default_ha_chassis_group = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_depth() {
        let mut config = PortOrchConfig::default();
        config.dispatcher.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff_order() {
        let mut config = PortOrchConfig::default();
        config.retry.initial_backoff_ms = 5000;
        config.retry.max_backoff_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = PortOrchConfig::default();
        assert_eq!(config.dispatcher.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.maintenance_interval(), Duration::from_secs(300));

        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[ovn]
vhost_sock_dir = "/run/vhost"

[retry]
max_attempts = 3
"#;
        let config: PortOrchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ovn.vhost_sock_dir, PathBuf::from("/run/vhost"));
        assert_eq!(config.retry.max_attempts, 3);
        // Unspecified values should use defaults
        assert_eq!(config.ovn.default_ha_chassis_group, "default_ha_chassis_group");
        assert_eq!(config.retry.max_backoff_ms, 2000);
        assert_eq!(config.maintenance.interval_secs, 300);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portorch.toml");

        let mut config = PortOrchConfig::default();
        config.ovn.default_ha_chassis_group = "edge_group".to_string();
        config.save(&path).unwrap();

        let loaded = PortOrchConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.ovn.default_ha_chassis_group, "edge_group");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[ovn\nvhost_sock_dir = ").unwrap();

        let result = PortOrchConfig::load_or_default(&path);
        assert!(matches!(result, Err(PortOrchError::Configuration(_))));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = PortOrchConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config.dispatcher.idle_timeout_secs, 60);
    }
}
