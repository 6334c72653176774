//! Configuration management for SensorMux
//!
//! Handles proxy tuning (output channel size, backlog policy, wake lock) and the
//! simulated backend descriptions used by the daemon. TOML-based config files.

mod backend_profiles;
mod proxy_config;

pub use backend_profiles::{SimulatedBackendConfig, SimulatedSensorConfig, load_backend_profiles};
pub use proxy_config::{EventQueueConfig, OverflowPolicy, WakeLockConfig, WriterConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/sensormux";
pub const USER_CONFIG_SUBDIR: &str = ".config/sensormux";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Upper bound on backends: the backend index must fit in one handle byte.
pub const MAX_BACKENDS: usize = 255;

/// Main SensorMux configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorMuxConfig {
    #[serde(default)]
    pub event_queue: EventQueueConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub wake_lock: WakeLockConfig,

    #[serde(default)]
    pub backends: Vec<SimulatedBackendConfig>,
}

impl SensorMuxConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // Try user config first, then system config
        if let Some(home) = std::env::var_os("HOME") {
            let user_config = Path::new(&home)
                .join(USER_CONFIG_SUBDIR)
                .join(CONFIG_FILE_NAME);
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let system_config = Path::new(CONFIG_DIR).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_queue.capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue.capacity must be greater than zero".into(),
            ));
        }

        if self.backends.len() > MAX_BACKENDS {
            return Err(ConfigError::Invalid(format!(
                "{} backends configured, at most {} are addressable",
                self.backends.len(),
                MAX_BACKENDS
            )));
        }

        let mut names = HashSet::new();
        for backend in &self.backends {
            if !names.insert(backend.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate backend name '{}'",
                    backend.name
                )));
            }
            backend.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SensorMuxConfig::default();
        assert_eq!(config.event_queue.capacity, 128);
        assert_eq!(config.writer.overflow_policy, OverflowPolicy::DropOldest);
        assert!(config.backends.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = SensorMuxConfig::default();
        config.backends.push(SimulatedBackendConfig::imu());
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SensorMuxConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.event_queue.capacity, config.event_queue.capacity);
        assert_eq!(parsed.backends.len(), 1);
        assert_eq!(parsed.backends[0].sensors.len(), config.backends[0].sensors.len());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound(PathBuf::from("/etc/sensormux/config.toml"));
        assert!(format!("{}", err).contains("not found"));

        let err = ConfigError::Invalid("test error".to_string());
        assert!(format!("{}", err).contains("Invalid"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[event_queue]
capacity = 16

[writer]
blocking_write_timeout_ms = 250
max_backlog_events = 0
overflow_policy = "reject-batch"

[wake_lock]
enabled = false

[[backends]]
name = "baro"

[[backends.sensors]]
handle = 3
name = "Pressure"
sensor_type = "pressure"
rate_hz = 10
"#;
        write!(temp_file, "{}", config_content).unwrap();

        let config = SensorMuxConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.event_queue.capacity, 16);
        assert_eq!(config.writer.blocking_write_timeout_ms, 250);
        assert_eq!(config.writer.backlog_bound(), None);
        assert_eq!(config.writer.overflow_policy, OverflowPolicy::RejectBatch);
        assert!(!config.wake_lock.enabled);
        assert_eq!(config.wake_lock.name, "sensormux_wakeup");
        assert_eq!(config.backends[0].sensors[0].handle, 3);
        assert!(!config.backends[0].sensors[0].wake_up);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SensorMuxConfig::load(Path::new("/nonexistent/sensormux.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = SensorMuxConfig::default();
        config.event_queue.capacity = 64;

        config.save(&path).unwrap();

        let loaded = SensorMuxConfig::load(&path).unwrap();
        assert_eq!(loaded.event_queue.capacity, 64);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = SensorMuxConfig::default();
        config.event_queue.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_backend_names() {
        let mut config = SensorMuxConfig::default();
        config.backends.push(SimulatedBackendConfig::imu());
        config.backends.push(SimulatedBackendConfig::imu());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate backend"));
    }

    #[test]
    fn test_validate_rejects_too_many_backends() {
        let mut config = SensorMuxConfig::default();
        for i in 0..=MAX_BACKENDS {
            config.backends.push(SimulatedBackendConfig {
                name: format!("backend{}", i),
                sensors: vec![],
            });
        }
        assert!(config.validate().is_err());
    }
}
