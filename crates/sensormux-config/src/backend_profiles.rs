//! Simulated backend profiles
//!
//! Describes the sensors a simulated backend reports. The daemon uses these to
//! stand in for real vendor drivers on development machines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::ConfigError;

/// One sensor of a simulated backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSensorConfig {
    /// Backend-local handle
    pub handle: u32,
    /// Human readable name
    pub name: String,
    /// Sensor type name (accelerometer, gyroscope, pressure, ...)
    pub sensor_type: String,
    /// Deliver as wake-up sensor
    #[serde(default)]
    pub wake_up: bool,
    /// Advertise direct report channel support
    #[serde(default)]
    pub direct_channel: bool,
    /// Sample rate while active
    #[serde(default = "default_rate")]
    pub rate_hz: u32,
}

fn default_rate() -> u32 {
    10
}

/// A simulated backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBackendConfig {
    pub name: String,
    #[serde(default)]
    pub sensors: Vec<SimulatedSensorConfig>,
}

impl SimulatedBackendConfig {
    /// Inertial backend with direct channel support
    pub fn imu() -> Self {
        Self {
            name: "imu".to_string(),
            sensors: vec![
                sensor(1, "Accelerometer", "accelerometer", 50),
                sensor(2, "Gyroscope", "gyroscope", 50),
                sensor(3, "Magnetometer", "magnetic_field", 20),
                SimulatedSensorConfig {
                    wake_up: true,
                    rate_hz: 1,
                    ..sensor(4, "Significant Motion", "significant_motion", 1)
                },
            ]
            .into_iter()
            .map(|mut s| {
                s.direct_channel = s.sensor_type != "significant_motion";
                s
            })
            .collect(),
        }
    }

    /// Environmental backend (barometer, light, proximity)
    pub fn environment() -> Self {
        Self {
            name: "environment".to_string(),
            sensors: vec![
                sensor(1, "Barometer", "pressure", 5),
                sensor(2, "Ambient Light", "light", 5),
                SimulatedSensorConfig {
                    wake_up: true,
                    ..sensor(3, "Proximity", "proximity", 2)
                },
            ],
        }
    }

    /// Wearable companion backend, also claims direct channel support
    pub fn wrist() -> Self {
        Self {
            name: "wrist".to_string(),
            sensors: vec![
                SimulatedSensorConfig {
                    direct_channel: true,
                    ..sensor(1, "Wrist Accelerometer", "accelerometer", 25)
                },
                SimulatedSensorConfig {
                    wake_up: true,
                    ..sensor(2, "Step Detector", "step_detector", 2)
                },
            ],
        }
    }

    /// Check per-backend constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut handles = HashSet::new();
        for sensor in &self.sensors {
            if !handles.insert(sensor.handle) {
                return Err(ConfigError::Invalid(format!(
                    "backend '{}' reports handle {} twice",
                    self.name, sensor.handle
                )));
            }
            if sensor.rate_hz == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sensor '{}' of backend '{}' has a zero rate",
                    sensor.name, self.name
                )));
            }
        }
        Ok(())
    }
}

fn sensor(handle: u32, name: &str, sensor_type: &str, rate_hz: u32) -> SimulatedSensorConfig {
    SimulatedSensorConfig {
        handle,
        name: name.to_string(),
        sensor_type: sensor_type.to_string(),
        wake_up: false,
        direct_channel: false,
        rate_hz,
    }
}

/// Load simulated backend profiles from configuration directory
///
/// Built-in profiles come first; `*.toml` files under `<dir>/backends`
/// override them by name.
pub fn load_backend_profiles(
    config_dir: &Path,
) -> Result<BTreeMap<String, SimulatedBackendConfig>, ConfigError> {
    let profiles_dir = config_dir.join("backends");
    let mut profiles = BTreeMap::new();

    for profile in [
        SimulatedBackendConfig::imu(),
        SimulatedBackendConfig::environment(),
        SimulatedBackendConfig::wrist(),
    ] {
        profiles.insert(profile.name.clone(), profile);
    }

    if profiles_dir.exists() {
        for entry in std::fs::read_dir(&profiles_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_some_and(|e| e == "toml") {
                let contents = std::fs::read_to_string(&path)?;
                let profile: SimulatedBackendConfig = toml::from_str(&contents)?;
                profile.validate()?;
                tracing::debug!("Loaded backend profile {} from {}", profile.name, path.display());
                profiles.insert(profile.name.clone(), profile);
            }
        }
    }

    Ok(profiles)
}
