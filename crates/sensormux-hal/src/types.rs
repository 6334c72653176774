//! Sensor descriptors, events and request parameters

use crate::handle::SensorHandle;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Sensor types (numbering follows the Linux/Android sensor ABI)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    MetaData = 0,
    Accelerometer = 1,
    MagneticField = 2,
    Orientation = 3,
    Gyroscope = 4,
    Light = 5,
    Pressure = 6,
    Proximity = 8,
    Gravity = 9,
    LinearAcceleration = 10,
    RotationVector = 11,
    RelativeHumidity = 12,
    AmbientTemperature = 13,
    SignificantMotion = 17,
    StepDetector = 18,
    StepCounter = 19,
    HeartRate = 21,
    DynamicSensorMeta = 32,
    AdditionalInfo = 33,
}

impl SensorType {
    /// Get config name
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::MetaData => "meta_data",
            SensorType::Accelerometer => "accelerometer",
            SensorType::MagneticField => "magnetic_field",
            SensorType::Orientation => "orientation",
            SensorType::Gyroscope => "gyroscope",
            SensorType::Light => "light",
            SensorType::Pressure => "pressure",
            SensorType::Proximity => "proximity",
            SensorType::Gravity => "gravity",
            SensorType::LinearAcceleration => "linear_acceleration",
            SensorType::RotationVector => "rotation_vector",
            SensorType::RelativeHumidity => "relative_humidity",
            SensorType::AmbientTemperature => "ambient_temperature",
            SensorType::SignificantMotion => "significant_motion",
            SensorType::StepDetector => "step_detector",
            SensorType::StepCounter => "step_counter",
            SensorType::HeartRate => "heart_rate",
            SensorType::DynamicSensorMeta => "dynamic_sensor_meta",
            SensorType::AdditionalInfo => "additional_info",
        }
    }

    /// Parse from config name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "meta_data" => Some(SensorType::MetaData),
            "accelerometer" => Some(SensorType::Accelerometer),
            "magnetic_field" => Some(SensorType::MagneticField),
            "orientation" => Some(SensorType::Orientation),
            "gyroscope" => Some(SensorType::Gyroscope),
            "light" => Some(SensorType::Light),
            "pressure" => Some(SensorType::Pressure),
            "proximity" => Some(SensorType::Proximity),
            "gravity" => Some(SensorType::Gravity),
            "linear_acceleration" => Some(SensorType::LinearAcceleration),
            "rotation_vector" => Some(SensorType::RotationVector),
            "relative_humidity" => Some(SensorType::RelativeHumidity),
            "ambient_temperature" => Some(SensorType::AmbientTemperature),
            "significant_motion" => Some(SensorType::SignificantMotion),
            "step_detector" => Some(SensorType::StepDetector),
            "step_counter" => Some(SensorType::StepCounter),
            "heart_rate" => Some(SensorType::HeartRate),
            "dynamic_sensor_meta" => Some(SensorType::DynamicSensorMeta),
            "additional_info" => Some(SensorType::AdditionalInfo),
            _ => None,
        }
    }

    /// Types that may be injected while the proxy is in normal mode
    pub fn is_administrative(&self) -> bool {
        matches!(self, SensorType::AdditionalInfo)
    }
}

bitflags! {
    /// Sensor capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SensorFlags: u32 {
        const WAKE_UP = 0x1;
        const ON_CHANGE_MODE = 0x2;
        const ONE_SHOT_MODE = 0x4;
        const SPECIAL_REPORTING_MODE = 0x6;
        const DATA_INJECTION = 0x10;
        const DYNAMIC_SENSOR = 0x20;
        const ADDITIONAL_INFO = 0x40;
        const DIRECT_REPORT_RATE_NORMAL = 0x80;
        const DIRECT_REPORT_RATE_FAST = 0x100;
        const DIRECT_REPORT_RATE_VERY_FAST = 0x200;
        const DIRECT_CHANNEL_ASHMEM = 0x400;
        const DIRECT_CHANNEL_GRALLOC = 0x800;

        const MASK_REPORTING_MODE = 0xE;
        const MASK_DIRECT_REPORT = 0x380;
        const MASK_DIRECT_CHANNEL = 0xC00;
    }
}

impl SensorFlags {
    /// Every flag that advertises the direct report channel
    pub const DIRECT_CAPABILITIES: SensorFlags =
        SensorFlags::MASK_DIRECT_REPORT.union(SensorFlags::MASK_DIRECT_CHANNEL);
}

/// Sensor descriptor as reported by a backend and served to the framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_handle: SensorHandle,
    pub name: String,
    pub vendor: String,
    pub version: i32,
    pub sensor_type: SensorType,
    pub max_range: f32,
    pub resolution: f32,
    /// Current draw in mA
    pub power: f32,
    pub min_delay_us: i32,
    pub max_delay_us: i32,
    pub fifo_reserved_event_count: u32,
    pub fifo_max_event_count: u32,
    pub flags: SensorFlags,
}

impl SensorInfo {
    /// Descriptor with neutral defaults for everything but identity
    pub fn new(handle: impl Into<SensorHandle>, name: &str, sensor_type: SensorType) -> Self {
        Self {
            sensor_handle: handle.into(),
            name: name.to_string(),
            vendor: "SensorMux".to_string(),
            version: 1,
            sensor_type,
            max_range: 0.0,
            resolution: 0.0,
            power: 0.0,
            min_delay_us: 0,
            max_delay_us: 0,
            fifo_reserved_event_count: 0,
            fifo_max_event_count: 0,
            flags: SensorFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: SensorFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_wake_up(&self) -> bool {
        self.flags.contains(SensorFlags::WAKE_UP)
    }

    pub fn supports_direct_channel(&self) -> bool {
        self.flags.intersects(SensorFlags::DIRECT_CAPABILITIES)
    }
}

/// Number of payload values carried by one event
pub const EVENT_PAYLOAD_LEN: usize = 16;

/// One sensor reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Nanoseconds, monotonic clock of the producing backend
    pub timestamp: i64,
    pub sensor_handle: SensorHandle,
    pub sensor_type: SensorType,
    pub data: [f32; EVENT_PAYLOAD_LEN],
}

impl Event {
    pub fn new(handle: impl Into<SensorHandle>, sensor_type: SensorType, timestamp: i64) -> Self {
        Self {
            timestamp,
            sensor_handle: handle.into(),
            sensor_type,
            data: [0.0; EVENT_PAYLOAD_LEN],
        }
    }

    /// Copy `values` into the payload, truncating past the payload length
    pub fn with_values(mut self, values: &[f32]) -> Self {
        let len = values.len().min(EVENT_PAYLOAD_LEN);
        self.data[..len].copy_from_slice(&values[..len]);
        self
    }
}

/// Global operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[default]
    Normal,
    /// Backends accept injected samples in place of hardware data
    DataInjection,
}

/// Direct report rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLevel {
    Stop,
    Normal,
    Fast,
    VeryFast,
}

/// Backing memory of a direct report channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedMemType {
    Ashmem,
    Gralloc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedMemFormat {
    SensorsEvent,
}

/// Description of a direct report shared memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMemInfo {
    pub mem_type: SharedMemType,
    pub format: SharedMemFormat,
    pub size: u32,
    /// Platform handle of the region (fd on Linux)
    pub memory_handle: i32,
}
