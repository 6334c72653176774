//! Sensor multiplexing proxy
//!
//! Presents many independently written sensor backends to the framework as a
//! single sensor interface. Each backend numbers its own sensors; the proxy
//! namespaces those handles, routes calls back to the owning backend and
//! merges every backend's events into one output channel.
//!
//! # Components
//!
//! - [`handle`]: global handle encoding
//! - [`registry`]: global sensor list, direct channel arbitration
//! - [`proxy`]: call routing and operation mode switching
//! - [`writer`]: ordered, non-blocking delivery into the output channel
//! - [`wakelock`]: reference-counted wake lock with a timeout watchdog
//! - [`mock`]: simulated backends
//!
//! # Example
//!
//! ```no_run
//! use sensormux_hal::mock::{MockBackend, MockProfile, RecordingDynamicSensors};
//! use sensormux_hal::{ChannelEventQueue, SensorBackend, SensorsProxy};
//! use sensormux_config::SensorMuxConfig;
//! use std::sync::Arc;
//!
//! fn main() -> sensormux_hal::Result<()> {
//!     let config = SensorMuxConfig::default();
//!     let backends: Vec<Arc<dyn SensorBackend>> = vec![
//!         Arc::new(MockBackend::from_profile(MockProfile::Imu)?),
//!         Arc::new(MockBackend::from_profile(MockProfile::Environment)?),
//!     ];
//!
//!     let proxy = SensorsProxy::from_config(backends, &config)?;
//!     let (queue, reader) = ChannelEventQueue::new(config.event_queue.capacity);
//!     proxy.initialize(queue, Arc::new(RecordingDynamicSensors::default()))?;
//!
//!     for sensor in proxy.sensors_list() {
//!         proxy.activate(sensor.sensor_handle, true)?;
//!     }
//!     let _events = reader.read(64);
//!     Ok(())
//! }
//! ```

pub mod backend;
mod callback;
pub mod error;
pub mod handle;
mod hotplug;
pub mod mock;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod types;
pub mod wakelock;
pub mod writer;

pub use backend::{BackendCallback, DynamicSensorsCallback, SensorBackend};
pub use error::HalError;
pub use handle::{BackendIndex, SensorHandle};
pub use proxy::{DIRECT_REPORT_ALL_SENSORS, SensorsProxy};
pub use queue::{ChannelEventQueue, EventFlag, EventFlagBits, EventQueue, EventQueueReader};
pub use registry::SensorRegistry;
pub use types::{
    Event, OperationMode, RateLevel, SensorFlags, SensorInfo, SensorType, SharedMemFormat,
    SharedMemInfo, SharedMemType,
};
pub use wakelock::{
    NoopWakeLock, ScopedWakeLock, SysfsWakeLock, WakeLockManager, WakeLockPrimitive,
};
pub use writer::{OutputWriter, WriterStats};

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_imports() {
        let _ = std::mem::size_of::<SensorsProxy>();
        let _ = std::mem::size_of::<Event>();
    }
}
