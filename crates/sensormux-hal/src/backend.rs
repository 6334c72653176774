//! Backend and framework interfaces
//!
//! A backend is an independently written sensor driver. The proxy holds an
//! ordered list of `Arc<dyn SensorBackend>` and hands each one its own
//! [`BackendCallback`] to report events and sensor hotplug through.

use crate::wakelock::ScopedWakeLock;
use crate::{Event, HalError, OperationMode, RateLevel, SensorHandle, SensorInfo, SharedMemInfo};
use std::sync::Arc;

/// Operations every backend driver implements
///
/// Handles passed in are backend-local; the proxy has already stripped its
/// namespace byte.
pub trait SensorBackend: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Static sensors provided by this backend, with backend-local handles
    fn sensors_list(&self) -> Result<Vec<SensorInfo>, HalError>;

    /// Called once the framework connected; `callback` stays valid for the
    /// lifetime of the proxy
    fn initialize(&self, callback: Arc<dyn BackendCallback>) -> Result<(), HalError>;

    fn set_operation_mode(&self, mode: OperationMode) -> Result<(), HalError>;

    fn activate(&self, handle: SensorHandle, enabled: bool) -> Result<(), HalError>;

    fn batch(
        &self,
        handle: SensorHandle,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    ) -> Result<(), HalError>;

    fn flush(&self, handle: SensorHandle) -> Result<(), HalError>;

    fn inject_sensor_data(&self, event: &Event) -> Result<(), HalError>;

    /// Returns the channel handle
    fn register_direct_channel(&self, mem: &SharedMemInfo) -> Result<i32, HalError> {
        let _ = mem;
        Err(HalError::InvalidOperation(format!(
            "{} has no direct channel support",
            self.name()
        )))
    }

    fn unregister_direct_channel(&self, channel_handle: i32) -> Result<(), HalError> {
        let _ = channel_handle;
        Err(HalError::InvalidOperation(format!(
            "{} has no direct channel support",
            self.name()
        )))
    }

    /// Returns the report token
    fn config_direct_report(
        &self,
        handle: SensorHandle,
        channel_handle: i32,
        rate: RateLevel,
    ) -> Result<i32, HalError> {
        let _ = (handle, channel_handle, rate);
        Err(HalError::InvalidOperation(format!(
            "{} has no direct channel support",
            self.name()
        )))
    }
}

/// What a backend calls back into; one instance per backend
pub trait BackendCallback: Send + Sync {
    /// Deliver events with backend-local handles.
    ///
    /// `wake_lock` must be locked iff `events` holds a wake-up event; it is
    /// released when the call returns.
    fn post_events(&self, events: &[Event], wake_lock: ScopedWakeLock);

    /// A wake lock hold valid for one `post_events` call
    fn create_scoped_wake_lock(&self, lock: bool) -> ScopedWakeLock;

    fn on_dynamic_sensors_connected(&self, sensors: Vec<SensorInfo>);

    fn on_dynamic_sensors_disconnected(&self, handles: Vec<SensorHandle>);
}

/// Framework side of sensor hotplug notifications
pub trait DynamicSensorsCallback: Send + Sync {
    /// Sensors carry global handles
    fn on_dynamic_sensors_connected(&self, sensors: &[SensorInfo]);

    fn on_dynamic_sensors_disconnected(&self, handles: &[SensorHandle]);
}
