//! The sensors proxy
//!
//! [`SensorsProxy`] is what the framework talks to. It owns the backend table,
//! routes per-sensor calls by the namespace byte of the handle, applies
//! operation mode changes across all backends, and owns the delivery side
//! (writer, wake lock, hotplug) shared with the per-backend callbacks.

use crate::backend::{BackendCallback, DynamicSensorsCallback, SensorBackend};
use crate::callback::ProxyCallback;
use crate::handle::{self, BackendIndex, SensorHandle};
use crate::queue::EventQueue;
use crate::registry::SensorRegistry;
use crate::wakelock::WakeLockManager;
use crate::writer::{OutputWriter, WriterStats};
use crate::{
    Event, HalError, OperationMode, RateLevel, Result, SensorInfo, SharedMemInfo,
};
use parking_lot::{Mutex, RwLock};
use sensormux_config::{MAX_BACKENDS, SensorMuxConfig, WriterConfig};
use std::sync::Arc;

/// Handle addressing every sensor of a direct channel in `config_direct_report`
///
/// Forwarded to the backend as is; it is never decoded to a local handle.
pub const DIRECT_REPORT_ALL_SENSORS: SensorHandle = SensorHandle(u32::MAX);

/// State shared between the proxy and the backend callbacks
pub(crate) struct ProxyShared {
    pub(crate) registry: SensorRegistry,
    pub(crate) wake_lock: Arc<WakeLockManager>,
    pub(crate) writer: RwLock<Option<OutputWriter>>,
    dynamic_callback: RwLock<Option<Arc<dyn DynamicSensorsCallback>>>,
}

impl ProxyShared {
    pub(crate) fn new(registry: SensorRegistry, wake_lock: Arc<WakeLockManager>) -> Self {
        Self {
            registry,
            wake_lock,
            writer: RwLock::new(None),
            dynamic_callback: RwLock::new(None),
        }
    }

    pub(crate) fn dynamic_callback(&self) -> Option<Arc<dyn DynamicSensorsCallback>> {
        self.dynamic_callback.read().clone()
    }

    pub(crate) fn set_dynamic_callback(&self, callback: Arc<dyn DynamicSensorsCallback>) {
        *self.dynamic_callback.write() = Some(callback);
    }
}

/// One sensor interface over many backends
pub struct SensorsProxy {
    backends: Vec<Arc<dyn SensorBackend>>,
    callbacks: Vec<Arc<ProxyCallback>>,
    shared: Arc<ProxyShared>,
    mode: Mutex<OperationMode>,
    writer_config: WriterConfig,
}

impl SensorsProxy {
    /// Build the registry from `backends`, in order
    ///
    /// The position of a backend in the list is its backend index.
    pub fn new(
        backends: Vec<Arc<dyn SensorBackend>>,
        writer_config: WriterConfig,
        wake_lock: Arc<WakeLockManager>,
    ) -> Result<Self> {
        if backends.len() > MAX_BACKENDS {
            return Err(HalError::ConfigurationError(format!(
                "{} backends given, at most {} fit the handle namespace",
                backends.len(),
                MAX_BACKENDS
            )));
        }

        let registry = SensorRegistry::build(&backends);
        let shared = Arc::new(ProxyShared::new(registry, Arc::clone(&wake_lock)));
        let callbacks = backends
            .iter()
            .enumerate()
            .map(|(index, backend)| {
                Arc::new(ProxyCallback::new(
                    index as BackendIndex,
                    backend.name(),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        wake_lock.start_watchdog();

        Ok(Self {
            backends,
            callbacks,
            shared,
            mode: Mutex::new(OperationMode::Normal),
            writer_config,
        })
    }

    /// Build with the writer and wake lock settings of `config`
    pub fn from_config(
        backends: Vec<Arc<dyn SensorBackend>>,
        config: &SensorMuxConfig,
    ) -> Result<Self> {
        let wake_lock = Arc::new(WakeLockManager::from_config(&config.wake_lock));
        Self::new(backends, config.writer.clone(), wake_lock)
    }

    /// Connect the framework: output channel and hotplug callback
    ///
    /// A writer from a previous call is replaced, then stopped once callbacks
    /// can no longer reach it. Backends are
    /// initialized in order; the first failure is returned and later
    /// backends are not initialized.
    pub fn initialize(
        &self,
        event_queue: Arc<dyn EventQueue>,
        dynamic_callback: Arc<dyn DynamicSensorsCallback>,
    ) -> Result<()> {
        self.shared.set_dynamic_callback(dynamic_callback);

        let started = OutputWriter::start(event_queue, &self.writer_config)?;
        let previous = self.shared.writer.write().replace(started);
        // Joined outside the lock so callbacks keep enqueueing into the new writer
        if let Some(mut previous) = previous {
            tracing::info!("Re-initializing, stopping previous event writer");
            previous.shutdown();
        }

        for (backend, callback) in self.backends.iter().zip(&self.callbacks) {
            let callback: Arc<dyn BackendCallback> = callback.clone();
            if let Err(e) = backend.initialize(callback) {
                tracing::error!("Backend {} failed to initialize: {}", backend.name(), e);
                return Err(e);
            }
        }

        tracing::info!("Sensors proxy initialized with {} backends", self.backends.len());
        Ok(())
    }

    /// Every registered sensor, global handles
    pub fn sensors_list(&self) -> Vec<SensorInfo> {
        self.shared.registry.sensors()
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    pub fn operation_mode(&self) -> OperationMode {
        *self.mode.lock()
    }

    /// Switch every backend to `mode`, or none of them
    ///
    /// On the first failure the backends already switched are put back in the
    /// previous mode and the failure is returned.
    pub fn set_operation_mode(&self, mode: OperationMode) -> Result<()> {
        let mut current = self.mode.lock();
        let previous = *current;

        for (applied, backend) in self.backends.iter().enumerate() {
            if let Err(e) = backend.set_operation_mode(mode) {
                tracing::error!(
                    "Backend {} failed to enter {:?}: {}, rolling back {} backends",
                    backend.name(),
                    mode,
                    e,
                    applied
                );
                for switched in &self.backends[..applied] {
                    if let Err(rollback) = switched.set_operation_mode(previous) {
                        tracing::warn!(
                            "Backend {} failed to return to {:?}: {}",
                            switched.name(),
                            previous,
                            rollback
                        );
                    }
                }
                return Err(e);
            }
        }

        *current = mode;
        tracing::info!("Operation mode set to {:?}", mode);
        Ok(())
    }

    /// Resolve a global handle to its backend and backend-local handle
    fn route(&self, handle: SensorHandle) -> Result<(&dyn SensorBackend, SensorHandle)> {
        let index = handle::backend_index_of(handle);
        match self.backends.get(usize::from(index)) {
            Some(backend) => Ok((backend.as_ref(), handle::decode(handle))),
            None => {
                tracing::warn!("Handle {} names unknown backend {}", handle, index);
                Err(HalError::InvalidArgument(format!(
                    "sensor handle {} has no backend",
                    handle
                )))
            }
        }
    }

    pub fn activate(&self, handle: SensorHandle, enabled: bool) -> Result<()> {
        let (backend, local) = self.route(handle)?;
        backend.activate(local, enabled)
    }

    pub fn batch(
        &self,
        handle: SensorHandle,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    ) -> Result<()> {
        let (backend, local) = self.route(handle)?;
        backend.batch(local, sampling_period_ns, max_report_latency_ns)
    }

    pub fn flush(&self, handle: SensorHandle) -> Result<()> {
        let (backend, local) = self.route(handle)?;
        backend.flush(local)
    }

    /// Forward an injected sample
    ///
    /// In normal mode only additional-info events may be injected.
    pub fn inject_sensor_data(&self, event: &Event) -> Result<()> {
        if *self.mode.lock() == OperationMode::Normal && !event.sensor_type.is_administrative() {
            return Err(HalError::InvalidArgument(format!(
                "cannot inject {} data in normal mode",
                event.sensor_type.as_str()
            )));
        }

        let (backend, local) = self.route(event.sensor_handle)?;
        let event = Event {
            sensor_handle: local,
            ..*event
        };
        backend.inject_sensor_data(&event)
    }

    fn direct_channel_backend(&self) -> Result<(BackendIndex, &dyn SensorBackend)> {
        self.shared
            .registry
            .direct_channel_backend()
            .and_then(|index| {
                self.backends
                    .get(usize::from(index))
                    .map(|backend| (index, backend.as_ref()))
            })
            .ok_or_else(|| {
                HalError::InvalidOperation("no backend provides a direct report channel".into())
            })
    }

    pub fn register_direct_channel(&self, mem: &SharedMemInfo) -> Result<i32> {
        let (_, backend) = self.direct_channel_backend()?;
        backend.register_direct_channel(mem)
    }

    pub fn unregister_direct_channel(&self, channel_handle: i32) -> Result<()> {
        let (_, backend) = self.direct_channel_backend()?;
        backend.unregister_direct_channel(channel_handle)
    }

    /// Configure a direct report; `handle` must belong to the direct channel
    /// backend, or be [`DIRECT_REPORT_ALL_SENSORS`]
    pub fn config_direct_report(
        &self,
        handle: SensorHandle,
        channel_handle: i32,
        rate: RateLevel,
    ) -> Result<i32> {
        let (index, backend) = self.direct_channel_backend()?;
        if handle != DIRECT_REPORT_ALL_SENSORS && handle::backend_index_of(handle) != index {
            return Err(HalError::InvalidArgument(format!(
                "sensor {} is not on the direct channel backend",
                handle
            )));
        }
        let local = if handle == DIRECT_REPORT_ALL_SENSORS {
            handle
        } else {
            handle::decode(handle)
        };
        backend.config_direct_report(local, channel_handle, rate)
    }

    /// Debug dump; nothing is written
    pub fn debug(&self) -> Result<()> {
        Ok(())
    }

    /// Writer counters, `None` before `initialize`
    pub fn writer_stats(&self) -> Option<WriterStats> {
        self.shared.writer.read().as_ref().map(OutputWriter::stats)
    }

    /// Wait for the writer backlog to drain
    pub fn wait_delivered(&self, timeout: std::time::Duration) -> bool {
        match self.shared.writer.read().as_ref() {
            Some(writer) => writer.wait_idle(timeout),
            None => true,
        }
    }

    pub fn wake_lock(&self) -> &Arc<WakeLockManager> {
        &self.shared.wake_lock
    }
}

impl Drop for SensorsProxy {
    fn drop(&mut self) {
        let writer = self.shared.writer.write().take();
        if let Some(mut writer) = writer {
            writer.shutdown();
        }
        self.shared.wake_lock.stop_watchdog();
    }
}
