//! Mock backends for running without sensor hardware
//!
//! [`MockBackend`] implements [`SensorBackend`] over a scripted sensor list. It
//! records every call the proxy forwards, can be told to fail any operation,
//! and can push events and hotplug notifications through the callback the
//! proxy gave it. An optional streaming thread produces synthetic samples for
//! every active sensor.
//!
//! # Usage
//!
//! ```no_run
//! use sensormux_hal::mock::{MockBackend, MockProfile};
//!
//! let imu = MockBackend::from_profile(MockProfile::Imu).unwrap();
//! imu.start_streaming().unwrap();
//! ```

use crate::backend::{BackendCallback, DynamicSensorsCallback, SensorBackend};
use crate::wakelock::WakeLockPrimitive;
use crate::{
    Event, HalError, OperationMode, RateLevel, SensorFlags, SensorHandle, SensorInfo, SensorType,
    SharedMemInfo,
};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use sensormux_config::SimulatedBackendConfig;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pre-defined simulated backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockProfile {
    /// Accelerometer, gyroscope, magnetometer, significant motion
    Imu,
    /// Barometer, ambient light, proximity
    Environment,
    /// Wearable accelerometer and step detector
    Wrist,
}

impl MockProfile {
    pub fn to_backend_config(self) -> SimulatedBackendConfig {
        match self {
            MockProfile::Imu => SimulatedBackendConfig::imu(),
            MockProfile::Environment => SimulatedBackendConfig::environment(),
            MockProfile::Wrist => SimulatedBackendConfig::wrist(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "imu" => Some(MockProfile::Imu),
            "environment" | "env" => Some(MockProfile::Environment),
            "wrist" => Some(MockProfile::Wrist),
            _ => None,
        }
    }

    pub fn all() -> &'static [MockProfile] {
        &[MockProfile::Imu, MockProfile::Environment, MockProfile::Wrist]
    }
}

/// A call the proxy forwarded to a mock backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Initialize,
    SetOperationMode(OperationMode),
    Activate {
        handle: SensorHandle,
        enabled: bool,
    },
    Batch {
        handle: SensorHandle,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    },
    Flush(SensorHandle),
    InjectSensorData(SensorHandle),
    RegisterDirectChannel(i32),
    UnregisterDirectChannel(i32),
    ConfigDirectReport {
        handle: SensorHandle,
        channel_handle: i32,
        rate: RateLevel,
    },
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    SensorsList,
    Initialize,
    SetOperationMode,
    Activate,
    Batch,
    Flush,
    InjectSensorData,
    DirectChannel,
}

/// Shared mock state
#[derive(Default)]
pub struct MockState {
    pub sensors: Vec<SensorInfo>,
    pub dynamic_sensors: Vec<SensorInfo>,
    pub mode: OperationMode,
    /// Active sensors and their sample interval
    pub active: BTreeMap<SensorHandle, Duration>,
    /// Interval used when a sensor is activated without a batch call
    pub default_intervals: BTreeMap<SensorHandle, Duration>,
    pub calls: Vec<MockCall>,
    pub failures: HashSet<MockOp>,
    pub injected: Vec<Event>,
    pub channels: HashSet<i32>,
    next_channel: i32,
    callback: Option<Arc<dyn BackendCallback>>,
}

impl MockState {
    fn sensor(&self, handle: SensorHandle) -> Option<&SensorInfo> {
        self.sensors
            .iter()
            .chain(&self.dynamic_sensors)
            .find(|s| s.sensor_handle == handle)
    }

    fn check(&self, op: MockOp, name: &str) -> Result<(), HalError> {
        if self.failures.contains(&op) {
            return Err(HalError::BackendFailure(format!(
                "{} failed {:?} on request",
                name, op
            )));
        }
        Ok(())
    }

    fn check_sensor(&self, handle: SensorHandle) -> Result<(), HalError> {
        match self.sensor(handle) {
            Some(_) => Ok(()),
            None => Err(HalError::InvalidArgument(format!("no sensor {}", handle))),
        }
    }

    fn has_direct_channel(&self) -> bool {
        self.sensors
            .iter()
            .chain(&self.dynamic_sensors)
            .any(SensorInfo::supports_direct_channel)
    }
}

struct Streamer {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Scripted backend
pub struct MockBackend {
    name: String,
    state: Arc<RwLock<MockState>>,
    epoch: Instant,
    streamer: Mutex<Option<Streamer>>,
}

impl MockBackend {
    pub fn new(name: &str, sensors: Vec<SensorInfo>) -> Self {
        let default_intervals = sensors
            .iter()
            .map(|s| (s.sensor_handle, Duration::from_millis(100)))
            .collect();
        Self {
            name: name.to_string(),
            state: Arc::new(RwLock::new(MockState {
                sensors,
                default_intervals,
                next_channel: 1,
                ..MockState::default()
            })),
            epoch: Instant::now(),
            streamer: Mutex::new(None),
        }
    }

    /// Build from a simulated backend description
    pub fn from_config(config: &SimulatedBackendConfig) -> Result<Self, HalError> {
        let mut sensors = Vec::with_capacity(config.sensors.len());
        let mut intervals = BTreeMap::new();
        for sensor in &config.sensors {
            let sensor_type = SensorType::parse(&sensor.sensor_type).ok_or_else(|| {
                HalError::ConfigurationError(format!(
                    "backend '{}': unknown sensor type '{}'",
                    config.name, sensor.sensor_type
                ))
            })?;

            let mut flags = reporting_mode(sensor_type);
            if sensor.wake_up {
                flags |= SensorFlags::WAKE_UP;
            }
            if sensor.direct_channel {
                flags |= SensorFlags::DIRECT_CHANNEL_ASHMEM
                    | SensorFlags::DIRECT_REPORT_RATE_NORMAL
                    | SensorFlags::DIRECT_REPORT_RATE_FAST;
            }

            let rate = sensor.rate_hz.max(1);
            let mut info = SensorInfo::new(sensor.handle, &sensor.name, sensor_type).with_flags(flags);
            info.min_delay_us = (1_000_000 / rate) as i32;
            info.max_delay_us = 1_000_000;
            intervals.insert(info.sensor_handle, Duration::from_secs(1) / rate);
            sensors.push(info);
        }

        let backend = Self::new(&config.name, sensors);
        backend.state.write().default_intervals = intervals;
        tracing::debug!("[MOCK] Backend {} with {} sensors", config.name, config.sensors.len());
        Ok(backend)
    }

    pub fn from_profile(profile: MockProfile) -> Result<Self, HalError> {
        Self::from_config(&profile.to_backend_config())
    }

    /// Get shared state for manipulation in tests
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        Arc::clone(&self.state)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.read().calls.clone()
    }

    pub fn injected(&self) -> Vec<Event> {
        self.state.read().injected.clone()
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.state.read().mode
    }

    pub fn is_active(&self, handle: impl Into<SensorHandle>) -> bool {
        self.state.read().active.contains_key(&handle.into())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().callback.is_some()
    }

    /// Make `op` fail until [`MockBackend::succeed_on`] is called
    pub fn fail_on(&self, op: MockOp) {
        self.state.write().failures.insert(op);
    }

    pub fn succeed_on(&self, op: MockOp) {
        self.state.write().failures.remove(&op);
    }

    /// Post `events` through the proxy callback
    ///
    /// The wake lock is taken when any event belongs to one of this
    /// backend's wake-up sensors. Returns false before initialization.
    pub fn emit(&self, events: &[Event]) -> bool {
        emit_events(&self.state, events)
    }

    /// Post one synthetic sample of sensor `handle`
    pub fn emit_sample(&self, handle: impl Into<SensorHandle>) -> bool {
        let handle = handle.into();
        let timestamp = self.epoch.elapsed().as_nanos() as i64;
        let event = {
            let state = self.state.read();
            let Some(sensor) = state.sensor(handle) else {
                tracing::warn!("[MOCK] {} has no sensor {}", self.name, handle);
                return false;
            };
            synthetic_event(sensor, timestamp)
        };
        self.emit(&[event])
    }

    /// Add sensors at runtime and report them to the proxy
    pub fn connect_dynamic(&self, sensors: Vec<SensorInfo>) {
        let callback = {
            let mut state = self.state.write();
            for sensor in &sensors {
                state
                    .default_intervals
                    .insert(sensor.sensor_handle, Duration::from_millis(100));
            }
            state.dynamic_sensors.extend(sensors.iter().cloned());
            state.callback.clone()
        };
        tracing::debug!("[MOCK] {} connecting {} sensors", self.name, sensors.len());
        if let Some(callback) = callback {
            callback.on_dynamic_sensors_connected(sensors);
        }
    }

    /// Remove runtime sensors and report them to the proxy
    pub fn disconnect_dynamic(&self, handles: Vec<SensorHandle>) {
        let callback = {
            let mut state = self.state.write();
            state
                .dynamic_sensors
                .retain(|s| !handles.contains(&s.sensor_handle));
            for handle in &handles {
                state.active.remove(handle);
            }
            state.callback.clone()
        };
        tracing::debug!("[MOCK] {} disconnecting {} sensors", self.name, handles.len());
        if let Some(callback) = callback {
            callback.on_dynamic_sensors_disconnected(handles);
        }
    }

    /// Start emitting samples for active sensors at their interval
    pub fn start_streaming(&self) -> Result<(), HalError> {
        let mut slot = self.streamer.lock();
        if slot.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::clone(&self.state);
        let epoch = self.epoch;
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("mock-{}", self.name))
            .spawn(move || stream_loop(&state, epoch, &flag))?;

        tracing::debug!("[MOCK] {} streaming started", self.name);
        *slot = Some(Streamer { stop, thread });
        Ok(())
    }

    pub fn stop_streaming(&self) {
        if let Some(streamer) = self.streamer.lock().take() {
            streamer.stop.store(true, Ordering::Release);
            if streamer.thread.join().is_err() {
                tracing::error!("[MOCK] {} streaming thread panicked", self.name);
            }
        }
    }

    fn record(&self, call: MockCall) -> parking_lot::RwLockWriteGuard<'_, MockState> {
        let mut state = self.state.write();
        state.calls.push(call);
        state
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

impl SensorBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn sensors_list(&self) -> Result<Vec<SensorInfo>, HalError> {
        let state = self.state.read();
        state.check(MockOp::SensorsList, &self.name)?;
        Ok(state.sensors.clone())
    }

    fn initialize(&self, callback: Arc<dyn BackendCallback>) -> Result<(), HalError> {
        let mut state = self.record(MockCall::Initialize);
        state.check(MockOp::Initialize, &self.name)?;
        state.callback = Some(callback);
        tracing::debug!("[MOCK] {} initialized", self.name);
        Ok(())
    }

    fn set_operation_mode(&self, mode: OperationMode) -> Result<(), HalError> {
        let mut state = self.record(MockCall::SetOperationMode(mode));
        state.check(MockOp::SetOperationMode, &self.name)?;
        state.mode = mode;
        tracing::debug!("[MOCK] {} mode set to {:?}", self.name, mode);
        Ok(())
    }

    fn activate(&self, handle: SensorHandle, enabled: bool) -> Result<(), HalError> {
        let mut state = self.record(MockCall::Activate { handle, enabled });
        state.check(MockOp::Activate, &self.name)?;
        state.check_sensor(handle)?;
        if enabled {
            let interval = state
                .default_intervals
                .get(&handle)
                .copied()
                .unwrap_or(Duration::from_millis(100));
            state.active.entry(handle).or_insert(interval);
        } else {
            state.active.remove(&handle);
        }
        tracing::debug!("[MOCK] {} sensor {} active: {}", self.name, handle, enabled);
        Ok(())
    }

    fn batch(
        &self,
        handle: SensorHandle,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    ) -> Result<(), HalError> {
        let mut state = self.record(MockCall::Batch {
            handle,
            sampling_period_ns,
            max_report_latency_ns,
        });
        state.check(MockOp::Batch, &self.name)?;
        state.check_sensor(handle)?;
        let interval = Duration::from_nanos(sampling_period_ns.max(1_000_000) as u64);
        state.default_intervals.insert(handle, interval);
        if let Some(active) = state.active.get_mut(&handle) {
            *active = interval;
        }
        Ok(())
    }

    fn flush(&self, handle: SensorHandle) -> Result<(), HalError> {
        let state = self.record(MockCall::Flush(handle));
        state.check(MockOp::Flush, &self.name)?;
        state.check_sensor(handle)
    }

    fn inject_sensor_data(&self, event: &Event) -> Result<(), HalError> {
        let mut state = self.record(MockCall::InjectSensorData(event.sensor_handle));
        state.check(MockOp::InjectSensorData, &self.name)?;
        state.injected.push(*event);
        Ok(())
    }

    fn register_direct_channel(&self, _mem: &SharedMemInfo) -> Result<i32, HalError> {
        let mut state = self.state.write();
        state.check(MockOp::DirectChannel, &self.name)?;
        if !state.has_direct_channel() {
            return Err(HalError::InvalidOperation(format!(
                "{} has no direct channel support",
                self.name
            )));
        }
        let channel = state.next_channel;
        state.next_channel += 1;
        state.channels.insert(channel);
        state.calls.push(MockCall::RegisterDirectChannel(channel));
        Ok(channel)
    }

    fn unregister_direct_channel(&self, channel_handle: i32) -> Result<(), HalError> {
        let mut state = self.record(MockCall::UnregisterDirectChannel(channel_handle));
        state.check(MockOp::DirectChannel, &self.name)?;
        if !state.channels.remove(&channel_handle) {
            return Err(HalError::InvalidArgument(format!(
                "no direct channel {}",
                channel_handle
            )));
        }
        Ok(())
    }

    fn config_direct_report(
        &self,
        handle: SensorHandle,
        channel_handle: i32,
        rate: RateLevel,
    ) -> Result<i32, HalError> {
        let state = self.record(MockCall::ConfigDirectReport {
            handle,
            channel_handle,
            rate,
        });
        state.check(MockOp::DirectChannel, &self.name)?;
        if !state.channels.contains(&channel_handle) {
            return Err(HalError::InvalidArgument(format!(
                "no direct channel {}",
                channel_handle
            )));
        }
        Ok(match rate {
            RateLevel::Stop => 0,
            _ => handle.raw() as i32,
        })
    }
}

fn reporting_mode(sensor_type: SensorType) -> SensorFlags {
    match sensor_type {
        SensorType::SignificantMotion => SensorFlags::ONE_SHOT_MODE,
        SensorType::Light | SensorType::Proximity | SensorType::StepCounter => {
            SensorFlags::ON_CHANGE_MODE
        }
        SensorType::StepDetector => SensorFlags::SPECIAL_REPORTING_MODE,
        _ => SensorFlags::empty(),
    }
}

fn emit_events(state: &RwLock<MockState>, events: &[Event]) -> bool {
    let (callback, wake_up) = {
        let state = state.read();
        let Some(callback) = state.callback.clone() else {
            return false;
        };
        let wake_up = events.iter().any(|e| {
            state
                .sensor(e.sensor_handle)
                .is_some_and(SensorInfo::is_wake_up)
        });
        (callback, wake_up)
    };
    let wake_lock = callback.create_scoped_wake_lock(wake_up);
    callback.post_events(events, wake_lock);
    true
}

fn synthetic_event(sensor: &SensorInfo, timestamp: i64) -> Event {
    let mut rng = rand::thread_rng();
    let mut noise = |scale: f32| rng.gen_range(-scale..scale);
    let values = match sensor.sensor_type {
        SensorType::Accelerometer => vec![noise(0.2), noise(0.2), 9.81 + noise(0.2)],
        SensorType::Gyroscope => vec![noise(0.05), noise(0.05), noise(0.05)],
        SensorType::MagneticField => vec![22.0 + noise(1.0), 5.0 + noise(1.0), -40.0 + noise(1.0)],
        SensorType::Pressure => vec![1013.25 + noise(0.5)],
        SensorType::Light => vec![300.0 + noise(50.0)],
        SensorType::Proximity => vec![if noise(1.0) > 0.0 { 5.0 } else { 0.0 }],
        SensorType::HeartRate => vec![70.0 + noise(5.0)],
        _ => vec![1.0],
    };
    Event::new(sensor.sensor_handle, sensor.sensor_type, timestamp).with_values(&values)
}

fn stream_loop(state: &RwLock<MockState>, epoch: Instant, stop: &AtomicBool) {
    const TICK: Duration = Duration::from_millis(5);
    let mut next_due: BTreeMap<SensorHandle, Instant> = BTreeMap::new();

    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        let due: Vec<Event> = {
            let state = state.read();
            next_due.retain(|handle, _| state.active.contains_key(handle));
            let mut due = Vec::new();
            for (handle, interval) in &state.active {
                let at = next_due.entry(*handle).or_insert(now);
                if *at <= now {
                    *at = now + *interval;
                    if let Some(sensor) = state.sensor(*handle) {
                        due.push(synthetic_event(sensor, now.duration_since(epoch).as_nanos() as i64));
                    }
                }
            }
            due
        };

        // Wake-up and regular sensors go in separate batches
        let (wake_up, regular): (Vec<Event>, Vec<Event>) = {
            let state = state.read();
            due.into_iter().partition(|e| {
                state
                    .sensor(e.sensor_handle)
                    .is_some_and(SensorInfo::is_wake_up)
            })
        };
        for batch in [wake_up, regular] {
            if !batch.is_empty() {
                emit_events(state, &batch);
            }
        }

        thread::sleep(TICK);
    }
}

/// Wake lock primitive that counts calls
#[derive(Debug, Default)]
pub struct RecordingWakeLock {
    acquires: AtomicUsize,
    releases: AtomicUsize,
}

impl RecordingWakeLock {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Acquired more often than released
    pub fn is_held(&self) -> bool {
        self.acquires() > self.releases()
    }
}

impl WakeLockPrimitive for RecordingWakeLock {
    fn acquire(&self, name: &str) -> Result<(), HalError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("[MOCK] Wake lock {} acquired", name);
        Ok(())
    }

    fn release(&self, name: &str) -> Result<(), HalError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("[MOCK] Wake lock {} released", name);
        Ok(())
    }
}

/// Framework hotplug callback that records notifications
#[derive(Debug, Default)]
pub struct RecordingDynamicSensors {
    connected: Mutex<Vec<SensorInfo>>,
    disconnected: Mutex<Vec<SensorHandle>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl RecordingDynamicSensors {
    pub fn connected(&self) -> Vec<SensorInfo> {
        self.connected.lock().clone()
    }

    pub fn disconnected(&self) -> Vec<SensorHandle> {
        self.disconnected.lock().clone()
    }

    /// Number of connect notifications, empty ones included
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of disconnect notifications, empty ones included
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

impl DynamicSensorsCallback for RecordingDynamicSensors {
    fn on_dynamic_sensors_connected(&self, sensors: &[SensorInfo]) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().extend_from_slice(sensors);
    }

    fn on_dynamic_sensors_disconnected(&self, handles: &[SensorHandle]) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnected.lock().extend_from_slice(handles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensormux_config::SimulatedSensorConfig;

    #[test]
    fn test_mock_profiles() {
        for profile in MockProfile::all() {
            let backend = MockBackend::from_profile(*profile).unwrap();
            assert!(!backend.sensors_list().unwrap().is_empty());
        }
    }

    #[test]
    fn test_profile_from_name() {
        assert_eq!(MockProfile::from_name("IMU"), Some(MockProfile::Imu));
        assert_eq!(MockProfile::from_name("env"), Some(MockProfile::Environment));
        assert_eq!(MockProfile::from_name("unknown"), None);
    }

    #[test]
    fn test_from_config_flags() {
        let backend = MockBackend::from_profile(MockProfile::Imu).unwrap();
        let sensors = backend.sensors_list().unwrap();

        let accel = sensors.iter().find(|s| s.sensor_handle == SensorHandle(1)).unwrap();
        assert!(accel.supports_direct_channel());
        assert!(!accel.is_wake_up());
        assert_eq!(accel.min_delay_us, 20_000);

        let motion = sensors.iter().find(|s| s.sensor_type == SensorType::SignificantMotion).unwrap();
        assert!(motion.is_wake_up());
        assert!(motion.flags.contains(SensorFlags::ONE_SHOT_MODE));
    }

    #[test]
    fn test_from_config_unknown_type() {
        let config = SimulatedBackendConfig {
            name: "odd".into(),
            sensors: vec![SimulatedSensorConfig {
                handle: 1,
                name: "Thing".into(),
                sensor_type: "tricorder".into(),
                wake_up: false,
                direct_channel: false,
                rate_hz: 1,
            }],
        };
        assert!(matches!(
            MockBackend::from_config(&config),
            Err(HalError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_records_calls_and_failures() {
        let backend = MockBackend::new("m", vec![SensorInfo::new(1, "light", SensorType::Light)]);
        backend.activate(SensorHandle(1), true).unwrap();
        assert!(backend.is_active(1u32));

        backend.fail_on(MockOp::Flush);
        assert!(matches!(
            backend.flush(SensorHandle(1)),
            Err(HalError::BackendFailure(_))
        ));
        backend.succeed_on(MockOp::Flush);
        backend.flush(SensorHandle(1)).unwrap();

        assert!(matches!(
            backend.activate(SensorHandle(9), true),
            Err(HalError::InvalidArgument(_))
        ));
        assert_eq!(backend.calls().len(), 4);
    }

    #[test]
    fn test_batch_updates_interval() {
        let backend = MockBackend::new("m", vec![SensorInfo::new(1, "light", SensorType::Light)]);
        backend.activate(SensorHandle(1), true).unwrap();
        backend.batch(SensorHandle(1), 50_000_000, 0).unwrap();
        assert_eq!(
            backend.state().read().active.get(&SensorHandle(1)),
            Some(&Duration::from_millis(50))
        );
    }

    #[test]
    fn test_emit_before_initialize() {
        let backend = MockBackend::new("m", vec![SensorInfo::new(1, "light", SensorType::Light)]);
        assert!(!backend.emit_sample(1u32));
    }

    #[test]
    fn test_direct_channel_requires_support() {
        let plain = MockBackend::new("m", vec![SensorInfo::new(1, "light", SensorType::Light)]);
        let mem = SharedMemInfo {
            mem_type: crate::SharedMemType::Ashmem,
            format: crate::SharedMemFormat::SensorsEvent,
            size: 1024,
            memory_handle: 4,
        };
        assert!(matches!(
            plain.register_direct_channel(&mem),
            Err(HalError::InvalidOperation(_))
        ));

        let imu = MockBackend::from_profile(MockProfile::Imu).unwrap();
        let channel = imu.register_direct_channel(&mem).unwrap();
        assert_eq!(
            imu.config_direct_report(SensorHandle(1), channel, RateLevel::Normal).unwrap(),
            1
        );
        imu.unregister_direct_channel(channel).unwrap();
        assert!(imu.unregister_direct_channel(channel).is_err());
    }

    #[test]
    fn test_recording_wake_lock() {
        let lock = RecordingWakeLock::default();
        lock.acquire("x").unwrap();
        assert!(lock.is_held());
        lock.release("x").unwrap();
        assert!(!lock.is_held());
        assert_eq!((lock.acquires(), lock.releases()), (1, 1));
    }
}
