//! Sensor registry
//!
//! Maps global handles to descriptors. Built once from every backend's sensor
//! list; afterwards only hotplug adds and removes entries.
//!
//! The direct report channel is a single hardware resource, so at most one
//! backend may advertise it. The first backend seen reporting a
//! direct-capable sensor is designated; sensors of every other backend have
//! their direct channel flags cleared.

use crate::backend::SensorBackend;
use crate::handle::{self, BackendIndex, SensorHandle};
use crate::{SensorFlags, SensorInfo};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) type SensorMap = BTreeMap<SensorHandle, SensorInfo>;

/// Global view of every sensor the proxy exposes
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: RwLock<SensorMap>,
    direct_channel_backend: Option<BackendIndex>,
}

impl SensorRegistry {
    /// Query every backend in order and namespace its sensors
    pub fn build(backends: &[Arc<dyn SensorBackend>]) -> Self {
        let mut sensors = SensorMap::new();
        let mut direct_channel_backend = None;

        for (index, backend) in backends.iter().enumerate() {
            let index = index as BackendIndex;
            let list = match backend.sensors_list() {
                Ok(list) => list,
                Err(e) => {
                    tracing::error!("Sensor list query failed for backend {}: {}", backend.name(), e);
                    continue;
                }
            };

            for mut sensor in list {
                let global = match handle::try_encode(sensor.sensor_handle, index) {
                    Ok(global) => global,
                    Err(e) => {
                        tracing::error!("Discarding sensor '{}': {}", sensor.name, e);
                        continue;
                    }
                };
                sensor.sensor_handle = global;
                arbitrate_direct_channel(&mut direct_channel_backend, &mut sensor, index, backend.name());
                tracing::debug!("Loaded sensor {} '{}'", global, sensor.name);
                sensors.insert(global, sensor);
            }
        }

        tracing::info!(
            "Sensor registry built: {} sensors from {} backends",
            sensors.len(),
            backends.len()
        );

        Self {
            sensors: RwLock::new(sensors),
            direct_channel_backend,
        }
    }

    /// Backend owning the direct report channel, if any
    pub fn direct_channel_backend(&self) -> Option<BackendIndex> {
        self.direct_channel_backend
    }

    pub fn get(&self, handle: SensorHandle) -> Option<SensorInfo> {
        self.sensors.read().get(&handle).cloned()
    }

    pub fn contains(&self, handle: SensorHandle) -> bool {
        self.sensors.read().contains_key(&handle)
    }

    /// Whether events of `handle` are wake-up events; unknown handles are not
    pub fn is_wake_up(&self, handle: SensorHandle) -> bool {
        match self.sensors.read().get(&handle) {
            Some(sensor) => sensor.is_wake_up(),
            None => {
                tracing::debug!("Event for unregistered sensor {}", handle);
                false
            }
        }
    }

    /// Snapshot of every registered sensor, ordered by handle
    pub fn sensors(&self) -> Vec<SensorInfo> {
        self.sensors.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }

    /// Exclusive access for hotplug updates
    pub(crate) fn lock_for_update(&self) -> RwLockWriteGuard<'_, SensorMap> {
        self.sensors.write()
    }

    /// Clear direct channel flags if `index` is not the designated backend
    pub(crate) fn mask_direct_channel(&self, sensor: &mut SensorInfo, index: BackendIndex) {
        if self.direct_channel_backend != Some(index) && sensor.supports_direct_channel() {
            sensor.flags.remove(SensorFlags::DIRECT_CAPABILITIES);
        }
    }
}

fn arbitrate_direct_channel(
    designated: &mut Option<BackendIndex>,
    sensor: &mut SensorInfo,
    index: BackendIndex,
    backend_name: &str,
) {
    match *designated {
        None if sensor.supports_direct_channel() => {
            tracing::info!("Backend {} ({}) owns the direct report channel", index, backend_name);
            *designated = Some(index);
        }
        Some(owner) if owner != index && sensor.supports_direct_channel() => {
            tracing::debug!(
                "Clearing direct channel flags of '{}' from backend {}",
                sensor.name,
                backend_name
            );
            sensor.flags.remove(SensorFlags::DIRECT_CAPABILITIES);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorType;
    use crate::mock::{MockBackend, MockOp};

    fn backends(list: Vec<MockBackend>) -> Vec<Arc<dyn SensorBackend>> {
        list.into_iter()
            .map(|b| Arc::new(b) as Arc<dyn SensorBackend>)
            .collect()
    }

    #[test]
    fn test_same_local_handle_no_collision() {
        let registry = SensorRegistry::build(&backends(vec![
            MockBackend::new("a", vec![SensorInfo::new(5, "accel", SensorType::Accelerometer)]),
            MockBackend::new("b", vec![SensorInfo::new(5, "gyro", SensorType::Gyroscope)]),
        ]));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(SensorHandle(0x0000_0005)).unwrap().name, "accel");
        assert_eq!(registry.get(SensorHandle(0x0100_0005)).unwrap().name, "gyro");
    }

    #[test]
    fn test_namespaced_handles_discarded() {
        let registry = SensorRegistry::build(&backends(vec![MockBackend::new(
            "bad",
            vec![
                SensorInfo::new(0x0100_0001, "bogus", SensorType::Light),
                SensorInfo::new(2, "ok", SensorType::Light),
            ],
        )]));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(SensorHandle(2)));
    }

    #[test]
    fn test_failed_sensor_list_skips_backend() {
        let broken = MockBackend::new("broken", vec![SensorInfo::new(1, "x", SensorType::Light)]);
        broken.fail_on(MockOp::SensorsList);
        let registry = SensorRegistry::build(&backends(vec![
            broken,
            MockBackend::new("ok", vec![SensorInfo::new(1, "y", SensorType::Light)]),
        ]));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(SensorHandle(0x0100_0001)));
    }

    #[test]
    fn test_first_direct_channel_backend_wins() {
        let direct = SensorFlags::DIRECT_CHANNEL_ASHMEM | SensorFlags::DIRECT_REPORT_RATE_FAST;
        let registry = SensorRegistry::build(&backends(vec![
            MockBackend::new("plain", vec![SensorInfo::new(1, "light", SensorType::Light)]),
            MockBackend::new(
                "first",
                vec![
                    SensorInfo::new(1, "accel", SensorType::Accelerometer).with_flags(direct),
                    SensorInfo::new(2, "gyro", SensorType::Gyroscope).with_flags(direct),
                ],
            ),
            MockBackend::new(
                "second",
                vec![
                    SensorInfo::new(1, "accel2", SensorType::Accelerometer)
                        .with_flags(direct | SensorFlags::WAKE_UP),
                ],
            ),
        ]));

        assert_eq!(registry.direct_channel_backend(), Some(1));
        assert!(registry.get(SensorHandle(0x0100_0001)).unwrap().supports_direct_channel());
        assert!(registry.get(SensorHandle(0x0100_0002)).unwrap().supports_direct_channel());

        let masked = registry.get(SensorHandle(0x0200_0001)).unwrap();
        assert!(!masked.supports_direct_channel());
        assert!(masked.is_wake_up(), "only direct channel flags are cleared");
    }

    #[test]
    fn test_no_direct_channel_backend() {
        let registry = SensorRegistry::build(&backends(vec![MockBackend::new(
            "plain",
            vec![SensorInfo::new(1, "light", SensorType::Light)],
        )]));
        assert_eq!(registry.direct_channel_backend(), None);
    }

    #[test]
    fn test_wake_up_lookup() {
        let registry = SensorRegistry::build(&backends(vec![MockBackend::new(
            "a",
            vec![
                SensorInfo::new(1, "prox", SensorType::Proximity).with_flags(SensorFlags::WAKE_UP),
                SensorInfo::new(2, "light", SensorType::Light),
            ],
        )]));

        assert!(registry.is_wake_up(SensorHandle(1)));
        assert!(!registry.is_wake_up(SensorHandle(2)));
        assert!(!registry.is_wake_up(SensorHandle(99)));
    }

    #[test]
    fn test_sensor_snapshot_is_ordered() {
        let registry = SensorRegistry::build(&backends(vec![
            MockBackend::new("a", vec![SensorInfo::new(9, "z", SensorType::Light)]),
            MockBackend::new("b", vec![SensorInfo::new(1, "y", SensorType::Light)]),
        ]));
        let handles: Vec<u32> = registry.sensors().iter().map(|s| s.sensor_handle.raw()).collect();
        assert_eq!(handles, vec![0x0000_0009, 0x0100_0001]);
    }
}
