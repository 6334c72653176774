//! Dynamic sensor connect and disconnect
//!
//! Registry updates happen under the registry's write lock. The framework is
//! told afterwards, with the lock released, about the sensors that were
//! actually added or removed. The notification goes out even when that set is
//! empty.

use crate::handle::{self, BackendIndex, SensorHandle};
use crate::proxy::ProxyShared;
use crate::SensorInfo;

pub(crate) fn on_connected(shared: &ProxyShared, index: BackendIndex, sensors: Vec<SensorInfo>) {
    let accepted = {
        let mut map = shared.registry.lock_for_update();
        let mut accepted = Vec::with_capacity(sensors.len());
        for mut sensor in sensors {
            let global = match handle::try_encode(sensor.sensor_handle, index) {
                Ok(global) => global,
                Err(e) => {
                    tracing::error!("Discarding dynamic sensor '{}': {}", sensor.name, e);
                    continue;
                }
            };
            sensor.sensor_handle = global;
            shared.registry.mask_direct_channel(&mut sensor, index);
            tracing::info!("Dynamic sensor {} '{}' connected", global, sensor.name);
            map.insert(global, sensor.clone());
            accepted.push(sensor);
        }
        accepted
    };

    match shared.dynamic_callback() {
        Some(callback) => callback.on_dynamic_sensors_connected(&accepted),
        None => tracing::warn!(
            "No framework callback registered, {} connected sensors not reported",
            accepted.len()
        ),
    }
}

pub(crate) fn on_disconnected(shared: &ProxyShared, index: BackendIndex, handles: Vec<SensorHandle>) {
    let removed = {
        let mut map = shared.registry.lock_for_update();
        let mut removed = Vec::with_capacity(handles.len());
        for local in handles {
            let global = match handle::try_encode(local, index) {
                Ok(global) => global,
                Err(e) => {
                    tracing::error!("Ignoring dynamic sensor removal: {}", e);
                    continue;
                }
            };
            if let Some(sensor) = map.remove(&global) {
                tracing::info!("Dynamic sensor {} '{}' disconnected", global, sensor.name);
                removed.push(global);
            } else {
                tracing::debug!("Removal of unknown sensor {}", global);
            }
        }
        removed
    };

    match shared.dynamic_callback() {
        Some(callback) => callback.on_dynamic_sensors_disconnected(&removed),
        None => tracing::warn!(
            "No framework callback registered, {} disconnected sensors not reported",
            removed.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SensorBackend;
    use crate::mock::{MockBackend, RecordingDynamicSensors, RecordingWakeLock};
    use crate::registry::SensorRegistry;
    use crate::wakelock::WakeLockManager;
    use crate::{SensorFlags, SensorType};
    use std::sync::Arc;

    fn shared() -> (ProxyShared, Arc<RecordingDynamicSensors>) {
        let direct = SensorFlags::DIRECT_CHANNEL_ASHMEM | SensorFlags::DIRECT_REPORT_RATE_NORMAL;
        let backends: Vec<Arc<dyn SensorBackend>> = vec![
            Arc::new(MockBackend::new(
                "direct",
                vec![SensorInfo::new(1, "accel", SensorType::Accelerometer).with_flags(direct)],
            )),
            Arc::new(MockBackend::new("other", vec![])),
        ];
        let wake_lock = Arc::new(WakeLockManager::new(
            "test",
            Arc::new(RecordingWakeLock::default()),
            None,
        ));
        let shared = ProxyShared::new(SensorRegistry::build(&backends), wake_lock);
        let framework = Arc::new(RecordingDynamicSensors::default());
        shared.set_dynamic_callback(framework.clone());
        (shared, framework)
    }

    #[test]
    fn test_connect_inserts_and_forwards() {
        let (shared, framework) = shared();
        on_connected(
            &shared,
            1,
            vec![
                SensorInfo::new(9, "hr", SensorType::HeartRate),
                SensorInfo::new(0x0300_0001, "bogus", SensorType::HeartRate),
            ],
        );

        assert!(shared.registry.contains(SensorHandle(0x0100_0009)));
        let connected = framework.connected();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].sensor_handle, SensorHandle(0x0100_0009));
    }

    #[test]
    fn test_connect_masks_direct_channel_of_other_backends() {
        let (shared, _) = shared();
        let direct = SensorFlags::DIRECT_CHANNEL_GRALLOC | SensorFlags::DIRECT_REPORT_RATE_FAST;
        on_connected(
            &shared,
            1,
            vec![SensorInfo::new(3, "gyro", SensorType::Gyroscope).with_flags(direct)],
        );
        on_connected(
            &shared,
            0,
            vec![SensorInfo::new(3, "gyro", SensorType::Gyroscope).with_flags(direct)],
        );

        assert!(!shared.registry.get(SensorHandle(0x0100_0003)).unwrap().supports_direct_channel());
        assert!(shared.registry.get(SensorHandle(0x0000_0003)).unwrap().supports_direct_channel());
        assert_eq!(shared.registry.direct_channel_backend(), Some(0));
    }

    #[test]
    fn test_disconnect_forwards_only_present_handles() {
        let (shared, framework) = shared();
        on_connected(&shared, 1, vec![SensorInfo::new(9, "hr", SensorType::HeartRate)]);

        on_disconnected(&shared, 1, vec![SensorHandle(9), SensorHandle(10)]);

        assert!(!shared.registry.contains(SensorHandle(0x0100_0009)));
        assert_eq!(framework.disconnected(), vec![SensorHandle(0x0100_0009)]);
    }

    #[test]
    fn test_disconnect_unknown_forwards_empty_set() {
        let (shared, framework) = shared();
        on_disconnected(&shared, 1, vec![SensorHandle(42)]);
        assert_eq!(framework.disconnect_calls(), 1);
        assert!(framework.disconnected().is_empty());
    }

    #[test]
    fn test_connect_all_discarded_forwards_empty_set() {
        let (shared, framework) = shared();
        on_connected(
            &shared,
            1,
            vec![SensorInfo::new(0x0200_0001, "bogus", SensorType::HeartRate)],
        );
        assert_eq!(framework.connect_calls(), 1);
        assert!(framework.connected().is_empty());
        assert_eq!(shared.registry.len(), 1);
    }
}
