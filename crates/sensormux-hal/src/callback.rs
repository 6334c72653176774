//! Event delivery pipeline
//!
//! Each backend gets its own [`ProxyCallback`] carrying its backend index.
//! Events come in with backend-local handles on the backend's own thread,
//! are relabeled into the global namespace and handed to the output writer.

use crate::backend::BackendCallback;
use crate::handle::{self, BackendIndex, SensorHandle};
use crate::hotplug;
use crate::proxy::ProxyShared;
use crate::wakelock::ScopedWakeLock;
use crate::{Event, SensorInfo};
use std::sync::Arc;

pub(crate) struct ProxyCallback {
    index: BackendIndex,
    backend_name: String,
    shared: Arc<ProxyShared>,
}

impl ProxyCallback {
    pub(crate) fn new(index: BackendIndex, backend_name: &str, shared: Arc<ProxyShared>) -> Self {
        Self {
            index,
            backend_name: backend_name.to_string(),
            shared,
        }
    }

    /// Move `events` into the global namespace, counting wake-up events
    fn relabel(&self, events: &[Event]) -> (Vec<Event>, usize) {
        let mut wake_up = 0;
        let mut relabeled = Vec::with_capacity(events.len());
        for event in events {
            let global = match handle::try_encode(event.sensor_handle, self.index) {
                Ok(global) => global,
                Err(e) => {
                    tracing::error!("Dropping event from {}: {}", self.backend_name, e);
                    continue;
                }
            };
            if self.shared.registry.is_wake_up(global) {
                wake_up += 1;
            }
            relabeled.push(Event {
                sensor_handle: global,
                ..*event
            });
        }
        (relabeled, wake_up)
    }
}

impl BackendCallback for ProxyCallback {
    fn post_events(&self, events: &[Event], wake_lock: ScopedWakeLock) {
        let (relabeled, wake_up) = self.relabel(events);

        if (wake_up > 0) != wake_lock.is_locked() {
            tracing::error!(
                "Backend {} posted {} wake-up events of {} with wake lock {}",
                self.backend_name,
                wake_up,
                relabeled.len(),
                if wake_lock.is_locked() { "held" } else { "not held" }
            );
            debug_assert_eq!(
                wake_up > 0,
                wake_lock.is_locked(),
                "wake lock must be held iff the batch has wake-up events"
            );
        }

        if !relabeled.is_empty() {
            match self.shared.writer.read().as_ref() {
                Some(writer) => writer.enqueue(relabeled),
                None => tracing::warn!(
                    "Proxy not initialized, dropping {} events from {}",
                    relabeled.len(),
                    self.backend_name
                ),
            }
        }

        drop(wake_lock);
    }

    fn create_scoped_wake_lock(&self, lock: bool) -> ScopedWakeLock {
        ScopedWakeLock::new(Arc::clone(&self.shared.wake_lock), lock)
    }

    fn on_dynamic_sensors_connected(&self, sensors: Vec<SensorInfo>) {
        hotplug::on_connected(&self.shared, self.index, sensors);
    }

    fn on_dynamic_sensors_disconnected(&self, handles: Vec<SensorHandle>) {
        hotplug::on_disconnected(&self.shared, self.index, handles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SensorBackend;
    use crate::mock::{MockBackend, RecordingWakeLock};
    use crate::queue::ChannelEventQueue;
    use crate::registry::SensorRegistry;
    use crate::wakelock::WakeLockManager;
    use crate::writer::OutputWriter;
    use crate::{SensorFlags, SensorType};
    use sensormux_config::WriterConfig;
    use std::time::Duration;

    fn shared() -> Arc<ProxyShared> {
        let backends: Vec<Arc<dyn SensorBackend>> = vec![
            Arc::new(MockBackend::new("a", vec![])),
            Arc::new(MockBackend::new(
                "b",
                vec![
                    SensorInfo::new(1, "prox", SensorType::Proximity)
                        .with_flags(SensorFlags::WAKE_UP),
                    SensorInfo::new(2, "light", SensorType::Light),
                ],
            )),
        ];
        let wake_lock = Arc::new(WakeLockManager::new(
            "test",
            Arc::new(RecordingWakeLock::default()),
            None,
        ));
        Arc::new(ProxyShared::new(SensorRegistry::build(&backends), wake_lock))
    }

    #[test]
    fn test_relabel_counts_wake_up() {
        let callback = ProxyCallback::new(1, "b", shared());
        let (events, wake_up) = callback.relabel(&[
            Event::new(1, SensorType::Proximity, 10),
            Event::new(2, SensorType::Light, 11),
            Event::new(7, SensorType::Light, 12),
        ]);

        assert_eq!(wake_up, 1);
        let handles: Vec<u32> = events.iter().map(|e| e.sensor_handle.raw()).collect();
        assert_eq!(handles, vec![0x0100_0001, 0x0100_0002, 0x0100_0007]);
        assert_eq!(events[2].timestamp, 12);
    }

    #[test]
    fn test_relabel_drops_namespaced_events() {
        let callback = ProxyCallback::new(1, "b", shared());
        let (events, _) = callback.relabel(&[
            Event::new(0x0200_0001, SensorType::Light, 1),
            Event::new(2, SensorType::Light, 2),
        ]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 2);
    }

    #[test]
    fn test_post_before_initialize_is_dropped() {
        let shared = shared();
        let callback = ProxyCallback::new(1, "b", Arc::clone(&shared));
        let lock = callback.create_scoped_wake_lock(true);
        assert_eq!(shared.wake_lock.ref_count(), 1);

        callback.post_events(&[Event::new(1, SensorType::Proximity, 1)], lock);
        assert_eq!(shared.wake_lock.ref_count(), 0);
    }

    #[test]
    fn test_post_reaches_writer() {
        let shared = shared();
        let (queue, reader) = ChannelEventQueue::new(8);
        *shared.writer.write() = Some(OutputWriter::start(queue, &WriterConfig::default()).unwrap());

        let callback = ProxyCallback::new(1, "b", Arc::clone(&shared));
        let lock = callback.create_scoped_wake_lock(false);
        callback.post_events(&[Event::new(2, SensorType::Light, 5)], lock);

        let events = reader.read_blocking(8, Duration::from_secs(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sensor_handle, SensorHandle(0x0100_0002));
    }
}
