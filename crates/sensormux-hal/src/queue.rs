//! Output channel to the framework
//!
//! The framework reads events from a bounded single-producer/single-consumer
//! queue. Two signal bits travel alongside it:
//!
//! - `READ_AND_PROCESS`: producer to consumer, new events are available
//! - `EVENTS_READ`: consumer to producer, slots were freed
//!
//! [`ChannelEventQueue`] is the in-process implementation used by the daemon
//! and the tests.

use crate::Event;
use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

bitflags! {
    /// Signal bits shared by producer and consumer
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlagBits: u32 {
        const READ_AND_PROCESS = 1 << 0;
        const EVENTS_READ = 1 << 1;
    }
}

/// A word of signal bits that threads can wake and wait on
#[derive(Debug, Default)]
pub struct EventFlag {
    bits: Mutex<EventFlagBits>,
    cond: Condvar,
}

impl EventFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `bits` and wake every waiter
    pub fn wake(&self, bits: EventFlagBits) {
        let mut current = self.bits.lock();
        current.insert(bits);
        self.cond.notify_all();
    }

    /// Wait until any bit of `mask` is set, consuming the bits that matched
    pub fn wait(&self, mask: EventFlagBits, timeout: Duration) -> Option<EventFlagBits> {
        let deadline = Instant::now() + timeout;
        let mut current = self.bits.lock();
        loop {
            let matched = current.intersection(mask);
            if !matched.is_empty() {
                current.remove(matched);
                return Some(matched);
            }
            if self.cond.wait_until(&mut current, deadline).timed_out() {
                let matched = current.intersection(mask);
                current.remove(matched);
                return (!matched.is_empty()).then_some(matched);
            }
        }
    }
}

/// The producer side of the framework's event queue
pub trait EventQueue: Send + Sync {
    /// Total slot count
    fn quantum_count(&self) -> usize;

    /// Free slots right now
    fn available_to_write(&self) -> usize;

    /// Write all of `events` without blocking; false if they do not fit
    fn write(&self, events: &[Event]) -> bool;

    /// Write all of `events`, waiting up to `timeout` for the consumer to
    /// free enough slots
    fn write_blocking(&self, events: &[Event], timeout: Duration) -> bool;

    /// Signal the consumer
    fn wake(&self, bits: EventFlagBits);
}

/// Bounded in-process event queue
pub struct ChannelEventQueue {
    tx: Sender<Event>,
    capacity: usize,
    flag: Arc<EventFlag>,
}

impl ChannelEventQueue {
    /// Create a queue with `capacity` slots and its consumer handle
    pub fn new(capacity: usize) -> (Arc<Self>, EventQueueReader) {
        let (tx, rx) = bounded(capacity);
        let flag = Arc::new(EventFlag::new());
        let queue = Arc::new(Self {
            tx,
            capacity,
            flag: Arc::clone(&flag),
        });
        (queue, EventQueueReader { rx, flag })
    }
}

impl EventQueue for ChannelEventQueue {
    fn quantum_count(&self) -> usize {
        self.capacity
    }

    fn available_to_write(&self) -> usize {
        self.capacity.saturating_sub(self.tx.len())
    }

    fn write(&self, events: &[Event]) -> bool {
        if events.len() > self.available_to_write() {
            return false;
        }
        for event in events {
            match self.tx.try_send(*event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::error!("Event queue filled up during a checked write");
                    return false;
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!("Event queue consumer is gone");
                    return false;
                }
            }
        }
        true
    }

    fn write_blocking(&self, events: &[Event], timeout: Duration) -> bool {
        if events.len() > self.capacity {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.available_to_write() >= events.len() {
                return self.write(events);
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Let a sleeping consumer know there is something to drain
            self.flag.wake(EventFlagBits::READ_AND_PROCESS);
            self.flag.wait(EventFlagBits::EVENTS_READ, deadline - now);
        }
    }

    fn wake(&self, bits: EventFlagBits) {
        self.flag.wake(bits);
    }
}

/// Consumer side of [`ChannelEventQueue`]
pub struct EventQueueReader {
    rx: Receiver<Event>,
    flag: Arc<EventFlag>,
}

impl EventQueueReader {
    /// Events waiting to be read
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Read up to `max` events without blocking and tell the producer
    pub fn read(&self, max: usize) -> Vec<Event> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if !events.is_empty() {
            self.flag.wake(EventFlagBits::EVENTS_READ);
        }
        events
    }

    /// Wait for the producer's new-data signal or queued events
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        if !self.rx.is_empty() {
            return true;
        }
        self.flag
            .wait(EventFlagBits::READ_AND_PROCESS, timeout)
            .is_some()
            || !self.rx.is_empty()
    }

    /// Wait up to `timeout` for data, then read up to `max` events
    pub fn read_blocking(&self, max: usize, timeout: Duration) -> Vec<Event> {
        if self.wait_for_data(timeout) {
            self.read(max)
        } else {
            Vec::new()
        }
    }

    /// Consume a pending new-data signal, if any
    pub fn take_data_signal(&self) -> bool {
        self.flag
            .wait(EventFlagBits::READ_AND_PROCESS, Duration::ZERO)
            .is_some()
    }
}
