//! Output channel writer
//!
//! Owns the backlog of event batches that did not fit in the framework's
//! queue. Producers call [`OutputWriter::enqueue`] from backend threads; it
//! never blocks beyond the backlog lock. A dedicated thread drains the
//! backlog with blocking writes.
//!
//! Batches reach the queue in the order their `enqueue` calls took the
//! backlog lock, and events keep their order inside a batch. The direct write
//! in `enqueue` only happens when nothing is queued or in flight, so it can
//! never overtake older events.

use crate::queue::{EventFlagBits, EventQueue};
use crate::{Event, HalError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use sensormux_config::{OverflowPolicy, WriterConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Snapshot of writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Events written directly by `enqueue`
    pub written_immediately: u64,
    /// Events written by the drain thread
    pub written_from_backlog: u64,
    /// Events dropped because a blocking write failed or timed out
    pub dropped_on_failure: u64,
    /// Events dropped by the overflow policy
    pub dropped_on_overflow: u64,
    /// Events waiting in the backlog
    pub backlog_events: usize,
    pub backlog_batches: usize,
    /// Events taken by the drain thread and not yet written
    pub in_flight_events: usize,
}

#[derive(Debug)]
struct Backlog {
    batches: VecDeque<Vec<Event>>,
    pending_events: usize,
    in_flight: usize,
    running: bool,
    stats: WriterStats,
}

impl Backlog {
    fn new() -> Self {
        Self {
            batches: VecDeque::new(),
            pending_events: 0,
            in_flight: 0,
            running: true,
            stats: WriterStats::default(),
        }
    }

    fn is_idle(&self) -> bool {
        self.batches.is_empty() && self.in_flight == 0
    }

    /// Append `batch`, applying `policy` if `bound` would be exceeded.
    /// Returns the number of events dropped.
    fn admit(
        &mut self,
        mut batch: Vec<Event>,
        bound: Option<usize>,
        policy: OverflowPolicy,
    ) -> usize {
        let overflow = bound
            .map(|bound| (self.pending_events + batch.len()).saturating_sub(bound))
            .unwrap_or(0);

        let dropped = match (overflow, bound) {
            (0, _) | (_, None) => 0,
            (overflow, Some(bound)) => match policy {
                OverflowPolicy::DropOldest => {
                    if batch.len() >= bound {
                        let excess = batch.len() - bound;
                        batch.drain(..excess);
                        let dropped = self.pending_events + excess;
                        self.batches.clear();
                        self.pending_events = 0;
                        dropped
                    } else {
                        self.drop_from_head(overflow);
                        overflow
                    }
                }
                OverflowPolicy::DropNewest => {
                    let keep = bound.saturating_sub(self.pending_events);
                    batch.truncate(keep);
                    overflow
                }
                OverflowPolicy::RejectBatch => {
                    let dropped = batch.len();
                    batch.clear();
                    dropped
                }
            },
        };

        if !batch.is_empty() {
            self.pending_events += batch.len();
            self.batches.push_back(batch);
        }
        self.stats.dropped_on_overflow += dropped as u64;
        dropped
    }

    fn drop_from_head(&mut self, mut count: usize) {
        while count > 0 {
            let Some(front) = self.batches.front_mut() else {
                break;
            };
            if front.len() <= count {
                count -= front.len();
                self.pending_events -= front.len();
                self.batches.pop_front();
            } else {
                front.drain(..count);
                self.pending_events -= count;
                count = 0;
            }
        }
    }

    /// Take up to `max` events from the head batch
    fn take_chunk(&mut self, max: usize) -> Option<Vec<Event>> {
        let head = self.batches.front_mut()?;
        let chunk = if head.len() <= max {
            self.batches.pop_front()?
        } else {
            head.drain(..max).collect()
        };
        self.pending_events -= chunk.len();
        Some(chunk)
    }

    fn snapshot(&self) -> WriterStats {
        WriterStats {
            backlog_events: self.pending_events,
            backlog_batches: self.batches.len(),
            in_flight_events: self.in_flight,
            ..self.stats
        }
    }
}

struct WriterShared {
    queue: Arc<dyn EventQueue>,
    backlog: Mutex<Backlog>,
    changed: Condvar,
    write_timeout: Duration,
    bound: Option<usize>,
    policy: OverflowPolicy,
}

/// Delivers event batches to the framework's queue
pub struct OutputWriter {
    shared: Arc<WriterShared>,
    thread: Option<JoinHandle<()>>,
}

impl OutputWriter {
    /// Start the writer and its drain thread
    pub fn start(queue: Arc<dyn EventQueue>, config: &WriterConfig) -> Result<Self, HalError> {
        let shared = Arc::new(WriterShared {
            queue,
            backlog: Mutex::new(Backlog::new()),
            changed: Condvar::new(),
            write_timeout: config.blocking_write_timeout(),
            bound: config.backlog_bound(),
            policy: config.overflow_policy,
        });

        let drain = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("event-writer".into())
            .spawn(move || drain.drain_loop())?;

        tracing::info!(
            "Event writer started (timeout {:?}, backlog bound {:?}, policy {})",
            shared.write_timeout,
            shared.bound,
            shared.policy.as_str()
        );

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Hand a batch over for delivery; never waits on the consumer
    pub fn enqueue(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let shared = &self.shared;
        let mut backlog = shared.backlog.lock();
        if !backlog.running {
            tracing::warn!("Event writer stopped, dropping {} events", events.len());
            return;
        }

        let mut written = 0;
        if backlog.is_idle() {
            let fits = events.len().min(shared.queue.available_to_write());
            if fits > 0 && shared.queue.write(&events[..fits]) {
                shared.queue.wake(EventFlagBits::READ_AND_PROCESS);
                written = fits;
                backlog.stats.written_immediately += fits as u64;
            }
        }

        if written < events.len() {
            let remainder = if written == 0 {
                events
            } else {
                events[written..].to_vec()
            };
            let dropped = backlog.admit(remainder, shared.bound, shared.policy);
            if dropped > 0 {
                tracing::warn!(
                    "Backlog full, dropped {} events ({})",
                    dropped,
                    shared.policy.as_str()
                );
            }
            shared.changed.notify_all();
        }
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.backlog.lock().snapshot()
    }

    /// Nothing queued and nothing being written
    pub fn is_idle(&self) -> bool {
        self.shared.backlog.lock().is_idle()
    }

    /// Wait until the backlog has drained, or `timeout` elapses
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut backlog = self.shared.backlog.lock();
        while !backlog.is_idle() {
            if self
                .shared
                .changed
                .wait_until(&mut backlog, deadline)
                .timed_out()
            {
                return backlog.is_idle();
            }
        }
        true
    }

    /// Stop the drain thread; an in-flight write runs to completion first
    pub fn shutdown(&mut self) {
        {
            let mut backlog = self.shared.backlog.lock();
            if backlog.running {
                backlog.running = false;
                if backlog.pending_events > 0 {
                    tracing::warn!(
                        "Event writer stopping with {} undelivered events",
                        backlog.pending_events
                    );
                }
            }
            self.shared.changed.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Event writer thread panicked");
            }
        }
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl WriterShared {
    fn drain_loop(&self) {
        let mut backlog = self.backlog.lock();
        loop {
            while backlog.running && backlog.batches.is_empty() {
                self.changed.wait(&mut backlog);
            }
            if !backlog.running {
                break;
            }

            let quantum = self.queue.quantum_count().max(1);
            let Some(chunk) = backlog.take_chunk(quantum) else {
                continue;
            };
            backlog.in_flight = chunk.len();

            let written = MutexGuard::unlocked(&mut backlog, || {
                if self.queue.write_blocking(&chunk, self.write_timeout) {
                    self.queue.wake(EventFlagBits::READ_AND_PROCESS);
                    true
                } else {
                    let err = HalError::DeliveryFailure {
                        dropped: chunk.len(),
                    };
                    tracing::error!("Blocking write failed: {}", err);
                    false
                }
            });

            if written {
                backlog.stats.written_from_backlog += chunk.len() as u64;
            } else {
                backlog.stats.dropped_on_failure += chunk.len() as u64;
            }
            backlog.in_flight = 0;
            self.changed.notify_all();
        }
        tracing::info!("Event writer stopped");
    }
}
