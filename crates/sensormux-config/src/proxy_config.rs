//! Proxy tuning: output channel, backlog writer and wake lock

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What the writer does when the backlog would exceed its bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued events to make room
    #[default]
    DropOldest,
    /// Keep the queue, discard the newest events that do not fit
    DropNewest,
    /// Discard the whole incoming remainder if it does not fit
    RejectBatch,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::DropOldest => "drop-oldest",
            OverflowPolicy::DropNewest => "drop-newest",
            OverflowPolicy::RejectBatch => "reject-batch",
        }
    }
}

/// Output channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueueConfig {
    /// Slot count of the bounded output channel
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    128
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Output channel writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Timeout for one blocking write from the backlog thread
    #[serde(default = "default_write_timeout")]
    pub blocking_write_timeout_ms: u64,

    /// Backlog bound in events (0 = unbounded)
    #[serde(default = "default_max_backlog")]
    pub max_backlog_events: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

fn default_write_timeout() -> u64 {
    5000
}

fn default_max_backlog() -> usize {
    16384
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            blocking_write_timeout_ms: default_write_timeout(),
            max_backlog_events: default_max_backlog(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl WriterConfig {
    pub fn blocking_write_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_write_timeout_ms)
    }

    /// Backlog bound, `None` when unbounded
    pub fn backlog_bound(&self) -> Option<usize> {
        (self.max_backlog_events > 0).then_some(self.max_backlog_events)
    }
}

/// Wake lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeLockConfig {
    /// Name written to the kernel wake lock interface
    #[serde(default = "default_wake_lock_name")]
    pub name: String,

    /// Force-release after the lock has been held this long (0 = never)
    #[serde(default = "default_wake_lock_timeout")]
    pub timeout_ms: u64,

    /// Directory holding `wake_lock` / `wake_unlock`
    #[serde(default = "default_sysfs_dir")]
    pub sysfs_dir: PathBuf,

    /// Use the kernel interface; disabled means a no-op lock
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_wake_lock_name() -> String {
    "sensormux_wakeup".to_string()
}

fn default_wake_lock_timeout() -> u64 {
    5000
}

fn default_sysfs_dir() -> PathBuf {
    PathBuf::from("/sys/power")
}

fn default_true() -> bool {
    true
}

impl Default for WakeLockConfig {
    fn default() -> Self {
        Self {
            name: default_wake_lock_name(),
            timeout_ms: default_wake_lock_timeout(),
            sysfs_dir: default_sysfs_dir(),
            enabled: true,
        }
    }
}

impl WakeLockConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_policy_names() {
        assert_eq!(OverflowPolicy::DropOldest.as_str(), "drop-oldest");
        assert_eq!(OverflowPolicy::RejectBatch.as_str(), "reject-batch");

        let parsed: WriterConfig = toml::from_str("overflow_policy = \"drop-newest\"").unwrap();
        assert_eq!(parsed.overflow_policy, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_writer_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.blocking_write_timeout(), Duration::from_secs(5));
        assert_eq!(config.backlog_bound(), Some(16384));
    }

    #[test]
    fn test_wake_lock_timeout_disabled() {
        let config: WakeLockConfig = toml::from_str("timeout_ms = 0").unwrap();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.sysfs_dir, PathBuf::from("/sys/power"));
        assert!(config.enabled);
    }
}
