//! Wake lock management
//!
//! Wake-up events must reach the framework even while the system is trying to
//! suspend, so the proxy holds a partial wake lock while such events are in
//! flight. Holders are counted: the kernel lock is taken on the 0 -> 1
//! transition and dropped on 1 -> 0.
//!
//! A watchdog thread force-releases a lock held longer than the configured
//! timeout. Scoped locks taken before a forced release belong to an older
//! generation; their release is ignored so the count never goes negative.

use crate::HalError;
use parking_lot::{Condvar, Mutex};
use sensormux_config::WakeLockConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The process-wide lock the manager drives
pub trait WakeLockPrimitive: Send + Sync {
    fn acquire(&self, name: &str) -> Result<(), HalError>;
    fn release(&self, name: &str) -> Result<(), HalError>;
}

/// Kernel wake lock through `/sys/power/wake_lock` and `wake_unlock`
pub struct SysfsWakeLock {
    dir: PathBuf,
}

impl SysfsWakeLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl WakeLockPrimitive for SysfsWakeLock {
    fn acquire(&self, name: &str) -> Result<(), HalError> {
        fs::write(self.dir.join("wake_lock"), name)?;
        Ok(())
    }

    fn release(&self, name: &str) -> Result<(), HalError> {
        fs::write(self.dir.join("wake_unlock"), name)?;
        Ok(())
    }
}

/// For hosts without a wake lock interface
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLockPrimitive for NoopWakeLock {
    fn acquire(&self, _name: &str) -> Result<(), HalError> {
        Ok(())
    }

    fn release(&self, _name: &str) -> Result<(), HalError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct WakeLockState {
    ref_count: usize,
    generation: u64,
    held_since: Option<Instant>,
    forced_releases: u64,
    watchdog_running: bool,
}

/// Reference-counted holder of the process wake lock
pub struct WakeLockManager {
    name: String,
    primitive: Arc<dyn WakeLockPrimitive>,
    timeout: Option<Duration>,
    state: Mutex<WakeLockState>,
    changed: Condvar,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl WakeLockManager {
    pub fn new(
        name: impl Into<String>,
        primitive: Arc<dyn WakeLockPrimitive>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            primitive,
            timeout,
            state: Mutex::new(WakeLockState::default()),
            changed: Condvar::new(),
            watchdog: Mutex::new(None),
        }
    }

    /// Build from configuration, picking the sysfs or no-op primitive
    pub fn from_config(config: &WakeLockConfig) -> Self {
        let primitive: Arc<dyn WakeLockPrimitive> = if config.enabled {
            Arc::new(SysfsWakeLock::new(&config.sysfs_dir))
        } else {
            Arc::new(NoopWakeLock)
        };
        Self::new(config.name.clone(), primitive, config.timeout())
    }

    /// Add a holder; returns the generation the hold belongs to
    pub fn acquire(&self) -> u64 {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            if let Err(e) = self.primitive.acquire(&self.name) {
                tracing::error!("Failed to acquire wake lock {}: {}", self.name, e);
            }
            state.held_since = Some(Instant::now());
            tracing::debug!("Wake lock {} acquired", self.name);
            self.changed.notify_all();
        }
        state.ref_count += 1;
        state.generation
    }

    /// Drop a holder taken in `generation`
    pub fn release(&self, generation: u64) {
        let mut state = self.state.lock();
        if generation != state.generation {
            tracing::trace!("Ignoring release from expired wake lock generation {}", generation);
            return;
        }
        if state.ref_count == 0 {
            tracing::warn!("Unbalanced release of wake lock {}", self.name);
            return;
        }
        state.ref_count -= 1;
        if state.ref_count == 0 {
            self.release_locked(&mut state);
        }
    }

    fn release_locked(&self, state: &mut WakeLockState) {
        if let Err(e) = self.primitive.release(&self.name) {
            tracing::error!("Failed to release wake lock {}: {}", self.name, e);
        }
        state.held_since = None;
        tracing::debug!("Wake lock {} released", self.name);
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().ref_count
    }

    pub fn is_held(&self) -> bool {
        self.ref_count() > 0
    }

    /// Number of times the watchdog had to release the lock
    pub fn forced_releases(&self) -> u64 {
        self.state.lock().forced_releases
    }

    /// Release the lock if it has been held past the timeout
    ///
    /// Returns true when a forced release happened.
    pub fn expire_if_stale(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.expire_locked(&mut state, now)
    }

    fn expire_locked(&self, state: &mut WakeLockState, now: Instant) -> bool {
        let (Some(timeout), Some(since)) = (self.timeout, state.held_since) else {
            return false;
        };
        if now.duration_since(since) < timeout {
            return false;
        }

        tracing::warn!(
            "Wake lock {} held for more than {:?} by {} holders, forcing release",
            self.name,
            timeout,
            state.ref_count
        );
        state.ref_count = 0;
        state.generation += 1;
        state.forced_releases += 1;
        self.release_locked(state);
        true
    }

    /// Start the timeout watchdog; no-op without a timeout or if running
    pub fn start_watchdog(self: &Arc<Self>) {
        let Some(timeout) = self.timeout else {
            return;
        };
        let mut slot = self.watchdog.lock();
        if slot.is_some() {
            return;
        }
        self.state.lock().watchdog_running = true;

        let manager = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("wakelock-watchdog".into())
            .spawn(move || manager.watchdog_loop(timeout));
        match spawned {
            Ok(handle) => *slot = Some(handle),
            Err(e) => {
                self.state.lock().watchdog_running = false;
                tracing::error!("Failed to start wake lock watchdog: {}", e);
            }
        }
    }

    fn watchdog_loop(&self, timeout: Duration) {
        let mut state = self.state.lock();
        while state.watchdog_running {
            match state.held_since {
                Some(since) => {
                    let deadline = since + timeout;
                    if Instant::now() >= deadline {
                        self.expire_locked(&mut state, Instant::now());
                    } else {
                        self.changed.wait_until(&mut state, deadline);
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    /// Stop and join the watchdog thread
    pub fn stop_watchdog(&self) {
        {
            let mut state = self.state.lock();
            state.watchdog_running = false;
            self.changed.notify_all();
        }
        let handle = self.watchdog.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Wake lock watchdog panicked");
            }
        }
    }
}

/// A wake lock hold scoped to one delivery call
///
/// Created locked or unlocked; a locked instance releases its hold on drop,
/// on every exit path.
pub struct ScopedWakeLock {
    manager: Arc<WakeLockManager>,
    generation: Option<u64>,
}

impl ScopedWakeLock {
    pub fn new(manager: Arc<WakeLockManager>, lock: bool) -> Self {
        let generation = lock.then(|| manager.acquire());
        Self {
            manager,
            generation,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.generation.is_some()
    }
}

impl Drop for ScopedWakeLock {
    fn drop(&mut self) {
        if let Some(generation) = self.generation.take() {
            self.manager.release(generation);
        }
    }
}

impl std::fmt::Debug for ScopedWakeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedWakeLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingWakeLock;

    fn manager(timeout: Option<Duration>) -> (Arc<WakeLockManager>, Arc<RecordingWakeLock>) {
        let primitive = Arc::new(RecordingWakeLock::default());
        let manager = Arc::new(WakeLockManager::new("test_lock", primitive.clone(), timeout));
        (manager, primitive)
    }

    #[test]
    fn test_refcount_transitions() {
        let (manager, primitive) = manager(None);

        let first = manager.acquire();
        let second = manager.acquire();
        assert_eq!(manager.ref_count(), 2);
        assert_eq!(primitive.acquires(), 1);

        manager.release(first);
        assert!(manager.is_held());
        assert_eq!(primitive.releases(), 0);

        manager.release(second);
        assert!(!manager.is_held());
        assert_eq!(primitive.releases(), 1);
    }

    #[test]
    fn test_unbalanced_release_is_ignored() {
        let (manager, primitive) = manager(None);
        manager.release(0);
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(primitive.releases(), 0);
    }

    #[test]
    fn test_scoped_lock_releases_on_drop() {
        let (manager, _) = manager(None);
        {
            let locked = ScopedWakeLock::new(Arc::clone(&manager), true);
            let unlocked = ScopedWakeLock::new(Arc::clone(&manager), false);
            assert!(locked.is_locked());
            assert!(!unlocked.is_locked());
            assert_eq!(manager.ref_count(), 1);
        }
        assert_eq!(manager.ref_count(), 0);
    }

    #[test]
    fn test_expired_generation_release_ignored() {
        let (manager, primitive) = manager(Some(Duration::from_millis(10)));
        let stale = ScopedWakeLock::new(Arc::clone(&manager), true);

        let later = Instant::now() + Duration::from_millis(20);
        assert!(manager.expire_if_stale(later));
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(manager.forced_releases(), 1);

        let fresh = ScopedWakeLock::new(Arc::clone(&manager), true);
        drop(stale);
        assert_eq!(manager.ref_count(), 1, "stale guard must not release a fresh hold");
        drop(fresh);
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(primitive.acquires(), 2);
        assert_eq!(primitive.releases(), 2);
    }

    #[test]
    fn test_not_stale_before_timeout() {
        let (manager, _) = manager(Some(Duration::from_secs(60)));
        let _hold = ScopedWakeLock::new(Arc::clone(&manager), true);
        assert!(!manager.expire_if_stale(Instant::now()));
        assert!(manager.is_held());
    }

    #[test]
    fn test_watchdog_forces_release() {
        let (manager, primitive) = manager(Some(Duration::from_millis(30)));
        manager.start_watchdog();

        let hold = ScopedWakeLock::new(Arc::clone(&manager), true);
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.is_held() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!manager.is_held());
        assert_eq!(primitive.releases(), 1);

        drop(hold);
        assert_eq!(primitive.releases(), 1);
        manager.stop_watchdog();
    }

    #[test]
    fn test_sysfs_wake_lock_writes_name() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SysfsWakeLock::new(dir.path());

        lock.acquire("sensormux_wakeup").unwrap();
        lock.release("sensormux_wakeup").unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("wake_lock")).unwrap(),
            "sensormux_wakeup"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("wake_unlock")).unwrap(),
            "sensormux_wakeup"
        );
    }

    #[test]
    fn test_sysfs_missing_dir_fails() {
        let lock = SysfsWakeLock::new("/nonexistent/power");
        assert!(matches!(lock.acquire("x"), Err(HalError::Io(_))));
    }
}
