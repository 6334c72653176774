//! SensorMux daemon
//!
//! Runs the sensors proxy over simulated backends and plays the framework's
//! part: it drains the output channel and reports throughput.
//!
//! Startup sequence:
//! 1. Load and validate configuration
//! 2. Build simulated backends
//! 3. Build and initialize the proxy
//! 4. Activate every sensor and start streaming
//!
//! Usage: `sensormuxd [config-path]`

use anyhow::{Context, Result};
use sensormux_config::{CONFIG_DIR, SensorMuxConfig, SimulatedBackendConfig, load_backend_profiles};
use sensormux_hal::mock::MockBackend;
use sensormux_hal::{
    ChannelEventQueue, DynamicSensorsCallback, EventQueueReader, SensorBackend, SensorHandle,
    SensorInfo, SensorsProxy,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Environment variable naming the config file
const CONFIG_ENV: &str = "SENSORMUX_CONFIG";

/// How often throughput is logged
const STATS_INTERVAL: Duration = Duration::from_secs(5);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    setup_logging();

    info!("SensorMux daemon starting...");

    setup_signal_handlers()?;

    let config = load_config()?;
    config.validate().context("Invalid configuration")?;

    let backends = build_backends(&config)?;
    let proxy = SensorsProxy::from_config(
        backends
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn SensorBackend>)
            .collect(),
        &config,
    )
    .context("Failed to build sensors proxy")?;
    info!(
        "Proxy over {} backends, {} sensors",
        proxy.backend_count(),
        proxy.sensors_list().len()
    );

    let (queue, reader) = ChannelEventQueue::new(config.event_queue.capacity);
    proxy
        .initialize(queue, Arc::new(LoggingDynamicSensors))
        .context("Failed to initialize sensors proxy")?;

    activate_all(&proxy);
    for backend in &backends {
        if let Err(e) = backend.start_streaming() {
            error!("Failed to start backend {}: {}", backend.name(), e);
        }
    }

    run(&proxy, &reader, config.event_queue.capacity);

    info!("Shutting down...");
    for backend in &backends {
        backend.stop_streaming();
    }
    drop(proxy);
    info!("SensorMux daemon stopped");
    Ok(())
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGTERM, &action).context("Failed to install SIGTERM handler")?;
        sigaction(Signal::SIGINT, &action).context("Failed to install SIGINT handler")?;
    }

    Ok(())
}

/// Signal handler; only flips the shutdown flag
extern "C" fn handle_signal(sig: i32) {
    if sig == libc::SIGTERM || sig == libc::SIGINT {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }
}

/// Config from the command line, then `SENSORMUX_CONFIG`, then default locations
fn load_config() -> Result<SensorMuxConfig> {
    let explicit = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    match explicit {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SensorMuxConfig::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => SensorMuxConfig::load_default().context("Failed to load configuration"),
    }
}

/// Backends from configuration, or every known profile
fn build_backends(config: &SensorMuxConfig) -> Result<Vec<Arc<MockBackend>>> {
    let descriptions: Vec<SimulatedBackendConfig> = if config.backends.is_empty() {
        info!("No backends configured, using backend profiles");
        load_backend_profiles(Path::new(CONFIG_DIR))
            .context("Failed to load backend profiles")?
            .into_values()
            .collect()
    } else {
        config.backends.clone()
    };

    descriptions
        .iter()
        .map(|description| {
            let backend = MockBackend::from_config(description)
                .with_context(|| format!("Failed to build backend '{}'", description.name))?;
            info!(
                "Backend {} with {} sensors",
                description.name,
                description.sensors.len()
            );
            Ok(Arc::new(backend))
        })
        .collect()
}

fn activate_all(proxy: &SensorsProxy) {
    for sensor in proxy.sensors_list() {
        match proxy.activate(sensor.sensor_handle, true) {
            Ok(()) => debug!("Activated {} '{}'", sensor.sensor_handle, sensor.name),
            Err(e) => warn!("Failed to activate {} '{}': {}", sensor.sensor_handle, sensor.name, e),
        }
    }
}

/// Consumer loop standing in for the framework
fn run(proxy: &SensorsProxy, reader: &EventQueueReader, capacity: usize) {
    let mut window_start = Instant::now();
    let mut window_events = 0usize;
    let mut total_events = 0usize;

    while !SHUTDOWN.load(Ordering::SeqCst) {
        let events = reader.read_blocking(capacity, Duration::from_millis(200));
        window_events += events.len();
        total_events += events.len();

        if window_start.elapsed() >= STATS_INTERVAL {
            let rate = window_events as f64 / window_start.elapsed().as_secs_f64();
            match proxy.writer_stats() {
                Some(stats) => info!(
                    "{:.1} events/s ({} total), backlog {} events, dropped {} overflow / {} failed, wake lock holders {}",
                    rate,
                    total_events,
                    stats.backlog_events,
                    stats.dropped_on_overflow,
                    stats.dropped_on_failure,
                    proxy.wake_lock().ref_count()
                ),
                None => info!("{:.1} events/s ({} total)", rate, total_events),
            }
            window_start = Instant::now();
            window_events = 0;
        }
    }

    info!("Received shutdown signal after {} events", total_events);
}

/// Framework hotplug callback that logs changes
struct LoggingDynamicSensors;

impl DynamicSensorsCallback for LoggingDynamicSensors {
    fn on_dynamic_sensors_connected(&self, sensors: &[SensorInfo]) {
        for sensor in sensors {
            info!("Sensor connected: {} '{}'", sensor.sensor_handle, sensor.name);
        }
    }

    fn on_dynamic_sensors_disconnected(&self, handles: &[SensorHandle]) {
        for handle in handles {
            info!("Sensor disconnected: {}", handle);
        }
    }
}
