//! PiPool: solar pool pump controller, main entry point.
//!
//! Hexagonal architecture with a single synchronous tick loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  SensorFeed ─┐     LogEventSink     JsonFileStore            │
//! │  RelayDriver ┴ HardwareAdapter      (Config + Checkpoint)    │
//! │  ButtonPoller → ButtonQueue         TelemetryExporter        │
//! │                                     MonotonicClock           │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                 │    │
//! │  │  FSM · Safety · Averages                             │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  tokio current-thread runtime: tick interval + signals       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Signals: SIGINT/SIGTERM shut down cleanly (pump OFF, checkpoint),
//! SIGHUP forces a config reload, SIGUSR1 requests a telemetry line.
#![deny(unused_must_use)]

use core::time::Duration;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

use pipool::adapters::hardware::{HardwareAdapter, PiHardware};
use pipool::adapters::json_store::JsonFileStore;
use pipool::adapters::log_sink::LogEventSink;
use pipool::adapters::telemetry::TelemetryExporter;
use pipool::adapters::time::MonotonicClock;
use pipool::app::commands::AppCommand;
use pipool::app::ports::{Checkpoint, CheckpointPort, ConfigPort, RelayState};
use pipool::app::service::AppService;
use pipool::config::HardwareConfig;
use pipool::drivers::button::{ButtonInput, ButtonPoller, ButtonQueue};
use pipool::drivers::gpio::SysfsPin;
use pipool::drivers::relay::RelayDriver;
use pipool::fsm::overrides::Button;
use pipool::sensors::{SensorFeed, SensorHub};

/// Button lines are sampled this often; well under the debounce window.
const BUTTON_POLL_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(name = "pipool", version, about = "Solar pool pump controller")]
struct Cli {
    /// Config document (also holds the crash-recovery checkpoint).
    #[arg(short, long, default_value = "/etc/pipool/config.json")]
    config: PathBuf,

    /// Append telemetry as JSON lines to this file.
    #[arg(long)]
    telemetry_out: Option<PathBuf>,

    /// Override `sysfs_root` from the config, e.g. to run against a
    /// simulated tree.
    #[arg(long)]
    sysfs_root: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Claim every GPIO line and start the sensor and button threads.
fn open_hardware(
    hw: &HardwareConfig,
    clock: MonotonicClock,
    sensor_period: Duration,
) -> Result<(PiHardware, ButtonQueue, ButtonPoller)> {
    let root = Path::new(&hw.sysfs_root);

    // OFF level on an active-low board is high.
    let relay_pin = SysfsPin::output(root, hw.gpio_chip_base, hw.relay_pin, hw.relay_active_low)
        .context("claiming relay GPIO")?;
    info!("Pump relay on GPIO line {}", relay_pin.line());
    let relay = RelayDriver::new(relay_pin, hw.relay_active_low);

    let mut inputs = Vec::with_capacity(3);
    for (button, bcm) in [
        (Button::Start, hw.start_button_pin),
        (Button::ForceRun, hw.force_run_button_pin),
        (Button::Stop, hw.stop_button_pin),
    ] {
        let line = SysfsPin::input(root, hw.gpio_chip_base, bcm)
            .with_context(|| format!("claiming {button:?} button GPIO"))?;
        inputs.push(ButtonInput::new(button, line, hw.button_debounce()));
    }
    let (tx, queue) = ButtonQueue::channel();
    let poller = ButtonPoller::spawn(inputs, clock, BUTTON_POLL_PERIOD, tx)
        .context("starting button poller")?;

    let feed = SensorFeed::spawn(
        SensorHub::from_config(hw),
        clock,
        sensor_period,
        hw.sensor_max_age(),
    )
    .context("starting sensor feed")?;

    Ok((HardwareAdapter::new(feed, relay), queue, poller))
}

fn ticker(period: Duration) -> Interval {
    let mut t = interval(period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Push a changed (or, when `forced`, any) config into the service.  A
/// broken file keeps the running config.
fn reload_config(store: &JsonFileStore, app: &mut AppService, forced: bool) {
    let loaded = if forced {
        store.load().map(Some)
    } else {
        store.reload_if_changed()
    };
    match loaded {
        // Rejections are logged by the service.
        Ok(Some(cfg)) => {
            let _ = app.handle_command(AppCommand::UpdateConfig(cfg));
        }
        Ok(None) => {}
        Err(e) => warn!("Config reload failed, keeping last known good: {e}"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    info!("PiPool v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Config + checkpoint ────────────────────────────────
    let store = JsonFileStore::new(&cli.config);
    let config = store
        .load()
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let mut hw_config = store
        .load_hardware()
        .context("loading hardware section")?;
    if let Some(root) = cli.sysfs_root {
        hw_config.sysfs_root = root;
    }
    let checkpoint = store.load_checkpoint().unwrap_or_else(|e| {
        warn!("Checkpoint unreadable ({e}), starting fresh");
        Checkpoint::default()
    });
    if checkpoint.relay_state == RelayState::On {
        warn!(
            "Checkpoint says the pump was ON in {:?}; starting with it OFF",
            checkpoint.mode
        );
    }

    // ── 2. Adapters ───────────────────────────────────────────
    let clock = MonotonicClock::new();
    let (mut hw, mut buttons, mut poller) =
        open_hardware(&hw_config, clock, config.poll_interval())?;

    let (exporter, writer) = match &cli.telemetry_out {
        Some(path) => {
            let (exporter, writer) = TelemetryExporter::spawn(path)
                .with_context(|| format!("opening telemetry output {}", path.display()))?;
            (Some(exporter), Some(writer))
        }
        None => (None, None),
    };
    let mut sink = (LogEventSink::new(), exporter);

    // ── 3. Signals ────────────────────────────────────────────
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;

    // ── 4. Run ────────────────────────────────────────────────
    let mut app = AppService::new(config, &checkpoint);
    app.start(&clock, &mut hw, &mut sink);

    let mut period = app.config().poll_interval();
    let mut ticks = ticker(period);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                reload_config(&store, &mut app, false);
                app.tick(&clock, &mut hw, &mut buttons, &store, &mut sink);

                let wanted = app.config().poll_interval();
                if wanted != period {
                    info!("Tick period {period:?} -> {wanted:?}");
                    period = wanted;
                    ticks = ticker(period);
                }
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading config");
                reload_config(&store, &mut app, true);
            }
            _ = sigusr1.recv() => {
                let _ = app.handle_command(AppCommand::RequestTelemetry);
            }
        }
    }

    // ── 5. Shutdown ───────────────────────────────────────────
    app.shutdown(&clock, &mut hw, &store, &mut sink);

    poller.stop();
    let (mut feed, _relay) = hw.into_parts();
    feed.stop();
    drop(sink);
    if let Some(writer) = writer {
        writer.join();
    }
    info!("Bye after {}s", clock.uptime().as_secs());
    Ok(())
}
