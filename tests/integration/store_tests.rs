//! The service against the real JSON file store: checkpoints survive a
//! restart and edited config files are picked up between ticks.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::mock_hw::{MockButtons, MockHardware, RecordingSink, night, sunny};

use pipool::adapters::json_store::JsonFileStore;
use pipool::adapters::time::ManualClock;
use pipool::app::commands::AppCommand;
use pipool::app::ports::{CheckpointPort, Clock, ConfigPort, RelayState};
use pipool::app::service::AppService;
use pipool::fsm::Mode;
use pipool::fsm::overrides::Button;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn make_test_path() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("pipool_it_store_{}_{id}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir.join("config.json")
}

/// A service booted the way the binary boots it: config and checkpoint
/// both come from the store.
struct Boot {
    app: AppService,
    clock: ManualClock,
    hw: MockHardware,
    buttons: MockButtons,
    sink: RecordingSink,
}

impl Boot {
    fn new(store: &JsonFileStore, readings: pipool::fsm::context::SensorSnapshot) -> Self {
        let config = store.load().unwrap();
        let checkpoint = store.load_checkpoint().unwrap();
        let mut boot = Self {
            app: AppService::new(config, &checkpoint),
            clock: ManualClock::new(),
            hw: MockHardware::new(readings),
            buttons: MockButtons::default(),
            sink: RecordingSink::default(),
        };
        boot.app.start(&boot.clock, &mut boot.hw, &mut boot.sink);
        boot
    }

    fn tick(&mut self, store: &JsonFileStore) {
        self.clock.advance(self.app.config().poll_interval());
        if let Ok(Some(cfg)) = store.reload_if_changed() {
            let _ = self.app.handle_command(AppCommand::UpdateConfig(cfg));
        }
        self.app.tick(&self.clock, &mut self.hw, &mut self.buttons, store, &mut self.sink);
    }
}

#[test]
fn emergency_stop_survives_a_restart() {
    let path = make_test_path();
    let store = JsonFileStore::new(&path);

    let mut first = Boot::new(&store, sunny());
    first.tick(&store);
    assert_eq!(first.app.mode(), Mode::AutoRun);
    assert_eq!(store.load_checkpoint().unwrap().relay_state, RelayState::On);

    first.buttons.push(Button::Stop, first.clock.now());
    first.tick(&store);
    assert_eq!(first.app.mode(), Mode::Stopped);
    drop(first);

    // Power cut: no shutdown ran.  The next boot stays stopped.
    let mut second = Boot::new(&store, sunny());
    assert_eq!(second.app.mode(), Mode::Stopped);
    second.tick(&store);
    assert_eq!(second.app.mode(), Mode::Stopped);
    assert_eq!(second.hw.attempts, vec![false]);

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn clean_shutdown_restarts_idle() {
    let path = make_test_path();
    let store = JsonFileStore::new(&path);

    let mut first = Boot::new(&store, sunny());
    first.tick(&store);
    first
        .app
        .shutdown(&first.clock, &mut first.hw, &store, &mut first.sink);
    let cp = store.load_checkpoint().unwrap();
    assert_eq!(cp.mode, Mode::Stopped);
    assert_eq!(cp.relay_state, RelayState::Off);

    let second = Boot::new(&store, night());
    assert_eq!(second.app.mode(), Mode::Idle);

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn edited_config_file_is_hot_reloaded() {
    let path = make_test_path();
    let store = JsonFileStore::new(&path);
    let mut boot = Boot::new(&store, night());
    boot.tick(&store);

    // An operator edits the file; checkpoint keys already in it stay put.
    let mut doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    doc["light_threshold"] = serde_json::json!(40.0);
    fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
    drop(file);

    // 50 lux is now "bright": force-run no longer applies.
    boot.tick(&store);
    assert!((boot.app.config().light_threshold_lux - 40.0).abs() < f32::EPSILON);
    boot.buttons.push(Button::ForceRun, boot.clock.now());
    boot.tick(&store);
    assert_eq!(boot.app.mode(), Mode::Idle);

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn broken_config_edit_keeps_last_known_good() {
    let path = make_test_path();
    let store = JsonFileStore::new(&path);
    let mut boot = Boot::new(&store, night());
    boot.tick(&store);
    let before = boot.app.config().clone();

    fs::write(&path, "{ \"poll_interval_s\": ").unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
    drop(file);

    boot.tick(&store);
    assert_eq!(boot.app.config(), &before);
    assert_eq!(boot.app.mode(), Mode::Idle);

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn default_config_is_used_on_first_boot() {
    let path = make_test_path();
    let store = JsonFileStore::new(&path);
    let mut boot = Boot::new(&store, night());
    assert_eq!(boot.app.config(), &pipool::config::ControllerConfig::default());
    boot.tick(&store);
    // The first tick writes the checkpoint, creating the file.
    assert!(path.exists());

    let _ = fs::remove_dir_all(path.parent().unwrap());
}
