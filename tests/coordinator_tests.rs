//! Exit flow and startup replay through the coordinator

use audio_playback_connector::connection::traits::mocks::{MockConnector, MockDisplay, MockResolver};
use audio_playback_connector::connection::{ConnectionController, DeviceDescriptor};
use audio_playback_connector::coordinator::{AppEvent, Coordinator, ScreenPoint, ScreenRect, Shell};
use audio_playback_connector::error::Result;
use audio_playback_connector::settings::{PersistedSettings, StateStore};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Shell that only counts exit prompts
#[derive(Default)]
struct PromptCounter {
    prompts: Cell<usize>,
    last_default: Cell<Option<bool>>,
}

impl Shell for PromptCounter {
    fn show_picker(&self, _anchor: ScreenRect) -> Result<()> {
        Ok(())
    }

    fn show_context_menu(&self, _point: ScreenPoint) -> Result<()> {
        Ok(())
    }

    fn confirm_exit(&self, reconnect_default: bool) -> Result<()> {
        self.prompts.set(self.prompts.get() + 1);
        self.last_default.set(Some(reconnect_default));
        Ok(())
    }

    fn open_bluetooth_settings(&self) -> Result<()> {
        Ok(())
    }
}

struct Setup {
    coordinator: Coordinator<PromptCounter>,
    connector: Arc<MockConnector>,
    state_path: PathBuf,
}

fn setup(dir: &Path, known: &[(&str, &str)]) -> Setup {
    let connector = Arc::new(MockConnector::new());
    let controller = ConnectionController::new(
        connector.clone(),
        Arc::new(MockResolver::new(known)),
        Rc::new(MockDisplay::new()),
    );
    let state_path = dir.join("AudioPlaybackConnector.json");
    let coordinator = Coordinator::new(
        controller,
        StateStore::new(&state_path),
        PromptCounter::default(),
    );
    Setup {
        coordinator,
        connector,
        state_path,
    }
}

fn write_state(path: &Path, reconnect: bool, ids: &[&str]) {
    let settings = PersistedSettings {
        reconnect,
        last_device_ids: ids.iter().map(|id| id.to_string()).collect(),
    };
    StateStore::new(path).try_save(&settings).unwrap();
}

fn connect_all(setup: &mut Setup, ids: &[&str]) {
    for id in ids {
        setup
            .coordinator
            .handle(AppEvent::DeviceSelected(DeviceDescriptor::new(*id, *id)))
            .unwrap();
    }
    assert!(setup.coordinator.controller_mut().run_until_idle(TIMEOUT));
}

#[test]
fn test_exit_with_no_connections_is_immediate() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = setup(dir.path(), &[]);

    s.coordinator.handle(AppEvent::ExitRequested).unwrap();

    assert!(!s.coordinator.is_running());
    assert_eq!(s.coordinator.shell().prompts.get(), 0);
    assert!(!s.state_path.exists());
}

#[test]
fn test_declined_exit_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_state(&dir.path().join("AudioPlaybackConnector.json"), true, &["OLD"]);
    let mut s = setup(dir.path(), &[]);
    let before = fs::read_to_string(&s.state_path).unwrap();
    connect_all(&mut s, &["A"]);

    s.coordinator.handle(AppEvent::ExitRequested).unwrap();
    assert!(s.coordinator.is_exit_pending());
    assert_eq!(s.coordinator.shell().last_default.get(), Some(true));

    s.coordinator.handle(AppEvent::ExitCancelled).unwrap();

    assert!(s.coordinator.is_running());
    assert!(!s.coordinator.is_exit_pending());
    assert_eq!(s.coordinator.controller().len(), 1);
    assert_eq!(s.connector.last_connection("A").unwrap().close_calls(), 0);
    assert_eq!(fs::read_to_string(&s.state_path).unwrap(), before);
}

#[test]
fn test_confirmed_exit_without_reconnect_saves_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = setup(dir.path(), &[]);
    connect_all(&mut s, &["A", "B"]);

    s.coordinator.handle(AppEvent::ExitRequested).unwrap();
    s.coordinator
        .handle(AppEvent::ExitConfirmed { reconnect: false })
        .unwrap();

    assert!(!s.coordinator.is_running());
    assert!(s.coordinator.controller().is_empty());
    for id in ["A", "B"] {
        assert_eq!(s.connector.last_connection(id).unwrap().close_calls(), 1);
    }

    let saved = StateStore::new(&s.state_path).try_load().unwrap();
    assert!(!saved.reconnect);
    assert!(saved.last_device_ids.is_empty());
}

#[test]
fn test_confirmed_exit_with_reconnect_saves_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = setup(dir.path(), &[]);
    connect_all(&mut s, &["A", "B"]);

    s.coordinator.handle(AppEvent::ExitRequested).unwrap();
    // A second request while the prompt is open does not stack prompts
    s.coordinator.handle(AppEvent::ExitRequested).unwrap();
    assert_eq!(s.coordinator.shell().prompts.get(), 1);

    s.coordinator
        .handle(AppEvent::ExitConfirmed { reconnect: true })
        .unwrap();

    let saved = StateStore::new(&s.state_path).try_load().unwrap();
    assert!(saved.reconnect);
    assert_eq!(saved.last_device_ids, vec!["A", "B"]);
}

#[test]
fn test_startup_replays_saved_devices() {
    let dir = tempfile::tempdir().unwrap();
    write_state(&dir.path().join("AudioPlaybackConnector.json"), true, &["A", "GONE", "B"]);
    let mut s = setup(dir.path(), &[("A", "Speaker"), ("B", "Phone")]);

    s.coordinator.start();
    assert!(s.coordinator.controller_mut().run_until_idle(TIMEOUT));

    assert_eq!(s.connector.requests(), vec!["A", "B"]);
    assert_eq!(s.coordinator.controller().len(), 2);
}

#[test]
fn test_startup_skips_replay_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    write_state(&dir.path().join("AudioPlaybackConnector.json"), false, &["A"]);
    let mut s = setup(dir.path(), &[("A", "Speaker")]);

    s.coordinator.start();
    assert!(s.coordinator.controller_mut().run_until_idle(TIMEOUT));

    assert!(s.connector.requests().is_empty());
    assert!(!s.coordinator.settings().reconnect);
}

#[test]
fn test_exit_now_keeps_reconnect_flag() {
    let dir = tempfile::tempdir().unwrap();
    write_state(&dir.path().join("AudioPlaybackConnector.json"), true, &[]);
    let mut s = setup(dir.path(), &[]);
    connect_all(&mut s, &["A"]);

    s.coordinator.exit_now();

    assert!(!s.coordinator.is_running());
    assert_eq!(s.coordinator.shell().prompts.get(), 0);
    let saved = StateStore::new(&s.state_path).try_load().unwrap();
    assert!(saved.reconnect);
    assert_eq!(saved.last_device_ids, vec!["A"]);
}
