//! End-to-end tests for the connection controller against mock capabilities

use audio_playback_connector::connection::status::{
    ConnectionState, ConnectionStatus, DisplayStatusOptions, OpenOutcome,
};
use audio_playback_connector::connection::traits::mocks::{
    MockBehavior, MockConnector, MockDisplay, MockOpen, MockResolver,
};
use audio_playback_connector::connection::{ConnectionController, DeviceDescriptor, DeviceResolver};
use audio_playback_connector::error::Result;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    controller: ConnectionController,
    connector: Arc<MockConnector>,
    resolver: Arc<MockResolver>,
    display: Rc<MockDisplay>,
}

fn harness(connector: MockConnector, known: &[(&str, &str)]) -> Harness {
    let connector = Arc::new(connector);
    let resolver = Arc::new(MockResolver::new(known));
    let display = Rc::new(MockDisplay::new());
    let controller = ConnectionController::new(connector.clone(), resolver.clone(), display.clone());
    Harness {
        controller,
        connector,
        resolver,
        display,
    }
}

fn device(id: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(id, format!("Device {}", id))
}

#[test]
fn test_successful_connect_ends_connected() {
    let mut h = harness(MockConnector::new(), &[]);

    h.controller.connect(device("X"));
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert_eq!(h.controller.status("X"), Some(ConnectionStatus::Connected));
    let shown = h.display.last_for("X").unwrap();
    assert_eq!(shown.text, "Connected");
    assert_eq!(shown.options, DisplayStatusOptions::SHOW_DISCONNECT_BUTTON);

    let connection = h.connector.last_connection("X").unwrap();
    assert_eq!(connection.start_calls(), 1);
    assert_eq!(connection.close_calls(), 0);
}

#[test]
fn test_failed_handshake_leaves_no_entry() {
    let connector = MockConnector::new()
        .with("T", MockBehavior::Open(MockOpen::Outcome(OpenOutcome::RequestTimedOut)))
        .with("D", MockBehavior::Open(MockOpen::Outcome(OpenOutcome::DeniedBySystem)))
        .with("F", MockBehavior::Open(MockOpen::Fault("device gone".to_string())))
        .with("N", MockBehavior::NoHandle);
    let mut h = harness(connector, &[]);

    for id in ["T", "D", "F", "N"] {
        h.controller.connect(device(id));
    }
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert!(h.controller.is_empty());
    for id in ["T", "D", "F", "N"] {
        let shown = h.display.last_for(id).unwrap();
        assert_eq!(shown.options, DisplayStatusOptions::SHOW_RETRY_BUTTON, "{}", id);
    }
    assert_eq!(h.display.last_for("T").unwrap().text, "The request timed out");
    assert_eq!(h.display.last_for("N").unwrap().text, "Unknown error");

    // Every handle that was created is closed exactly once
    for id in ["T", "D", "F"] {
        assert_eq!(h.connector.last_connection(id).unwrap().close_calls(), 1, "{}", id);
    }
}

#[test]
fn test_unknown_failure_shows_extended_error() {
    let connector = MockConnector::new().with(
        "X",
        MockBehavior::Open(MockOpen::Outcome(OpenOutcome::UnknownFailure {
            extended_error: 0x80070005,
        })),
    );
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    assert!(h.controller.run_until_idle(TIMEOUT));

    let shown = h.display.last_for("X").unwrap();
    assert!(shown.text.contains("80070005"), "{}", shown.text);
    assert!(h.controller.is_empty());
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut h = harness(MockConnector::new(), &[]);
    h.controller.connect(device("X"));
    assert!(h.controller.run_until_idle(TIMEOUT));

    h.controller.disconnect("X");
    h.controller.disconnect("X");

    assert!(h.controller.is_empty());
    assert_eq!(h.connector.last_connection("X").unwrap().close_calls(), 1);

    let clears: Vec<_> = h
        .display
        .calls_for("X")
        .into_iter()
        .filter(|c| c.text.is_empty() && c.options == DisplayStatusOptions::NONE)
        .collect();
    assert_eq!(clears.len(), 2);
}

#[test]
fn test_replay_skips_unresolvable_ids() {
    let mut h = harness(MockConnector::new(), &[("X", "Speaker"), ("Z", "Phone")]);

    h.controller
        .reconnect_all(vec!["X".to_string(), "Y".to_string(), "Z".to_string()]);
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert_eq!(h.resolver.calls(), vec!["X", "Y", "Z"]);
    assert_eq!(h.connector.requests(), vec!["X", "Z"]);
    assert!(h.display.calls_for("Y").is_empty());
    assert_eq!(h.controller.registry().device_ids().len(), 2);
}

#[test]
fn test_close_during_pending_handshake() {
    let connector = MockConnector::new().with("X", MockBehavior::Open(MockOpen::Gated));
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    let connection = h.connector.last_connection("X").unwrap();
    assert!(connection.is_observed());

    // The OS closes the connection while open() is still pending
    connection.emit_state(ConnectionState::Closed);
    h.controller.process_events();
    assert!(h.controller.is_empty());

    connection.release_open(MockOpen::Outcome(OpenOutcome::Success));
    assert!(h.controller.run_until_idle(TIMEOUT));

    // The late success does not resurrect the entry
    assert!(h.controller.is_empty());
    let shown = h.display.last_for("X").unwrap();
    assert!(shown.text.is_empty());
    assert_eq!(shown.options, DisplayStatusOptions::NONE);
    assert_eq!(connection.close_calls(), 1);
    assert!(!connection.is_observed());
}

#[test]
fn test_disconnect_while_connecting() {
    let connector = MockConnector::new().with("X", MockBehavior::Open(MockOpen::Gated));
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    let connection = h.connector.last_connection("X").unwrap();

    h.controller.disconnect("X");
    assert!(h.controller.is_empty());

    connection.release_open(MockOpen::Outcome(OpenOutcome::Success));
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert!(h.controller.is_empty());
    assert_eq!(connection.close_calls(), 1);
    let shown = h.display.last_for("X").unwrap();
    assert!(shown.text.is_empty());
    assert_eq!(shown.options, DisplayStatusOptions::NONE);
}

#[test]
fn test_start_fault_releases_handle() {
    let connector = MockConnector::new().with("X", MockBehavior::StartFault("start refused".to_string()));
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert!(h.controller.is_empty());
    let shown = h.display.last_for("X").unwrap();
    assert_eq!(shown.options, DisplayStatusOptions::SHOW_RETRY_BUTTON);
    assert!(shown.text.contains("(0x80004005)"), "{}", shown.text);

    let connection = h.connector.last_connection("X").unwrap();
    assert_eq!(connection.start_calls(), 1);
    assert_eq!(connection.close_calls(), 1);
}

#[test]
fn test_observer_registration_fault_closes_handle() {
    let connector =
        MockConnector::new().with("X", MockBehavior::ObserveFault("no state events".to_string()));
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    // Nothing is spawned when registration fails
    assert!(h.controller.is_idle());
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert!(h.controller.is_empty());
    let shown = h.display.last_for("X").unwrap();
    assert_eq!(shown.options, DisplayStatusOptions::SHOW_RETRY_BUTTON);
    assert!(shown.text.contains("(0x80004005)"), "{}", shown.text);

    let connection = h.connector.last_connection("X").unwrap();
    assert_eq!(connection.start_calls(), 0);
    assert_eq!(connection.close_calls(), 1);
    assert!(!connection.is_observed());
}

/// Resolver whose lookup panics, as a broken OS binding might
struct PanickingResolver;

impl DeviceResolver for PanickingResolver {
    fn resolve(&self, device_id: &str) -> Result<DeviceDescriptor> {
        panic!("resolver blew up on {}", device_id);
    }
}

#[test]
fn test_replay_worker_panic_still_reaches_idle() {
    let connector = Arc::new(MockConnector::new());
    let mut controller = ConnectionController::new(
        connector.clone(),
        Arc::new(PanickingResolver),
        Rc::new(MockDisplay::new()),
    );

    controller.reconnect_all(vec!["X".to_string(), "Y".to_string()]);
    assert!(controller.run_until_idle(TIMEOUT));

    assert!(connector.requests().is_empty());
    assert!(controller.is_empty());
}

#[test]
fn test_reselect_supersedes_previous_attempt() {
    let connector = MockConnector::new().with("X", MockBehavior::Open(MockOpen::Gated));
    let mut h = harness(connector, &[]);

    h.controller.connect(device("X"));
    let first = h.connector.last_connection("X").unwrap();

    h.connector
        .set("X", MockBehavior::Open(MockOpen::Outcome(OpenOutcome::Success)));
    h.controller.connect(device("X"));
    assert_eq!(first.close_calls(), 1);

    // The first attempt's worker finishes late with a failure
    first.release_open(MockOpen::Outcome(OpenOutcome::DeniedBySystem));
    assert!(h.controller.run_until_idle(TIMEOUT));

    assert_eq!(h.controller.len(), 1);
    assert_eq!(h.controller.status("X"), Some(ConnectionStatus::Connected));
    assert_eq!(h.display.last_for("X").unwrap().text, "Connected");
}

#[test]
fn test_shutdown_returns_connect_order() {
    let mut h = harness(MockConnector::new(), &[]);
    for id in ["C", "A", "B"] {
        h.controller.connect(device(id));
    }
    assert!(h.controller.run_until_idle(TIMEOUT));

    let ids = h.controller.shutdown(true);
    assert_eq!(ids, vec!["C", "A", "B"]);
    assert!(h.controller.is_empty());
    for id in ["C", "A", "B"] {
        assert_eq!(h.connector.last_connection(id).unwrap().close_calls(), 1);
    }
}
