//! Connection lifecycle controller
//!
//! Owns the registry and is driven from the UI thread. Blocking OS work
//! (the start/open handshake and device-id resolution) runs on worker
//! threads, which report back through an event channel drained by
//! `process_events`. Every registry update is keyed by device id and the
//! attempt token of the entry, so results that arrive after the entry was
//! superseded, disconnected or closed are ignored.

use crate::connection::device::DeviceDescriptor;
use crate::connection::registry::{closed_observer, ConnectionEntry, ConnectionHandle, Registry};
use crate::connection::status::{ConnectFailure, ConnectionStatus, OpenOutcome};
use crate::connection::traits::{AudioConnector, DeviceResolver, StatusDisplay};
use crate::error::{AppError, Result};
use log::{debug, error, info, warn};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Events posted to the controller from worker threads and OS callbacks
#[derive(Debug)]
pub enum ControllerEvent {
    /// Both handshake phases finished (or one of them failed)
    HandshakeCompleted {
        device_id: String,
        attempt: u64,
        result: Result<OpenOutcome>,
    },
    /// The handle reported its state becoming closed
    ConnectionClosed { device_id: String, attempt: u64 },
    /// A persisted id was resolved during startup replay
    DeviceResolved(DeviceDescriptor),
    ReplayFinished { requested: usize, resolved: usize },
}

/// Makes sure a handshake worker always reports back, even if it panics
struct HandshakeGuard {
    tx: Sender<ControllerEvent>,
    device_id: String,
    attempt: u64,
    reported: bool,
}

impl HandshakeGuard {
    fn new(tx: Sender<ControllerEvent>, device_id: &str, attempt: u64) -> Self {
        Self {
            tx,
            device_id: device_id.to_string(),
            attempt,
            reported: false,
        }
    }

    fn complete(mut self, result: Result<OpenOutcome>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<OpenOutcome>) {
        self.reported = true;
        let _ = self.tx.send(ControllerEvent::HandshakeCompleted {
            device_id: self.device_id.clone(),
            attempt: self.attempt,
            result,
        });
    }
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        if !self.reported {
            self.send(Err(AppError::ConnectionError(
                "Handshake worker stopped before completing".to_string(),
            )));
        }
    }
}

/// Makes sure the replay worker always reports back, even if resolution panics
struct ReplayGuard {
    tx: Sender<ControllerEvent>,
    requested: usize,
    resolved: usize,
    reported: bool,
}

impl ReplayGuard {
    fn new(tx: Sender<ControllerEvent>, requested: usize) -> Self {
        Self {
            tx,
            requested,
            resolved: 0,
            reported: false,
        }
    }

    /// Forward a resolved device; false once the controller is gone
    fn resolved(&mut self, device: DeviceDescriptor) -> bool {
        self.resolved += 1;
        self.tx.send(ControllerEvent::DeviceResolved(device)).is_ok()
    }

    fn finish(mut self) {
        self.send();
    }

    fn send(&mut self) {
        self.reported = true;
        let _ = self.tx.send(ControllerEvent::ReplayFinished {
            requested: self.requested,
            resolved: self.resolved,
        });
    }
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        if !self.reported {
            self.send();
        }
    }
}

pub struct ConnectionController {
    registry: Registry,
    connector: Arc<dyn AudioConnector>,
    resolver: Arc<dyn DeviceResolver>,
    display: Rc<dyn StatusDisplay>,
    event_tx: Sender<ControllerEvent>,
    event_rx: Receiver<ControllerEvent>,
    next_attempt: u64,
    /// Worker threads that have not reported completion yet
    pending_tasks: usize,
}

impl ConnectionController {
    pub fn new(
        connector: Arc<dyn AudioConnector>,
        resolver: Arc<dyn DeviceResolver>,
        display: Rc<dyn StatusDisplay>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            registry: Registry::new(),
            connector,
            resolver,
            display,
            event_tx,
            event_rx,
            next_attempt: 0,
            pending_tasks: 0,
        }
    }

    /// Start connecting to a device.
    ///
    /// The picker shows `Connecting` before this returns. The handshake result
    /// is applied later by `process_events`. An existing entry for the same id
    /// is released and replaced.
    pub fn connect(&mut self, device: DeviceDescriptor) {
        info!("Connecting to {}", device);
        self.reflect(&device.id, &ConnectionStatus::Connecting);

        if let Some(previous) = self.registry.remove(&device.id) {
            info!(
                "Superseding attempt {} for {}",
                previous.attempt(),
                previous.device()
            );
            previous.release();
        }

        let connection = match self.connector.try_create_from_id(&device.id) {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                warn!("No connection handle available for {}", device);
                self.reflect(
                    &device.id,
                    &ConnectionStatus::Failed(ConnectFailure::HandleCreation),
                );
                return;
            }
            Err(e) => {
                error!("Failed to create connection for {}: {}", device, e);
                self.reflect(
                    &device.id,
                    &ConnectionStatus::Failed(ConnectFailure::fault(&e)),
                );
                return;
            }
        };

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let handle = ConnectionHandle::new(connection);

        let tx = self.event_tx.clone();
        let device_id = device.id.clone();
        let observer = closed_observer(move || {
            let _ = tx.send(ControllerEvent::ConnectionClosed {
                device_id: device_id.clone(),
                attempt,
            });
        });

        let subscription = match handle.on_state_changed(observer) {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Failed to observe connection state for {}: {}", device, e);
                handle.close();
                self.reflect(
                    &device.id,
                    &ConnectionStatus::Failed(ConnectFailure::fault(&e)),
                );
                return;
            }
        };

        debug!("Registered attempt {} for {}", attempt, device);
        self.registry.upsert(ConnectionEntry::new(
            device.clone(),
            handle.clone(),
            attempt,
            subscription,
        ));

        self.spawn_handshake(&device.id, attempt, handle);
    }

    fn spawn_handshake(&mut self, device_id: &str, attempt: u64, handle: ConnectionHandle) {
        let guard = HandshakeGuard::new(self.event_tx.clone(), device_id, attempt);
        self.pending_tasks += 1;

        let spawned = thread::Builder::new()
            .name(format!("handshake-{}", attempt))
            .spawn(move || {
                let result = handle.start().and_then(|_| handle.open());
                guard.complete(result);
            });

        if let Err(e) = spawned {
            // The dropped worker closure reports the failure through its guard
            error!("Failed to spawn handshake worker for {}: {}", device_id, e);
        }
    }

    /// Close the connection for a device if present and always clear its picker status
    pub fn disconnect(&mut self, device_id: &str) {
        match self.registry.remove(device_id) {
            Some(entry) => {
                info!("Disconnecting {}", entry.device());
                entry.release();
            }
            None => debug!("Disconnect requested for {} which is not connected", device_id),
        }
        self.reflect(device_id, &ConnectionStatus::Closed);
    }

    /// Resolve persisted ids in order and connect each one that still resolves.
    ///
    /// Resolution runs on a worker thread; ids that no longer resolve are skipped
    /// without any user-visible status.
    pub fn reconnect_all(&mut self, device_ids: Vec<String>) {
        if device_ids.is_empty() {
            return;
        }

        info!("Reconnecting {} device(s) from last session", device_ids.len());
        let resolver = Arc::clone(&self.resolver);
        let guard = ReplayGuard::new(self.event_tx.clone(), device_ids.len());
        self.pending_tasks += 1;

        let spawned = thread::Builder::new()
            .name("device-replay".to_string())
            .spawn(move || {
                let mut guard = guard;
                for device_id in device_ids {
                    match resolver.resolve(&device_id) {
                        Ok(device) => {
                            if !guard.resolved(device) {
                                return;
                            }
                        }
                        Err(e) => debug!("Skipping device {}: {}", device_id, e),
                    }
                }
                guard.finish();
            });

        if let Err(e) = spawned {
            // The dropped worker closure reports completion through its guard
            warn!("Failed to start reconnect replay: {}", e);
        }
    }

    /// Release every handle and clear the registry.
    ///
    /// Returns the ids that were registered, in the order they were connected,
    /// when `persist_list` is set; otherwise an empty list.
    pub fn shutdown(&mut self, persist_list: bool) -> Vec<String> {
        let mut entries = self.registry.drain();
        entries.sort_by_key(|entry| entry.attempt());
        info!("Closing {} connection(s)", entries.len());

        let device_ids: Vec<String> = entries.iter().map(|e| e.device().id.clone()).collect();
        for entry in entries {
            entry.release();
        }

        if persist_list {
            device_ids
        } else {
            Vec::new()
        }
    }

    /// Apply all queued events without blocking; returns how many were handled
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Block for up to `timeout` for one event, then drain the rest
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    /// Process events until no worker is outstanding; false on timeout
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.process_events();
        while !self.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_and_process(deadline - now);
        }
        true
    }

    pub fn is_idle(&self) -> bool {
        self.pending_tasks == 0
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::HandshakeCompleted {
                device_id,
                attempt,
                result,
            } => {
                self.pending_tasks = self.pending_tasks.saturating_sub(1);
                self.on_handshake_completed(&device_id, attempt, result);
            }
            ControllerEvent::ConnectionClosed { device_id, attempt } => {
                self.on_connection_closed(&device_id, attempt);
            }
            ControllerEvent::DeviceResolved(device) => {
                self.connect(device);
            }
            ControllerEvent::ReplayFinished {
                requested,
                resolved,
            } => {
                self.pending_tasks = self.pending_tasks.saturating_sub(1);
                info!(
                    "Reconnect replay finished: {} of {} device(s) resolved",
                    resolved, requested
                );
            }
        }
    }

    fn is_current(&self, device_id: &str, attempt: u64) -> bool {
        self.registry
            .get(device_id)
            .map_or(false, |entry| entry.attempt() == attempt)
    }

    fn on_handshake_completed(&mut self, device_id: &str, attempt: u64, result: Result<OpenOutcome>) {
        if !self.is_current(device_id, attempt) {
            debug!(
                "Ignoring handshake result for {} from stale attempt {}",
                device_id, attempt
            );
            return;
        }

        let failure = match result {
            Ok(outcome) => match ConnectFailure::from_outcome(outcome) {
                None => {
                    if let Some(entry) = self.registry.get_mut(device_id) {
                        entry.set_status(ConnectionStatus::Connected);
                        info!("Connected to {}", entry.device());
                    }
                    self.reflect(device_id, &ConnectionStatus::Connected);
                    return;
                }
                Some(failure) => failure,
            },
            Err(e) => ConnectFailure::fault(&e),
        };

        if let Some(entry) = self.registry.remove(device_id) {
            warn!("Connection to {} failed: {}", entry.device(), failure);
            entry.release();
        }
        self.reflect(device_id, &ConnectionStatus::Failed(failure));
    }

    fn on_connection_closed(&mut self, device_id: &str, attempt: u64) {
        if !self.is_current(device_id, attempt) {
            debug!(
                "Ignoring close notification for {} from stale attempt {}",
                device_id, attempt
            );
            return;
        }

        if let Some(entry) = self.registry.remove(device_id) {
            info!("Connection to {} was closed", entry.device());
            entry.release();
        }
        self.reflect(device_id, &ConnectionStatus::Closed);
    }

    fn reflect(&self, device_id: &str, status: &ConnectionStatus) {
        let (text, options) = status.display();
        self.display.set_display_status(device_id, &text, options);
    }

    /// Current status of a registered device
    pub fn status(&self, device_id: &str) -> Option<ConnectionStatus> {
        self.registry.get(device_id).map(|entry| entry.status().clone())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::status::{ConnectionState, DisplayStatusOptions};
    use crate::connection::traits::mocks::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup(connector: MockConnector) -> (ConnectionController, Arc<MockConnector>, Rc<MockDisplay>) {
        let connector = Arc::new(connector);
        let resolver = Arc::new(MockResolver::new(&[("A", "Speaker A"), ("B", "Speaker B")]));
        let display = Rc::new(MockDisplay::new());
        let controller = ConnectionController::new(
            Arc::clone(&connector) as Arc<dyn AudioConnector>,
            resolver,
            Rc::clone(&display) as Rc<dyn StatusDisplay>,
        );
        (controller, connector, display)
    }

    fn device(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id, format!("Speaker {}", id))
    }

    #[test]
    fn test_connecting_status_is_shown_synchronously() {
        let (mut controller, _, display) =
            setup(MockConnector::new().with("A", MockBehavior::Open(MockOpen::Gated)));
        controller.connect(device("A"));

        let first = &display.calls_for("A")[0];
        assert_eq!(
            first.options,
            DisplayStatusOptions::SHOW_PROGRESS | DisplayStatusOptions::SHOW_DISCONNECT_BUTTON
        );
        assert_eq!(controller.status("A"), Some(ConnectionStatus::Connecting));
        assert!(!controller.is_idle());
    }

    #[test]
    fn test_successful_connect() {
        let (mut controller, connector, display) = setup(MockConnector::new());
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        assert_eq!(controller.status("A"), Some(ConnectionStatus::Connected));
        assert_eq!(
            display.last_for("A").unwrap().options,
            DisplayStatusOptions::SHOW_DISCONNECT_BUTTON
        );
        let connection = connector.last_connection("A").unwrap();
        assert_eq!(connection.start_calls(), 1);
        assert_eq!(connection.close_calls(), 0);
        assert!(connection.is_observed());
    }

    #[test]
    fn test_no_handle_is_not_registered() {
        let (mut controller, _, display) =
            setup(MockConnector::new().with("A", MockBehavior::NoHandle));
        controller.connect(device("A"));

        assert!(controller.is_idle());
        assert!(controller.status("A").is_none());
        let last = display.last_for("A").unwrap();
        assert_eq!(last.options, DisplayStatusOptions::SHOW_RETRY_BUTTON);
        assert_eq!(last.text, ConnectFailure::HandleCreation.status_text());
    }

    #[test]
    fn test_create_fault_is_reported() {
        let (mut controller, _, display) = setup(
            MockConnector::new().with("A", MockBehavior::CreateFault("bad id".to_string())),
        );
        controller.connect(device("A"));

        assert!(controller.status("A").is_none());
        let last = display.last_for("A").unwrap();
        assert!(last.text.contains("bad id"));
        assert!(last.text.contains("80004005"));
    }

    #[test]
    fn test_timeout_removes_entry_and_closes_handle() {
        let (mut controller, connector, display) = setup(MockConnector::new().with(
            "A",
            MockBehavior::Open(MockOpen::Outcome(OpenOutcome::RequestTimedOut)),
        ));
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        assert!(controller.status("A").is_none());
        assert_eq!(
            display.last_for("A").unwrap().text,
            ConnectFailure::HandshakeTimeout.status_text()
        );
        assert_eq!(connector.last_connection("A").unwrap().close_calls(), 1);
    }

    #[test]
    fn test_disconnect_releases_and_clears() {
        let (mut controller, connector, display) = setup(MockConnector::new());
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        controller.disconnect("A");
        assert!(controller.status("A").is_none());
        let last = display.last_for("A").unwrap();
        assert!(last.text.is_empty());
        assert_eq!(last.options, DisplayStatusOptions::NONE);

        let connection = connector.last_connection("A").unwrap();
        assert_eq!(connection.close_calls(), 1);
        assert!(!connection.is_observed());
    }

    #[test]
    fn test_disconnect_unknown_device_still_clears_status() {
        let (mut controller, _, display) = setup(MockConnector::new());
        controller.disconnect("ghost");
        assert!(controller.status("ghost").is_none());
        assert_eq!(display.calls_for("ghost").len(), 1);
    }

    #[test]
    fn test_external_close_removes_entry() {
        let (mut controller, connector, display) = setup(MockConnector::new());
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        connector
            .last_connection("A")
            .unwrap()
            .emit_state(ConnectionState::Closed);
        controller.process_events();

        assert!(controller.status("A").is_none());
        assert!(display.last_for("A").unwrap().text.is_empty());
        assert_eq!(connector.last_connection("A").unwrap().close_calls(), 1);
    }

    #[test]
    fn test_opened_state_is_ignored() {
        let (mut controller, connector, _) = setup(MockConnector::new());
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        connector
            .last_connection("A")
            .unwrap()
            .emit_state(ConnectionState::Opened);
        assert_eq!(controller.process_events(), 0);
        assert_eq!(controller.status("A"), Some(ConnectionStatus::Connected));
    }

    #[test]
    fn test_supersede_releases_previous_handle() {
        let (mut controller, connector, _) =
            setup(MockConnector::new().with("A", MockBehavior::Open(MockOpen::Gated)));
        controller.connect(device("A"));
        connector.set("A", MockBehavior::Open(MockOpen::Outcome(OpenOutcome::Success)));
        controller.connect(device("A"));

        let connections = connector.connections_for("A");
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].close_calls(), 1);
        assert!(!connections[0].is_observed());
        assert_eq!(controller.len(), 1);

        connections[0].release_open(MockOpen::Outcome(OpenOutcome::DeniedBySystem));
        assert!(controller.run_until_idle(WAIT));

        assert_eq!(controller.status("A"), Some(ConnectionStatus::Connected));
        assert_eq!(connections[1].close_calls(), 0);
    }

    #[test]
    fn test_shutdown_returns_ids_in_connect_order() {
        let (mut controller, connector, _) = setup(MockConnector::new());
        controller.connect(device("B"));
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        let ids = controller.shutdown(true);
        assert_eq!(ids, vec!["B".to_string(), "A".to_string()]);
        assert!(controller.is_empty());
        assert_eq!(connector.last_connection("A").unwrap().close_calls(), 1);
        assert_eq!(connector.last_connection("B").unwrap().close_calls(), 1);
    }

    #[test]
    fn test_shutdown_without_persist_returns_empty() {
        let (mut controller, _, _) = setup(MockConnector::new());
        controller.connect(device("A"));
        assert!(controller.run_until_idle(WAIT));

        assert!(controller.shutdown(false).is_empty());
        assert!(controller.is_empty());
    }

    #[test]
    fn test_guard_reports_when_worker_drops_it() {
        let (tx, rx) = mpsc::channel();
        drop(HandshakeGuard::new(tx, "A", 3));
        match rx.try_recv().unwrap() {
            ControllerEvent::HandshakeCompleted {
                device_id,
                attempt,
                result,
            } => {
                assert_eq!(device_id, "A");
                assert_eq!(attempt, 3);
                assert!(result.is_err());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_replay_guard_reports_partial_progress_on_drop() {
        let (tx, rx) = mpsc::channel();
        let mut guard = ReplayGuard::new(tx, 3);
        assert!(guard.resolved(device("A")));
        drop(guard);

        assert!(matches!(rx.try_recv().unwrap(), ControllerEvent::DeviceResolved(_)));
        match rx.try_recv().unwrap() {
            ControllerEvent::ReplayFinished { requested, resolved } => {
                assert_eq!(requested, 3);
                assert_eq!(resolved, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_replay_guard_finish_reports_once() {
        let (tx, rx) = mpsc::channel();
        ReplayGuard::new(tx, 0).finish();

        assert!(matches!(
            rx.try_recv().unwrap(),
            ControllerEvent::ReplayFinished { requested: 0, resolved: 0 }
        ));
        assert!(rx.try_recv().is_err());
    }
}
