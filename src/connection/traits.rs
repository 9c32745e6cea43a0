//! Trait abstractions over the OS device-discovery and audio-connection surfaces
//! These traits allow the lifecycle controller to run against mocks in unit tests

use crate::connection::device::DeviceDescriptor;
use crate::connection::status::{ConnectionState, DisplayStatusOptions, OpenOutcome};
use crate::error::Result;
use std::sync::Arc;

/// Callback invoked on whatever thread the OS raises state changes on
pub type StateObserver = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// A live (or opening) audio playback redirection channel to one device
pub trait PlaybackConnection: Send + Sync {
    /// First handshake phase; blocks until the OS completes it
    fn start(&self) -> Result<()>;
    /// Second handshake phase; blocks until the OS reports an open result
    fn open(&self) -> Result<OpenOutcome>;
    fn on_state_changed(&self, observer: StateObserver) -> Result<Subscription>;
    fn close(&self);
}

/// Factory for playback connections
pub trait AudioConnector: Send + Sync {
    /// `Ok(None)` means the OS cannot produce a handle for this id.
    fn try_create_from_id(&self, device_id: &str) -> Result<Option<Arc<dyn PlaybackConnection>>>;
}

/// Resolves a persisted device id back into a descriptor
pub trait DeviceResolver: Send + Sync {
    fn resolve(&self, device_id: &str) -> Result<DeviceDescriptor>;
}

/// Per-device status line in the picker
pub trait StatusDisplay {
    fn set_display_status(&self, device_id: &str, text: &str, options: DisplayStatusOptions);
}

/// Observer registration; dropping it unregisters the observer
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    /// How long a gated open waits for the test to release it
    const GATE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Scripted result of the open phase
    #[derive(Debug, Clone)]
    pub enum MockOpen {
        Outcome(OpenOutcome),
        /// `open()` returns this error message
        Fault(String),
        /// `open()` blocks until `MockConnection::release_open` is called
        Gated,
    }

    /// Scripted behavior of the connector for one device id
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        NoHandle,
        CreateFault(String),
        Open(MockOpen),
        /// A handle is created but `start()` fails with this message
        StartFault(String),
        /// A handle is created but observer registration fails with this message
        ObserveFault(String),
    }

    pub struct MockConnection {
        pub device_id: String,
        script: Mutex<MockOpen>,
        gate: Condvar,
        observer: Arc<Mutex<Option<StateObserver>>>,
        start_fault: Option<String>,
        observe_fault: Option<String>,
        start_calls: AtomicUsize,
        close_calls: AtomicUsize,
    }

    impl MockConnection {
        pub fn new(device_id: &str, script: MockOpen) -> Self {
            Self {
                device_id: device_id.to_string(),
                script: Mutex::new(script),
                gate: Condvar::new(),
                observer: Arc::new(Mutex::new(None)),
                start_fault: None,
                observe_fault: None,
                start_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
            }
        }

        pub fn failing_start(device_id: &str, message: &str) -> Self {
            Self {
                start_fault: Some(message.to_string()),
                ..Self::new(device_id, MockOpen::Outcome(OpenOutcome::Success))
            }
        }

        pub fn failing_observe(device_id: &str, message: &str) -> Self {
            Self {
                observe_fault: Some(message.to_string()),
                ..Self::new(device_id, MockOpen::Outcome(OpenOutcome::Success))
            }
        }

        /// Let a gated `open()` finish with the given script
        pub fn release_open(&self, script: MockOpen) {
            *self.script.lock().unwrap() = script;
            self.gate.notify_all();
        }

        /// Raise a state change as the OS would
        pub fn emit_state(&self, state: ConnectionState) {
            if let Some(observer) = self.observer.lock().unwrap().as_ref() {
                observer(state);
            }
        }

        pub fn is_observed(&self) -> bool {
            self.observer.lock().unwrap().is_some()
        }

        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }
    }

    impl PlaybackConnection for MockConnection {
        fn start(&self) -> Result<()> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            match &self.start_fault {
                Some(message) => Err(AppError::ConnectionError(message.clone())),
                None => Ok(()),
            }
        }

        fn open(&self) -> Result<OpenOutcome> {
            let guard = self.script.lock().unwrap();
            let (guard, _) = self
                .gate
                .wait_timeout_while(guard, GATE_TIMEOUT, |script| {
                    matches!(script, MockOpen::Gated)
                })
                .unwrap();
            match &*guard {
                MockOpen::Outcome(outcome) => Ok(*outcome),
                MockOpen::Fault(message) => Err(AppError::ConnectionError(message.clone())),
                MockOpen::Gated => Err(AppError::ConnectionError("open gate timed out".to_string())),
            }
        }

        fn on_state_changed(&self, observer: StateObserver) -> Result<Subscription> {
            if let Some(message) = &self.observe_fault {
                return Err(AppError::ConnectionError(message.clone()));
            }
            *self.observer.lock().unwrap() = Some(observer);
            let slot = Arc::clone(&self.observer);
            Ok(Subscription::new(move || {
                *slot.lock().unwrap() = None;
            }))
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Connector that hands out `MockConnection`s; unknown ids open successfully
    pub struct MockConnector {
        behaviors: Mutex<HashMap<String, MockBehavior>>,
        requests: Mutex<Vec<String>>,
        connections: Mutex<Vec<Arc<MockConnection>>>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self {
                behaviors: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                connections: Mutex::new(Vec::new()),
            }
        }

        pub fn with(self, device_id: &str, behavior: MockBehavior) -> Self {
            self.set(device_id, behavior);
            self
        }

        pub fn set(&self, device_id: &str, behavior: MockBehavior) {
            self.behaviors
                .lock()
                .unwrap()
                .insert(device_id.to_string(), behavior);
        }

        /// Every id passed to `try_create_from_id`, in call order
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        /// Connections created for an id, oldest first
        pub fn connections_for(&self, device_id: &str) -> Vec<Arc<MockConnection>> {
            self.connections
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.device_id == device_id)
                .cloned()
                .collect()
        }

        pub fn last_connection(&self, device_id: &str) -> Option<Arc<MockConnection>> {
            self.connections_for(device_id).pop()
        }

        fn track(&self, connection: MockConnection) -> Arc<dyn PlaybackConnection> {
            let connection = Arc::new(connection);
            self.connections.lock().unwrap().push(Arc::clone(&connection));
            connection
        }
    }

    impl Default for MockConnector {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioConnector for MockConnector {
        fn try_create_from_id(&self, device_id: &str) -> Result<Option<Arc<dyn PlaybackConnection>>> {
            self.requests.lock().unwrap().push(device_id.to_string());
            let behavior = self
                .behaviors
                .lock()
                .unwrap()
                .get(device_id)
                .cloned()
                .unwrap_or(MockBehavior::Open(MockOpen::Outcome(OpenOutcome::Success)));

            match behavior {
                MockBehavior::NoHandle => Ok(None),
                MockBehavior::CreateFault(message) => Err(AppError::ConnectionError(message)),
                MockBehavior::Open(script) => Ok(Some(self.track(MockConnection::new(device_id, script)))),
                MockBehavior::StartFault(message) => {
                    Ok(Some(self.track(MockConnection::failing_start(device_id, &message))))
                }
                MockBehavior::ObserveFault(message) => {
                    Ok(Some(self.track(MockConnection::failing_observe(device_id, &message))))
                }
            }
        }
    }

    /// Resolver backed by a fixed id -> name table
    pub struct MockResolver {
        known: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockResolver {
        pub fn new(devices: &[(&str, &str)]) -> Self {
            Self {
                known: devices
                    .iter()
                    .map(|(id, name)| (id.to_string(), name.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeviceResolver for MockResolver {
        fn resolve(&self, device_id: &str) -> Result<DeviceDescriptor> {
            self.calls.lock().unwrap().push(device_id.to_string());
            self.known
                .get(device_id)
                .map(|name| DeviceDescriptor::new(device_id, name.as_str()))
                .ok_or_else(|| AppError::DeviceResolution(format!("unknown device {}", device_id)))
        }
    }

    /// One recorded `set_display_status` call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StatusCall {
        pub device_id: String,
        pub text: String,
        pub options: DisplayStatusOptions,
    }

    #[derive(Default)]
    pub struct MockDisplay {
        calls: Mutex<Vec<StatusCall>>,
    }

    impl MockDisplay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<StatusCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_for(&self, device_id: &str) -> Vec<StatusCall> {
            self.calls()
                .into_iter()
                .filter(|c| c.device_id == device_id)
                .collect()
        }

        /// The status currently shown for a device
        pub fn last_for(&self, device_id: &str) -> Option<StatusCall> {
            self.calls_for(device_id).pop()
        }
    }

    impl StatusDisplay for MockDisplay {
        fn set_display_status(&self, device_id: &str, text: &str, options: DisplayStatusOptions) {
            self.calls.lock().unwrap().push(StatusCall {
                device_id: device_id.to_string(),
                text: text.to_string(),
                options,
            });
        }
    }
}
