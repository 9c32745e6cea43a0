//! In-memory record of connections that are in flight or established

use crate::connection::device::DeviceDescriptor;
use crate::connection::status::{ConnectionState, ConnectionStatus, OpenOutcome};
use crate::connection::traits::{PlaybackConnection, StateObserver, Subscription};
use crate::error::Result;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared reference to an OS connection that is closed at most once.
///
/// Clones are handed to the handshake worker; whichever clone calls
/// `close` first closes the underlying connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    connection: Arc<dyn PlaybackConnection>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(connection: Arc<dyn PlaybackConnection>) -> Self {
        Self {
            connection,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.connection.start()
    }

    pub fn open(&self) -> Result<OpenOutcome> {
        self.connection.open()
    }

    pub fn on_state_changed(&self, observer: StateObserver) -> Result<Subscription> {
        self.connection.on_state_changed(observer)
    }

    /// Close the connection; returns false if it was already closed
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.connection.close();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Registry entry; owns the handle and closes it when dropped
pub struct ConnectionEntry {
    device: DeviceDescriptor,
    handle: ConnectionHandle,
    status: ConnectionStatus,
    attempt: u64,
    subscription: Option<Subscription>,
}

impl ConnectionEntry {
    pub fn new(
        device: DeviceDescriptor,
        handle: ConnectionHandle,
        attempt: u64,
        subscription: Subscription,
    ) -> Self {
        Self {
            device,
            handle,
            status: ConnectionStatus::Connecting,
            attempt,
            subscription: Some(subscription),
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Token of the connect attempt that created this entry
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Stop observing state changes and close the handle
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ConnectionEntry {
    fn drop(&mut self) {
        // Unsubscribe first so our own close does not echo back as a state change
        self.subscription.take();
        if self.handle.close() {
            debug!("Closed connection for {}", self.device);
        }
    }
}

/// Device id -> entry, at most one entry per id
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, ConnectionEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry keyed by its device id, returning the replaced entry
    pub fn upsert(&mut self, entry: ConnectionEntry) -> Option<ConnectionEntry> {
        self.entries.insert(entry.device.id.clone(), entry)
    }

    /// Remove the entry for a device id; no-op when absent
    pub fn remove(&mut self, device_id: &str) -> Option<ConnectionEntry> {
        self.entries.remove(device_id)
    }

    pub fn get(&self, device_id: &str) -> Option<&ConnectionEntry> {
        self.entries.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut ConnectionEntry> {
        self.entries.get_mut(device_id)
    }

    /// Snapshot of all entries, in no particular order
    pub fn all_entries(&self) -> Vec<&ConnectionEntry> {
        self.entries.values().collect()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn drain(&mut self) -> Vec<ConnectionEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

/// Observer that forwards only the `Closed` transition
pub(crate) fn closed_observer(on_closed: impl Fn() + Send + Sync + 'static) -> StateObserver {
    Box::new(move |state| {
        if state == ConnectionState::Closed {
            on_closed();
        }
    })
}
