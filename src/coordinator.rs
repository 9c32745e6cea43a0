//! Bridges tray, picker and dialog events into the connection controller

use crate::connection::{ConnectionController, DeviceDescriptor};
use crate::error::Result;
use crate::settings::{PersistedSettings, StateStore};
use log::{debug, info, warn};

/// Screen rectangle in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

/// User-facing events delivered to the UI thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Tray icon primary click, with the icon's screen rectangle
    IconActivated { anchor: ScreenRect },
    /// Tray icon secondary click
    IconContextRequested { point: ScreenPoint },
    DeviceSelected(DeviceDescriptor),
    DisconnectClicked(DeviceDescriptor),
    PickerDismissed,
    OpenBluetoothSettings,
    ExitRequested,
    /// Exit dialog confirmed with the state of the reconnect checkbox
    ExitConfirmed { reconnect: bool },
    ExitCancelled,
}

/// Surfaces the coordinator drives
pub trait Shell {
    fn show_picker(&self, anchor: ScreenRect) -> Result<()>;
    fn show_context_menu(&self, point: ScreenPoint) -> Result<()>;
    /// Ask for exit confirmation; the answer comes back as an `AppEvent`
    fn confirm_exit(&self, reconnect_default: bool) -> Result<()>;
    fn open_bluetooth_settings(&self) -> Result<()>;
}

pub struct Coordinator<S: Shell> {
    controller: ConnectionController,
    store: StateStore,
    settings: PersistedSettings,
    shell: S,
    running: bool,
    exit_pending: bool,
}

impl<S: Shell> Coordinator<S> {
    /// Create the coordinator, loading persisted settings before anything connects
    pub fn new(controller: ConnectionController, store: StateStore, shell: S) -> Self {
        let settings = store.load();
        Self {
            controller,
            store,
            settings,
            shell,
            running: true,
            exit_pending: false,
        }
    }

    /// Replay the devices from the last session when reconnect is enabled
    pub fn start(&mut self) {
        if self.settings.reconnect {
            self.controller
                .reconnect_all(self.settings.last_device_ids.clone());
        } else {
            debug!("Reconnect disabled, skipping startup replay");
        }
    }

    pub fn handle(&mut self, event: AppEvent) -> Result<()> {
        if !self.running {
            debug!("Ignoring {:?} after exit", event);
            return Ok(());
        }

        match event {
            AppEvent::IconActivated { anchor } => {
                debug!("Showing device picker at {:?}", anchor);
                self.shell.show_picker(anchor)?;
            }
            AppEvent::IconContextRequested { point } => {
                self.shell.show_context_menu(point)?;
            }
            AppEvent::DeviceSelected(device) => {
                self.controller.connect(device);
            }
            AppEvent::DisconnectClicked(device) => {
                self.controller.disconnect(&device.id);
            }
            AppEvent::PickerDismissed => {
                debug!("Device picker dismissed");
            }
            AppEvent::OpenBluetoothSettings => {
                info!("Opening Bluetooth settings");
                self.shell.open_bluetooth_settings()?;
            }
            AppEvent::ExitRequested => {
                if self.controller.is_empty() {
                    info!("Exit requested with no connections");
                    self.running = false;
                } else if self.exit_pending {
                    debug!("Exit confirmation already showing");
                } else {
                    info!(
                        "Exit requested with {} connection(s), asking for confirmation",
                        self.controller.len()
                    );
                    self.exit_pending = true;
                    if let Err(e) = self.shell.confirm_exit(self.settings.reconnect) {
                        self.exit_pending = false;
                        return Err(e);
                    }
                }
            }
            AppEvent::ExitConfirmed { reconnect } => {
                if !self.exit_pending {
                    warn!("Exit confirmation without a pending request, ignoring");
                    return Ok(());
                }
                self.exit_pending = false;
                self.finish(reconnect);
            }
            AppEvent::ExitCancelled => {
                debug!("Exit cancelled");
                self.exit_pending = false;
            }
        }
        Ok(())
    }

    /// Close everything and save without asking, keeping the current reconnect flag
    pub fn exit_now(&mut self) {
        if !self.running {
            return;
        }
        if self.controller.is_empty() {
            self.running = false;
        } else {
            let reconnect = self.settings.reconnect;
            self.finish(reconnect);
        }
    }

    fn finish(&mut self, reconnect: bool) {
        self.settings.reconnect = reconnect;
        self.settings.last_device_ids = self.controller.shutdown(reconnect);
        self.store.save(&self.settings);
        self.running = false;
        info!("Connections closed, exiting");
    }

    /// Apply pending controller events
    pub fn tick(&mut self) -> usize {
        self.controller.process_events()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_exit_pending(&self) -> bool {
        self.exit_pending
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ConnectionController {
        &mut self.controller
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }
}
