//! `DevicePicker` host: shows the device list and per-device status lines

use crate::connection::device::DeviceDescriptor;
use crate::connection::status::DisplayStatusOptions;
use crate::connection::traits::StatusDisplay;
use crate::coordinator::{AppEvent, ScreenRect};
use crate::error::{AppError, Result};
use crate::winrt::playback::device_selector;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use windows::core::{IInspectable, Interface, HSTRING};
use windows::Devices::Enumeration::{
    DeviceDisconnectButtonClickedEventArgs, DeviceInformation, DevicePicker,
    DevicePickerDisplayStatusOptions, DeviceSelectedEventArgs,
};
use windows::Foundation::{Rect, TypedEventHandler};
use windows::UI::Popups::Placement;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::IInitializeWithWindow;

/// `DeviceInformation` objects seen so far, keyed by id.
///
/// The picker needs the original object to set a status line, while the rest
/// of the app only passes ids around.
#[derive(Default)]
pub struct DeviceCache {
    devices: Mutex<HashMap<String, DeviceInformation>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device and return its descriptor
    pub fn remember(&self, info: &DeviceInformation) -> Result<DeviceDescriptor> {
        let device = DeviceDescriptor::new(info.Id()?.to_string(), info.Name()?.to_string());
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(device.id.clone(), info.clone());
        }
        Ok(device)
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceInformation> {
        self.devices.lock().ok()?.get(device_id).cloned()
    }
}

pub struct PickerHost {
    picker: DevicePicker,
    cache: Arc<DeviceCache>,
}

impl PickerHost {
    /// Create the picker owned by `owner`, posting its events to `events`
    pub fn new(owner: HWND, cache: Arc<DeviceCache>, events: Sender<AppEvent>) -> Result<Self> {
        let picker = DevicePicker::new()?;

        let init: IInitializeWithWindow = picker.cast()?;
        unsafe { init.Initialize(owner)? };

        picker
            .Filter()?
            .SupportedDeviceSelectors()?
            .Append(&device_selector()?)?;

        let tx = events.clone();
        let selected_cache = Arc::clone(&cache);
        picker.DeviceSelected(&TypedEventHandler::<DevicePicker, DeviceSelectedEventArgs>::new(
            move |_, args| {
                if let Some(args) = args {
                    let device = selected_cache.remember(&args.SelectedDevice()?);
                    match device {
                        Ok(device) => {
                            let _ = tx.send(AppEvent::DeviceSelected(device));
                        }
                        Err(e) => warn!("Could not read selected device: {}", e),
                    }
                }
                Ok(())
            },
        ))?;

        let tx = events.clone();
        let disconnect_cache = Arc::clone(&cache);
        picker.DisconnectButtonClicked(&TypedEventHandler::<
            DevicePicker,
            DeviceDisconnectButtonClickedEventArgs,
        >::new(move |_, args| {
            if let Some(args) = args {
                match disconnect_cache.remember(&args.Device()?) {
                    Ok(device) => {
                        let _ = tx.send(AppEvent::DisconnectClicked(device));
                    }
                    Err(e) => warn!("Could not read device to disconnect: {}", e),
                }
            }
            Ok(())
        }))?;

        let tx = events;
        picker.DevicePickerDismissed(&TypedEventHandler::<DevicePicker, IInspectable>::new(
            move |_, _| {
                let _ = tx.send(AppEvent::PickerDismissed);
                Ok(())
            },
        ))?;

        info!("Device picker ready");
        Ok(Self { picker, cache })
    }

    /// Show the picker above the given rectangle (the tray icon)
    pub fn show(&self, anchor: ScreenRect) -> Result<()> {
        let selection = Rect {
            X: anchor.x as f32,
            Y: anchor.y as f32,
            Width: anchor.width as f32,
            Height: anchor.height as f32,
        };
        self.picker
            .ShowWithPlacement(selection, Placement::Above)
            .map_err(|e| AppError::PickerError(e.message()))
    }
}

impl StatusDisplay for PickerHost {
    fn set_display_status(&self, device_id: &str, text: &str, options: DisplayStatusOptions) {
        let Some(info) = self.cache.get(device_id) else {
            debug!("No picker entry for {}, status '{}' not shown", device_id, text);
            return;
        };

        let result = self.picker.SetDisplayStatus(
            &info,
            &HSTRING::from(text),
            DevicePickerDisplayStatusOptions(options.bits()),
        );
        if let Err(e) = result {
            warn!("Failed to set picker status for {}: {}", device_id, e);
        }
    }
}
