//! Windows implementation of the coordinator's `Shell`

use crate::coordinator::{AppEvent, ScreenPoint, ScreenRect, Shell};
use crate::error::{AppError, Result};
use crate::tray::exit_dialog;
use crate::tray::menu::MenuBuilder;
use crate::winrt::PickerHost;
use log::{debug, info};
use native_windows_gui as nwg;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::mpsc::Sender;
use windows::core::HSTRING;
use windows::Foundation::Uri;
use windows::System::Launcher;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::SetForegroundWindow;

const BLUETOOTH_SETTINGS_URI: &str = "ms-settings:bluetooth";

/// Invisible top-level window that owns the picker and the context menu
pub struct OwnerWindow {
    window: nwg::Window,
}

impl OwnerWindow {
    pub fn new() -> Result<Self> {
        nwg::init().map_err(|e| AppError::ConfigError(format!("NWG init failed: {}", e)))?;

        let mut window = nwg::Window::default();
        nwg::Window::builder()
            .size((1, 1))
            .position((0, 0))
            .title("AudioPlaybackConnector")
            .flags(nwg::WindowFlags::POPUP)
            .build(&mut window)
            .map_err(|e| AppError::ConfigError(format!("Window build failed: {}", e)))?;

        Ok(Self { window })
    }

    pub fn hwnd(&self) -> Result<HWND> {
        self.window
            .handle
            .hwnd()
            .map(|raw| HWND(raw as *mut c_void))
            .ok_or_else(|| AppError::ConfigError("Owner window has no handle".to_string()))
    }
}

pub struct TrayShell {
    owner: OwnerWindow,
    picker: Rc<PickerHost>,
    menu: MenuBuilder,
    events: Sender<AppEvent>,
}

impl TrayShell {
    pub fn new(
        owner: OwnerWindow,
        picker: Rc<PickerHost>,
        menu: MenuBuilder,
        events: Sender<AppEvent>,
    ) -> Self {
        Self {
            owner,
            picker,
            menu,
            events,
        }
    }

    pub fn menu(&self) -> &MenuBuilder {
        &self.menu
    }
}

impl Shell for TrayShell {
    fn show_picker(&self, anchor: ScreenRect) -> Result<()> {
        self.picker.show(anchor)
    }

    fn show_context_menu(&self, point: ScreenPoint) -> Result<()> {
        let hwnd = self.owner.hwnd()?;
        debug!("Showing context menu at {:?}", point);
        unsafe {
            // Lets the menu close when the user clicks elsewhere
            let _ = SetForegroundWindow(hwnd);
        }
        self.menu.show(hwnd.0 as isize, point);
        Ok(())
    }

    fn confirm_exit(&self, reconnect_default: bool) -> Result<()> {
        exit_dialog::spawn(reconnect_default, self.events.clone())
    }

    fn open_bluetooth_settings(&self) -> Result<()> {
        let uri = Uri::CreateUri(&HSTRING::from(BLUETOOTH_SETTINGS_URI))?;
        // The launch completes asynchronously; its result is not needed
        let _ = Launcher::LaunchUriAsync(&uri)?;
        info!("Launched {}", BLUETOOTH_SETTINGS_URI);
        Ok(())
    }
}
