//! Context menu building and event handling

use crate::coordinator::{AppEvent, ScreenPoint};
use crate::error::Result;
use log::info;
use muda::dpi::{PhysicalPosition, Position};
use muda::{ContextMenu, Menu, MenuEvent as MudaMenuEvent, MenuItem, PredefinedMenuItem};

/// Menu item identifiers
pub const MENU_ID_BLUETOOTH_SETTINGS: &str = "bluetooth_settings";
pub const MENU_ID_EXIT: &str = "exit";

/// The tray icon's context menu
pub struct MenuBuilder {
    menu: Menu,
}

impl MenuBuilder {
    pub fn new() -> Result<Self> {
        let mut builder = Self { menu: Menu::new() };
        builder.rebuild()?;
        Ok(builder)
    }

    /// Recreate the items with the current locale's labels
    fn rebuild(&mut self) -> Result<()> {
        let menu = Menu::new();

        let settings_item = MenuItem::with_id(
            MENU_ID_BLUETOOTH_SETTINGS,
            rust_i18n::t!("menu_bluetooth_settings"),
            true,
            None,
        );
        menu.append(&settings_item)?;

        menu.append(&PredefinedMenuItem::separator())?;

        let exit_item = MenuItem::with_id(MENU_ID_EXIT, rust_i18n::t!("menu_exit"), true, None);
        menu.append(&exit_item)?;

        self.menu = menu;
        Ok(())
    }

    /// Show the menu at a screen point; returns once it is dismissed
    pub fn show(&self, hwnd: isize, point: ScreenPoint) {
        let position = Position::Physical(PhysicalPosition::new(point.x, point.y));
        unsafe {
            self.menu.show_context_menu_for_hwnd(hwnd, Some(position));
        }
    }

    /// Convert a muda menu event to the app event it stands for
    pub fn handle_event(&self, event: &MudaMenuEvent) -> Option<AppEvent> {
        let id = event.id().0.as_str();
        info!("Menu event received: '{}'", id);
        translate_id(id)
    }
}

fn translate_id(id: &str) -> Option<AppEvent> {
    match id {
        MENU_ID_BLUETOOTH_SETTINGS => Some(AppEvent::OpenBluetoothSettings),
        MENU_ID_EXIT => Some(AppEvent::ExitRequested),
        _ => None,
    }
}
