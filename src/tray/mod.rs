//! System tray integration module

pub mod exit_dialog;
pub mod icon;
pub mod menu;
pub mod shell;

pub use icon::{translate_event, TrayIconManager};
pub use menu::MenuBuilder;
pub use shell::{OwnerWindow, TrayShell};
