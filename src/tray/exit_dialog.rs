//! Exit confirmation dialog using native-windows-gui

use crate::coordinator::AppEvent;
use crate::error::{AppError, Result};
use log::{debug, warn};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

/// Answer collected by the dialog before its message loop stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitChoice {
    Exit { reconnect: bool },
    Cancel,
}

/// Open the dialog on its own thread; the answer is posted to `events`
pub fn spawn(reconnect_default: bool, events: Sender<AppEvent>) -> Result<()> {
    thread::Builder::new()
        .name("exit-dialog".to_string())
        .spawn(move || {
            let event = match show_exit_dialog(reconnect_default) {
                Ok(ExitChoice::Exit { reconnect }) => AppEvent::ExitConfirmed { reconnect },
                Ok(ExitChoice::Cancel) => AppEvent::ExitCancelled,
                Err(e) => {
                    warn!("Exit dialog failed: {}", e);
                    AppEvent::ExitCancelled
                }
            };
            debug!("Exit dialog answered: {:?}", event);
            let _ = events.send(event);
        })
        .map_err(AppError::IoError)?;
    Ok(())
}

/// Show the dialog and block until it closes
fn show_exit_dialog(reconnect_default: bool) -> Result<ExitChoice> {
    use native_windows_gui as nwg;

    nwg::init().map_err(|e| AppError::ConfigError(format!("NWG init failed: {}", e)))?;

    let mut font = nwg::Font::default();
    nwg::Font::builder()
        .family("Segoe UI")
        .size(17)
        .build(&mut font)
        .map_err(|e| AppError::ConfigError(format!("Font build failed: {}", e)))?;

    nwg::Font::set_global_default(Some(font));

    let win_width = 380;
    let win_height = 170;
    let margin = 16;
    let content_width = win_width - (margin * 2);

    let title = rust_i18n::t!("exit_prompt_title").to_string();
    let message_text = rust_i18n::t!("exit_prompt_message").to_string();
    let reconnect_text = rust_i18n::t!("exit_prompt_reconnect").to_string();
    let exit_text = rust_i18n::t!("exit_prompt_exit").to_string();
    let cancel_text = rust_i18n::t!("exit_prompt_cancel").to_string();

    let mut window = nwg::Window::default();
    nwg::Window::builder()
        .size((win_width, win_height))
        .center(true)
        .title(&title)
        .flags(nwg::WindowFlags::WINDOW | nwg::WindowFlags::VISIBLE)
        .topmost(true)
        .build(&mut window)
        .map_err(|e| AppError::ConfigError(format!("Window build failed: {}", e)))?;

    let mut message = nwg::Label::default();
    nwg::Label::builder()
        .text(&message_text)
        .position((margin, 16))
        .size((content_width, 40))
        .parent(&window)
        .build(&mut message)
        .map_err(|e| AppError::ConfigError(format!("Label build failed: {}", e)))?;

    let mut reconnect_check = nwg::CheckBox::default();
    nwg::CheckBox::builder()
        .text(&reconnect_text)
        .position((margin, 64))
        .size((content_width, 24))
        .parent(&window)
        .check_state(if reconnect_default {
            nwg::CheckBoxState::Checked
        } else {
            nwg::CheckBoxState::Unchecked
        })
        .build(&mut reconnect_check)
        .map_err(|e| AppError::ConfigError(format!("Checkbox build failed: {}", e)))?;

    let footer_y = win_height - 50;
    let btn_width = 80;
    let btn_height = 28;
    let btn_spacing = 10;

    let mut cancel_button = nwg::Button::default();
    nwg::Button::builder()
        .text(&cancel_text)
        .position((win_width - margin - btn_width, footer_y + 8))
        .size((btn_width, btn_height))
        .parent(&window)
        .build(&mut cancel_button)
        .map_err(|e| AppError::ConfigError(format!("Button build failed: {}", e)))?;

    let mut exit_button = nwg::Button::default();
    nwg::Button::builder()
        .text(&exit_text)
        .position((win_width - margin - btn_width * 2 - btn_spacing, footer_y + 8))
        .size((btn_width, btn_height))
        .parent(&window)
        .focus(true)
        .build(&mut exit_button)
        .map_err(|e| AppError::ConfigError(format!("Button build failed: {}", e)))?;

    let window_handle = window.handle;
    let exit_handle = exit_button.handle;
    let cancel_handle = cancel_button.handle;

    // Closing the window any other way counts as Cancel
    let choice = Arc::new(Mutex::new(ExitChoice::Cancel));
    let choice_clone = Arc::clone(&choice);

    let handler = nwg::full_bind_event_handler(&window_handle, move |event, _evt_data, handle| {
        match event {
            nwg::Event::OnButtonClick => {
                if handle == exit_handle {
                    let reconnect =
                        reconnect_check.check_state() == nwg::CheckBoxState::Checked;
                    if let Ok(mut guard) = choice_clone.lock() {
                        *guard = ExitChoice::Exit { reconnect };
                    }
                    nwg::stop_thread_dispatch();
                } else if handle == cancel_handle {
                    nwg::stop_thread_dispatch();
                }
            }
            nwg::Event::OnWindowClose => {
                nwg::stop_thread_dispatch();
            }
            _ => {}
        }
    });

    window.set_visible(true);
    nwg::dispatch_thread_events();

    nwg::unbind_event_handler(&handler);

    let answer = choice.lock().map(|guard| *guard).unwrap_or(ExitChoice::Cancel);
    Ok(answer)
}
