//! Audio Playback Connector - Main Entry Point
//!
//! A Windows system tray application that connects Bluetooth audio sources
//! to this PC.

#![windows_subsystem = "windows"]

// Initialize i18n for the binary (shares locales with library)
rust_i18n::i18n!("locales", fallback = "en");

#[cfg(windows)]
mod app {
    use audio_playback_connector::connection::ConnectionController;
    use audio_playback_connector::coordinator::{AppEvent, Coordinator};
    use audio_playback_connector::error::{AppError, Result};
    use audio_playback_connector::i18n;
    use audio_playback_connector::logging::{init_logging, LoggingConfig};
    use audio_playback_connector::settings::{AppConfig, ConfigManager, StateStore};
    use audio_playback_connector::tray::{
        translate_event, MenuBuilder, OwnerWindow, TrayIconManager, TrayShell,
    };
    use audio_playback_connector::winrt::{
        is_supported, DeviceCache, PickerHost, WinRtConnector, WinRtResolver,
    };
    use log::{error, info, warn};
    use muda::MenuEvent as MudaMenuEvent;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Arc;
    use std::time::Duration;
    use tray_icon::TrayIconEvent;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, GetLastError, BOOL, HANDLE, HWND};
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
    use windows::Win32::System::Console::{
        SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT,
    };
    use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, MessageBoxW, PeekMessageW, TranslateMessage, MB_ICONERROR,
        MB_ICONINFORMATION, MB_OK, MESSAGEBOX_STYLE, MSG, PM_REMOVE,
    };

    /// Named mutex for single-instance enforcement
    const SINGLE_INSTANCE_MUTEX: &str = "Local\\AudioPlaybackConnector_SingleInstance";

    /// Global shutdown flag for Ctrl+C handling
    static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

    /// Console control handler for Ctrl+C, Ctrl+Break, and close events
    unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> BOOL {
        match ctrl_type {
            x if x == CTRL_C_EVENT || x == CTRL_BREAK_EVENT || x == CTRL_CLOSE_EVENT => {
                info!("Received shutdown signal (type: {})", ctrl_type);
                SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
                BOOL::from(true)
            }
            _ => BOOL::from(false),
        }
    }

    /// Main application state
    struct App {
        coordinator: Coordinator<TrayShell>,
        /// Dropping it removes the icon
        _tray: TrayIconManager,
        events: Receiver<AppEvent>,
    }

    impl App {
        fn new(config_manager: &ConfigManager) -> Result<Self> {
            let (tx, events) = channel();

            let owner = OwnerWindow::new()?;
            let cache = Arc::new(DeviceCache::new());
            let picker = Rc::new(PickerHost::new(
                owner.hwnd()?,
                Arc::clone(&cache),
                tx.clone(),
            )?);

            let controller = ConnectionController::new(
                Arc::new(WinRtConnector),
                Arc::new(WinRtResolver::new(cache)),
                picker.clone(),
            );
            let store = StateStore::new(config_manager.state_path());
            let shell = TrayShell::new(owner, picker, MenuBuilder::new()?, tx);
            let tray = TrayIconManager::new()?;

            Ok(Self {
                coordinator: Coordinator::new(controller, store, shell),
                _tray: tray,
                events,
            })
        }

        /// Run the main event loop
        fn run(&mut self) -> Result<()> {
            info!("Starting main event loop");
            self.coordinator.start();

            let menu_channel = MudaMenuEvent::receiver();
            let tray_channel = TrayIconEvent::receiver();
            let mut msg = MSG::default();

            while self.coordinator.is_running() {
                if SHUTDOWN_FLAG.load(Ordering::SeqCst) {
                    self.coordinator.exit_now();
                    break;
                }

                unsafe {
                    while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                        let _ = TranslateMessage(&msg);
                        let _ = DispatchMessageW(&msg);
                    }
                }

                while let Ok(event) = tray_channel.try_recv() {
                    if let Some(event) = translate_event(&event) {
                        self.dispatch(event);
                    }
                }

                while let Ok(event) = menu_channel.try_recv() {
                    if let Some(event) = self.coordinator.shell().menu().handle_event(&event) {
                        self.dispatch(event);
                    }
                }

                while let Ok(event) = self.events.try_recv() {
                    self.dispatch(event);
                }

                self.coordinator.tick();

                std::thread::sleep(Duration::from_millis(50));
            }

            Ok(())
        }

        fn dispatch(&mut self, event: AppEvent) {
            if let Err(e) = self.coordinator.handle(event) {
                error!("Event handling error: {}", e);
            }
        }
    }

    /// Check for single instance using named mutex
    fn check_single_instance() -> Result<HANDLE> {
        let mutex_name = to_wide(SINGLE_INSTANCE_MUTEX);

        unsafe {
            let mutex = CreateMutexW(None, true, PCWSTR::from_raw(mutex_name.as_ptr()))
                .map_err(AppError::WindowsApiError)?;

            // ERROR_ALREADY_EXISTS = 183
            if GetLastError().0 == 183 {
                let _ = CloseHandle(mutex);
                return Err(AppError::ConfigError(
                    rust_i18n::t!("msg_already_running").to_string(),
                ));
            }

            Ok(mutex)
        }
    }

    fn to_wide(text: &str) -> Vec<u16> {
        OsStr::new(text)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    fn message_box(title: &str, message: &str, style: MESSAGEBOX_STYLE) {
        let title_wide = to_wide(title);
        let message_wide = to_wide(message);
        unsafe {
            MessageBoxW(
                HWND::default(),
                PCWSTR::from_raw(message_wide.as_ptr()),
                PCWSTR::from_raw(title_wide.as_ptr()),
                style,
            );
        }
    }

    pub fn main() {
        // Logging and locale come first so every later failure is reported
        let config_manager = match ConfigManager::new() {
            Ok(cm) => cm,
            Err(e) => {
                eprintln!("Failed to initialize config manager: {}", e);
                return;
            }
        };

        let config = config_manager.load().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {}, using defaults", e);
            AppConfig::default()
        });

        let log_config = LoggingConfig::from_settings(&config.logging, config_manager.log_dir());
        if let Err(e) = init_logging(log_config) {
            eprintln!("Failed to initialize logging: {}", e);
        }

        i18n::init(config.general.language.as_deref());

        let mutex = match check_single_instance() {
            Ok(m) => m,
            Err(e) => {
                message_box(
                    &rust_i18n::t!("tray_tooltip"),
                    &e.to_string(),
                    MB_OK | MB_ICONINFORMATION,
                );
                return;
            }
        };

        unsafe {
            let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            if hr.is_err() {
                error!("{}", AppError::ComInitFailed(format!("{:?}", hr)));
                let _ = CloseHandle(mutex);
                return;
            }
        }

        unsafe {
            if let Err(e) = SetConsoleCtrlHandler(Some(console_ctrl_handler), true) {
                warn!("Failed to set console control handler: {:?}", e);
            }
        }

        info!("Audio Playback Connector starting...");
        info!("Version: {}", env!("CARGO_PKG_VERSION"));

        if is_supported() {
            let result = App::new(&config_manager).and_then(|mut app| app.run());
            if let Err(e) = result {
                error!("Application error: {}", e);
                message_box(
                    &rust_i18n::t!("tray_tooltip"),
                    &e.to_string(),
                    MB_OK | MB_ICONERROR,
                );
            }
        } else {
            warn!("AudioPlaybackConnection is not available on this system");
            message_box(
                &rust_i18n::t!("unsupported_os_title"),
                &rust_i18n::t!("unsupported_os_message"),
                MB_OK | MB_ICONERROR,
            );
        }

        unsafe {
            CoUninitialize();
            let _ = ReleaseMutex(mutex);
            let _ = CloseHandle(mutex);
        }

        info!("Audio Playback Connector stopped");
    }
}

#[cfg(windows)]
fn main() {
    app::main();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("audio_playback_connector only runs on Windows 10 2004 or later");
    std::process::exit(1);
}
