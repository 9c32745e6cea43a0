//! System tray icon management

use crate::coordinator::{AppEvent, ScreenPoint, ScreenRect};
use crate::error::{AppError, Result};
use image::GenericImageView;
use log::{debug, info, warn};
use tray_icon::{
    Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent,
};

const ICON_PATH: &str = "resources/tray.ico";

/// Owns the notification-area icon
pub struct TrayIconManager {
    _tray_icon: TrayIcon,
}

impl TrayIconManager {
    /// Create the tray icon; clicks are read from `TrayIconEvent::receiver()`
    pub fn new() -> Result<Self> {
        let icon = Self::load_icon()?;

        let tray_icon = TrayIconBuilder::new()
            .with_icon(icon)
            .with_tooltip(rust_i18n::t!("tray_tooltip"))
            .build()
            .map_err(|e| AppError::TrayIconFailed(e.to_string()))?;

        info!("Tray icon created successfully");
        Ok(Self {
            _tray_icon: tray_icon,
        })
    }

    fn load_icon() -> Result<Icon> {
        match Self::load_icon_from_file(ICON_PATH) {
            Ok(icon) => {
                debug!("Loaded tray icon from {}", ICON_PATH);
                Ok(icon)
            }
            Err(e) => {
                warn!("Failed to load icon from {}: {}, using fallback", ICON_PATH, e);
                Self::generate_fallback_icon()
            }
        }
    }

    /// Load an icon relative to the working directory, then the executable
    fn load_icon_from_file(path: &str) -> Result<Icon> {
        let img = image::open(path)
            .or_else(|_| {
                if let Some(exe_dir) = std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
                {
                    return image::open(exe_dir.join(path));
                }
                Err(image::ImageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Icon file not found",
                )))
            })
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();
        let rgba = img.into_rgba8().into_raw();

        Icon::from_rgba(rgba, width, height)
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to create icon: {}", e)))
    }

    /// A blue speaker glyph drawn into a 32x32 buffer
    fn generate_fallback_icon() -> Result<Icon> {
        let size = 32usize;
        let mut rgba = vec![0u8; size * size * 4];

        for y in 0..size {
            for x in 0..size {
                let fx = x as f32;
                let fy = y as f32;
                let centre = size as f32 / 2.0;
                // Box on the left, widening cone to the right
                let in_box = (6.0..=12.0).contains(&fx) && (11.0..=21.0).contains(&fy);
                let spread = (fx - 12.0) * 0.8 + 5.0;
                let in_cone = (12.0..=24.0).contains(&fx) && (fy - centre).abs() <= spread;

                if in_box || in_cone {
                    let idx = (y * size + x) * 4;
                    rgba[idx] = 0;
                    rgba[idx + 1] = 120;
                    rgba[idx + 2] = 215;
                    rgba[idx + 3] = 255;
                }
            }
        }

        Icon::from_rgba(rgba, size as u32, size as u32)
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to create icon: {}", e)))
    }
}

/// Map a tray click to the app event it stands for
///
/// Only button releases count, so a click produces one event.
pub fn translate_event(event: &TrayIconEvent) -> Option<AppEvent> {
    let TrayIconEvent::Click {
        rect,
        position,
        button,
        button_state: MouseButtonState::Up,
        ..
    } = event
    else {
        return None;
    };

    match button {
        MouseButton::Left => Some(AppEvent::IconActivated {
            anchor: ScreenRect {
                x: rect.position.x as i32,
                y: rect.position.y as i32,
                width: rect.size.width,
                height: rect.size.height,
            },
        }),
        MouseButton::Right => Some(AppEvent::IconContextRequested {
            point: ScreenPoint {
                x: position.x as i32,
                y: position.y as i32,
            },
        }),
        _ => None,
    }
}
