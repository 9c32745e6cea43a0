use std::fmt;

/// Generic failure code used when an error carries no HRESULT of its own
pub const E_FAIL: u32 = 0x8000_4005;

#[derive(Debug)]
pub enum AppError {
    ComInitFailed(String),
    TrayIconFailed(String),
    ConnectionError(String),
    DeviceResolution(String),
    PickerError(String),
    ConfigError(String),
    IoError(std::io::Error),
    #[cfg(windows)]
    WindowsApiError(windows::core::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ComInitFailed(msg) => write!(f, "COM initialization failed: {}", msg),
            AppError::TrayIconFailed(msg) => write!(f, "Tray icon creation failed: {}", msg),
            AppError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            AppError::DeviceResolution(msg) => write!(f, "Device resolution failed: {}", msg),
            AppError::PickerError(msg) => write!(f, "Device picker error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::IoError(e) => write!(f, "IO error: {}", e),
            #[cfg(windows)]
            AppError::WindowsApiError(e) => write!(f, "Windows API error: {}", e),
        }
    }
}

impl AppError {
    /// HRESULT-style code for user-facing status text
    pub fn code(&self) -> u32 {
        match self {
            #[cfg(windows)]
            AppError::WindowsApiError(e) => e.code().0 as u32,
            AppError::IoError(e) => match e.raw_os_error() {
                // HRESULT_FROM_WIN32
                Some(code) if code > 0 => 0x8007_0000 | (code as u32 & 0xFFFF),
                _ => E_FAIL,
            },
            _ => E_FAIL,
        }
    }

    /// Message without the category prefix, shown next to a device row
    pub fn message(&self) -> String {
        match self {
            AppError::ComInitFailed(msg)
            | AppError::TrayIconFailed(msg)
            | AppError::ConnectionError(msg)
            | AppError::DeviceResolution(msg)
            | AppError::PickerError(msg)
            | AppError::ConfigError(msg) => msg.clone(),
            AppError::IoError(e) => e.to_string(),
            #[cfg(windows)]
            AppError::WindowsApiError(e) => {
                let msg = e.message();
                if msg.is_empty() {
                    e.to_string()
                } else {
                    msg
                }
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for AppError {
    fn from(err: windows::core::Error) -> Self {
        AppError::WindowsApiError(err)
    }
}

#[cfg(windows)]
impl From<muda::Error> for AppError {
    fn from(err: muda::Error) -> Self {
        AppError::TrayIconFailed(err.to_string())
    }
}

#[cfg(windows)]
impl From<tray_icon::Error> for AppError {
    fn from(err: tray_icon::Error) -> Self {
        AppError::TrayIconFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
