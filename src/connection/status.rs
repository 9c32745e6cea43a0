//! Connection status values and their picker presentation

use std::fmt;
use std::ops::BitOr;

/// Affordances shown next to a device row in the picker.
///
/// Bit values match `DevicePickerDisplayStatusOptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayStatusOptions(u32);

impl DisplayStatusOptions {
    pub const NONE: Self = Self(0);
    pub const SHOW_PROGRESS: Self = Self(1);
    pub const SHOW_DISCONNECT_BUTTON: Self = Self(2);
    pub const SHOW_RETRY_BUTTON: Self = Self(4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DisplayStatusOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Result of the open phase of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Success,
    RequestTimedOut,
    DeniedBySystem,
    UnknownFailure { extended_error: u32 },
}

/// State reported asynchronously by a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opened,
}

/// Why a connect attempt ended without a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The audio capability could not produce a handle for the id
    HandleCreation,
    HandshakeTimeout,
    HandshakeDenied,
    HandshakeUnknownFailure { code: u32 },
    /// Any other fault raised while connecting
    Fault { message: String, code: u32 },
}

impl ConnectFailure {
    pub fn from_outcome(outcome: OpenOutcome) -> Option<Self> {
        match outcome {
            OpenOutcome::Success => None,
            OpenOutcome::RequestTimedOut => Some(ConnectFailure::HandshakeTimeout),
            OpenOutcome::DeniedBySystem => Some(ConnectFailure::HandshakeDenied),
            OpenOutcome::UnknownFailure { extended_error } => {
                Some(ConnectFailure::HandshakeUnknownFailure {
                    code: extended_error,
                })
            }
        }
    }

    pub fn fault(err: &crate::error::AppError) -> Self {
        ConnectFailure::Fault {
            message: err.message(),
            code: err.code(),
        }
    }

    /// Localized status text for the picker row
    pub fn status_text(&self) -> String {
        match self {
            ConnectFailure::HandleCreation => rust_i18n::t!("status_unknown_error").to_string(),
            ConnectFailure::HandshakeTimeout => rust_i18n::t!("status_timed_out").to_string(),
            ConnectFailure::HandshakeDenied => rust_i18n::t!("status_denied").to_string(),
            ConnectFailure::HandshakeUnknownFailure { code } => {
                rust_i18n::t!("status_unknown_failure", code = format_code(*code)).to_string()
            }
            ConnectFailure::Fault { message, code } => {
                rust_i18n::t!("status_fault", message = message, code = format_code(*code))
                    .to_string()
            }
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::HandleCreation => write!(f, "no connection handle for device"),
            ConnectFailure::HandshakeTimeout => write!(f, "request timed out"),
            ConnectFailure::HandshakeDenied => write!(f, "denied by system"),
            ConnectFailure::HandshakeUnknownFailure { code } => {
                write!(f, "unknown failure (0x{})", format_code(*code))
            }
            ConnectFailure::Fault { message, code } => {
                write!(f, "{} (0x{})", message, format_code(*code))
            }
        }
    }
}

/// Eight uppercase hex digits, e.g. `80070005`
pub fn format_code(code: u32) -> String {
    format!("{:08X}", code)
}

/// Lifecycle status of a device connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(ConnectFailure),
    Closed,
}

impl ConnectionStatus {
    /// Status text and affordances to show in the picker
    pub fn display(&self) -> (String, DisplayStatusOptions) {
        match self {
            ConnectionStatus::Connecting => (
                rust_i18n::t!("status_connecting").to_string(),
                DisplayStatusOptions::SHOW_PROGRESS | DisplayStatusOptions::SHOW_DISCONNECT_BUTTON,
            ),
            ConnectionStatus::Connected => (
                rust_i18n::t!("status_connected").to_string(),
                DisplayStatusOptions::SHOW_DISCONNECT_BUTTON,
            ),
            ConnectionStatus::Failed(failure) => {
                (failure.status_text(), DisplayStatusOptions::SHOW_RETRY_BUTTON)
            }
            ConnectionStatus::Closed => (String::new(), DisplayStatusOptions::NONE),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Failed(failure) => write!(f, "Failed: {}", failure),
            ConnectionStatus::Closed => write!(f, "Closed"),
        }
    }
}
