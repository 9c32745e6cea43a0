//! Audio Playback Connector Library
//!
//! A Windows tray utility that makes this PC the audio sink for paired
//! Bluetooth devices through `AudioPlaybackConnection`.

// Initialize i18n with locales directory and English fallback
rust_i18n::i18n!("locales", fallback = "en");

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod i18n;
pub mod logging;
pub mod settings;
#[cfg(windows)]
pub mod tray;
#[cfg(windows)]
pub mod winrt;

pub use error::{AppError, Result};
