//! Settings and configuration module

pub mod config;
pub mod state;

pub use config::{AppConfig, ConfigManager};
pub use state::{PersistedSettings, StateStore};
