//! File logging with size-based rotation

use crate::error::{AppError, Result};
use crate::settings::config;
use log::LevelFilter;
use simplelog::{CombinedLogger, ConfigBuilder, SharedLogger, WriteLogger};
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_FILENAME: &str = "audio_playback_connector.log";

/// Logging configuration
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub log_dir: PathBuf,
    pub max_file_size: u64,
    pub max_files: u32,
}

impl LoggingConfig {
    /// Build from the `[logging]` section of the app config
    pub fn from_settings(settings: &config::LoggingConfig, log_dir: PathBuf) -> Self {
        Self {
            level: parse_log_level(&settings.level),
            log_dir,
            max_file_size: settings.max_file_size,
            max_files: settings.max_files.max(1),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            log_dir: PathBuf::from("."),
            max_file_size: 2 * 1024 * 1024,
            max_files: 3,
        }
    }
}

/// Initialize the global logger
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    fs::create_dir_all(&config.log_dir)?;

    let log_path = config.log_dir.join(LOG_FILENAME);
    rotate_logs(&log_path, config.max_file_size, config.max_files)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(AppError::IoError)?;

    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Debug)
        .set_thread_level(LevelFilter::Debug)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    {
        loggers.push(TermLogger::new(
            config.level,
            log_config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }

    loggers.push(WriteLogger::new(config.level, log_config, log_file));

    CombinedLogger::init(loggers)
        .map_err(|e| AppError::ConfigError(format!("Logger init failed: {}", e)))?;

    log::info!("Logging initialized at level {:?}", config.level);
    log::info!("Log file: {:?}", log_path);

    Ok(())
}

/// Shift `name.log` -> `name.log.1` -> ... when the current file is too large
fn rotate_logs(log_path: &Path, max_size: u64, max_files: u32) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let size = fs::metadata(log_path)?.len();
    if size < max_size {
        return Ok(());
    }

    let oldest = log_path.with_extension(format!("log.{}", max_files));
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for i in (1..max_files).rev() {
        let old_name = log_path.with_extension(format!("log.{}", i));
        if old_name.exists() {
            fs::rename(&old_name, log_path.with_extension(format!("log.{}", i + 1)))?;
        }
    }

    fs::rename(log_path, log_path.with_extension("log.1"))?;
    Ok(())
}

/// Parse log level from string
pub fn parse_log_level(level_str: &str) -> LevelFilter {
    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}
