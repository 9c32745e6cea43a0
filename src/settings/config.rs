//! Application configuration and data directory layout

use crate::error::{AppError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current configuration version
pub const CONFIG_VERSION: u32 = 1;

/// Portable mode marker filename
const PORTABLE_MARKER: &str = "portable.txt";

/// Configuration filename
const CONFIG_FILENAME: &str = "config.toml";

/// Session state filename (reconnect list)
const STATE_FILENAME: &str = "AudioPlaybackConnector.json";

/// Directory under %LOCALAPPDATA% used in installed mode
const APP_DATA_DIR: &str = "AudioPlaybackConnector";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version for migration
    #[serde(default = "default_version")]
    pub config_version: u32,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Language override (None = use system locale)
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum log file size in bytes
    #[serde(default = "default_max_log_size")]
    pub max_file_size: u64,

    /// Number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_size() -> u64 {
    2 * 1024 * 1024 // 2MB
}

fn default_max_log_files() -> u32 {
    3
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_file_size: default_max_log_size(),
            max_files: default_max_log_files(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            general: GeneralConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Bring an older config up to the current version
    fn migrate(&mut self) {
        if self.config_version < CONFIG_VERSION {
            info!(
                "Migrating config from version {} to {}",
                self.config_version, CONFIG_VERSION
            );
            self.config_version = CONFIG_VERSION;
        }
    }
}

/// Locates the data directory and loads/saves the configuration
pub struct ConfigManager {
    data_dir: PathBuf,
    is_portable: bool,
}

impl ConfigManager {
    /// Create a new config manager, detecting portable vs installed mode
    pub fn new() -> Result<Self> {
        let (data_dir, is_portable) = Self::detect_data_dir()?;
        Ok(Self {
            data_dir,
            is_portable,
        })
    }

    /// Use an explicit data directory
    pub fn with_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            is_portable: true,
        }
    }

    /// Detect whether we're running in portable mode and get the data directory
    fn detect_data_dir() -> Result<(PathBuf, bool)> {
        let exe_path = std::env::current_exe()
            .map_err(|e| AppError::ConfigError(format!("Could not get exe path: {}", e)))?;
        let exe_dir = exe_path.parent().ok_or_else(|| {
            AppError::ConfigError("Could not get exe directory".to_string())
        })?;

        if exe_dir.join(PORTABLE_MARKER).exists() {
            debug!("Portable mode detected via marker file");
            return Ok((exe_dir.to_path_buf(), true));
        }

        // Running from Program Files indicates installed mode
        let is_program_files = exe_dir
            .to_string_lossy()
            .to_lowercase()
            .contains("program files");

        if is_program_files {
            let app_data = std::env::var("LOCALAPPDATA")
                .map_err(|_| AppError::ConfigError("LOCALAPPDATA not set".to_string()))?;
            let data_dir = PathBuf::from(app_data).join(APP_DATA_DIR);
            fs::create_dir_all(&data_dir)?;
            Ok((data_dir, false))
        } else {
            debug!("Portable mode detected (not in Program Files)");
            Ok((exe_dir.to_path_buf(), true))
        }
    }

    pub fn is_portable(&self) -> bool {
        self.is_portable
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILENAME)
    }

    /// Path of the persisted reconnect list
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILENAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        if self.is_portable {
            self.data_dir.join("logs")
        } else {
            self.data_dir.clone()
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig> {
        let config_path = self.config_path();
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| AppError::ConfigError(format!("Could not read config: {}", e)))?;

        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| AppError::ConfigError(format!("Could not parse config: {}", e)))?;

        if config.config_version < CONFIG_VERSION {
            config.migrate();
            self.save(&config)?;
        }

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let content = toml::to_string_pretty(config)
            .map_err(|e| AppError::ConfigError(format!("Could not serialize config: {}", e)))?;

        let config_path = self.config_path();
        fs::write(&config_path, content)
            .map_err(|e| AppError::ConfigError(format!("Could not write config: {}", e)))?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }
}
