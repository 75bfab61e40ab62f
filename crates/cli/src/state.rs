use std::str::FromStr;
use std::{fs, path::PathBuf};

use common::config::ProviderConfig;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "b2up";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Account ID or application key ID
    pub account_id: String,
    pub application_key: String,
    /// Bucket name
    pub bucket: String,
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Authorization endpoint, if not the public B2 one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

impl AppConfig {
    pub fn new(
        account_id: impl Into<String>,
        application_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            application_key: application_key.into(),
            bucket: bucket.into(),
            log_level: None,
            auth_url: None,
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.account_id, &self.application_key, &self.bucket)
    }

    /// The configured log level; unparseable values are ignored.
    pub fn log_level(&self) -> Option<tracing::Level> {
        self.log_level
            .as_deref()
            .and_then(|level| tracing::Level::from_str(level).ok())
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the b2up directory (~/.b2up)
    pub app_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the b2up directory path (custom or default ~/.b2up)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Write a new config directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&app_dir)?;

        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the b2up directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("b2up directory not initialized. Run 'b2up init' first")]
    NotInitialized,

    #[error("b2up directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
