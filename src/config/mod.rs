//! Configuration and settings management.
//!
//! Settings are stored in the user's config directory as JSON; the default
//! database location lives under the platform data directory.

mod settings;

use std::path::PathBuf;

use directories::ProjectDirs;
use thiserror::Error;

pub use settings::{
    ClassifierSettings, DatabaseSettings, FetchSettings, OAuthClientSettings, Settings,
};

/// Errors that can occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "inlet").ok_or(ConfigError::NoConfigDir)
}

/// Path of the settings file.
pub fn settings_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("settings.json"))
}

/// Default database path, used when settings do not name one.
pub fn default_database_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("inlet.db"))
}

/// Loads settings from disk, falling back to defaults when no file exists.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Persists settings, creating the config directory if needed.
pub fn save_settings(settings: &Settings) -> Result<()> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, contents)?;
    Ok(())
}
