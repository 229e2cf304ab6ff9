//! Settings loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerSettings;

/// Error type for settings loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load settings from a TOML file.
///
/// Missing keys fall back to their defaults; values are not range-checked.
pub fn load_settings(path: &Path) -> Result<ServerSettings, ConfigError> {
    let content = fs::read_to_string(path)?;
    let settings: ServerSettings = toml::from_str(&content)?;

    tracing::debug!(path = %path.display(), "Settings loaded");

    Ok(settings)
}
