mod model;
mod raw;

use std::path::{Path, PathBuf};

pub use model::{Config, ControlConfig, DependencyConfig};

/// File names probed in the working directory when no path is given.
pub const DEFAULT_FILENAMES: [&str; 2] = ["tandem.toml", ".tandem.toml"];

/// Error type for configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "toml")]
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error(s): {0}")]
    Validation(String),
}

/// Resolve the configuration path, falling back to the default file names.
#[must_use]
pub fn resolve_path(file: Option<&str>) -> PathBuf {
    if let Some(file) = file {
        return PathBuf::from(file);
    }
    DEFAULT_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILENAMES[0]))
}

/// Load a configuration from a file path.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration file cannot be read or parsed.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_auto(&text, path)
}

/// Parse a configuration from a string, picking the format by extension.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
pub fn parse_auto(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml")]
        "toml" => parse_toml(text),
        _ => Err(ConfigError::Validation("unknown config extension".into())),
    }
}

/// Parse a configuration from a TOML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
#[cfg(feature = "toml")]
pub fn parse_toml(config: &str) -> Result<Config, ConfigError> {
    let raw = toml::from_str::<raw::RawConfig>(config)?;
    raw.try_into()
}
