//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{LogLevel, ManagerOptions};
use crate::config::validation::{validate_options, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Document formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Pick a format from the file extension. Anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        }
    }
}

/// Parse a document into a structured value.
pub fn parse_value(content: &str, format: Format) -> Result<serde_json::Value, ConfigError> {
    match format {
        Format::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
    }
}

/// Load a TOML or JSON file as a structured value.
pub fn load_value(path: &Path) -> Result<serde_json::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_value(&content, Format::from_path(path))
}

/// Load and validate manager options from a TOML file.
pub fn load_options(path: &Path) -> Result<(ManagerOptions, LogLevel), ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let options: ManagerOptions = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let level = validate_options(&options).map_err(ConfigError::Validation)?;

    Ok((options, level))
}
