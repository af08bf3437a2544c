//! Option validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate required values (name present)
//! - Validate enumerated values (log level)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the options
//! - Runs at construction, before any start

use std::fmt;

use crate::config::schema::{LogLevel, ManagerOptions};

/// A single semantic problem with the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyName,
    UnknownLogLevel(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyName => write!(f, "name must be a non-empty string"),
            ValidationError::UnknownLogLevel(level) => write!(
                f,
                "log_level '{}' is not one of TRACE, DEBUG, INFO, WARN, ERROR",
                level
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate the typed fields shared by the builder and the options file.
///
/// The stop timeout needs no check: any `u64` is a valid number of
/// milliseconds.
pub fn validate_fields(name: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    errors
}

/// Validate options read from a file, returning the parsed log level.
pub fn validate_options(options: &ManagerOptions) -> Result<LogLevel, Vec<ValidationError>> {
    let mut errors = validate_fields(&options.name);

    let level = match options.log_level.parse::<LogLevel>() {
        Ok(level) => Some(level),
        Err(e) => {
            errors.push(ValidationError::UnknownLogLevel(e.0));
            None
        }
    };

    match level {
        Some(level) if errors.is_empty() => Ok(level),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_options(&ManagerOptions::default()), Ok(LogLevel::Warn));
    }

    #[test]
    fn collects_every_error() {
        let options = ManagerOptions {
            name: "   ".to_string(),
            log_level: "chatty".to_string(),
            ..ManagerOptions::default()
        };

        let errors = validate_options(&options).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyName,
                ValidationError::UnknownLogLevel("chatty".to_string()),
            ]
        );
    }

    #[test]
    fn any_timeout_is_allowed() {
        for stop_timeout_ms in [0, 24 * 60 * 60 * 1000 + 1, u64::MAX] {
            let options = ManagerOptions {
                stop_timeout_ms,
                ..ManagerOptions::default()
            };
            assert_eq!(validate_options(&options), Ok(LogLevel::Warn));
        }
    }
}
