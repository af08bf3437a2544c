//! Error taxonomy for the lifecycle manager.
//!
//! # Propagation
//! - `ConfigurationError` is returned from construction and never retried.
//! - `CompositionError` surfaces from `start`; the instance stays usable.
//! - `FaultBoundaryError` is fatal to the process.
//! - `LifecycleError` is what `start`/`stop` hand back to callers.
//!
//! Every error is `Clone` so the same value can be returned to the caller
//! and handed to a deferred callback.

use std::sync::Arc;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::net::listener::ListenerError;

/// Boxed error used at collaborator seams (generators, plugin hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid manifest source or option value, raised by `build()`.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// The manifest resolved to something other than a mapping.
    #[error("manifest must be a mapping, an external reference or a generator, but its type is: {0}")]
    InvalidManifestType(&'static str),

    /// A manifest reference could not be found.
    #[error("manifest reference not found: {0}")]
    UnresolvedReference(String),

    /// A manifest reference was found but could not be read or parsed.
    #[error("failed to load manifest '{reference}': {reason}")]
    ManifestLoad { reference: String, reason: String },

    /// The manifest generator returned an error.
    #[error("manifest generator failed: {0}")]
    Generator(String),

    /// One or more options failed validation.
    #[error("invalid options: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    /// `auto_start` was requested outside of a tokio runtime.
    #[error("auto_start requires a running tokio runtime")]
    NoRuntime,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure turning a manifest into a runnable server.
#[derive(Debug, Clone, Error)]
pub enum CompositionError {
    /// The manifest is missing required sections or is malformed.
    #[error("malformed manifest: {0}")]
    InvalidManifest(String),

    /// The manifest declares no server bindings.
    #[error("manifest declares no servers")]
    NoServers,

    /// A manifest entry names a plugin that is not registered.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// A plugin factory rejected its options.
    #[error("plugin '{plugin}' failed to register: {reason}")]
    PluginRegistration { plugin: String, reason: String },
}

/// An unhandled failure inside a supervised server task.
#[derive(Debug, Clone, Error)]
pub enum FaultBoundaryError {
    #[error("task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("task '{task}' panicked: {reason}")]
    TaskPanicked { task: String, reason: String },
}

/// Errors returned by lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// The composed server could not bind its listeners.
    #[error("failed to start server: {0}")]
    Bind(#[from] ListenerError),

    /// A plugin start hook failed.
    #[error("plugin '{plugin}' failed to start: {reason}")]
    PluginStart { plugin: String, reason: String },

    /// `start` was called after the instance terminated.
    #[error("server '{name}' cannot be restarted; create a new instance to start it again in this process")]
    Restart { name: String },
}

impl LifecycleError {
    pub(crate) fn plugin_start(plugin: &str, error: &BoxError) -> Self {
        LifecycleError::PluginStart {
            plugin: plugin.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Shared io error, so listener failures stay `Clone`.
pub type SharedIoError = Arc<std::io::Error>;
