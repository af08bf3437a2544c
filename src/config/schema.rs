//! Configuration schema definitions.
//!
//! Two documents are described here: the plugin `Manifest` that the
//! composer turns into a server, and the `ManagerOptions` that tune the
//! lifecycle manager itself. Both derive Serde traits so they can be read
//! from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CompositionError;

/// Declarative description of server bindings and the plugins to load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Settings shared by every plugin in the pack.
    #[serde(default)]
    pub pack: PackConfig,

    /// Listener bindings. At least one is required.
    pub servers: Vec<ServerBinding>,

    /// Plugin name to plugin options.
    pub plugins: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// Interpret a resolved manifest value.
    ///
    /// Missing `servers` or `plugins` sections, or an empty server list,
    /// are composition failures rather than configuration failures: they
    /// are reported from `start`, not from construction.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CompositionError> {
        let manifest: Manifest = serde_json::from_value(value.clone())
            .map_err(|e| CompositionError::InvalidManifest(e.to_string()))?;

        if manifest.servers.is_empty() {
            return Err(CompositionError::NoServers);
        }

        Ok(manifest)
    }
}

/// Pack-level settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PackConfig {
    /// Free-form application settings visible to plugins.
    pub app: serde_json::Value,
}

/// A single listener the composed server binds on start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerBinding {
    /// Interface to bind (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind. 0 picks an ephemeral port.
    pub port: u16,

    #[serde(default)]
    pub options: ServerOptions,
}

impl ServerBinding {
    /// The `host:port` string handed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True if this binding carries any of the given labels.
    pub fn matches_any(&self, labels: &[String]) -> bool {
        labels.iter().any(|l| self.options.labels.contains(l))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Per-binding server options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Labels used by plugin `select` filters.
    pub labels: Vec<String>,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Options for the lifecycle manager, as read from an options file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Identifier used in logs, notifications and metric labels.
    pub name: String,

    /// Start once at construction.
    pub auto_start: bool,

    /// Upper bound on graceful connection draining, in milliseconds.
    pub stop_timeout_ms: u64,

    /// Verbosity (TRACE, DEBUG, INFO, WARN, ERROR).
    pub log_level: String,

    /// Own process signal handling (only one instance per process should).
    pub handle_signals: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            name: "default-server".to_string(),
            auto_start: true,
            stop_timeout_ms: 5_000,
            log_level: LogLevel::default().to_string(),
            handle_signals: true,
        }
    }
}

/// Log verbosity accepted by the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_directive().to_ascii_uppercase())
    }
}

/// Unrecognized log level name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogLevel(pub String);

impl fmt::Display for UnknownLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}', expected one of TRACE, DEBUG, INFO, WARN, ERROR", self.0)
    }
}

impl std::error::Error for UnknownLogLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}
