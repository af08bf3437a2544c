//! Lifecycle management for pluggable HTTP servers.
//!
//! A `ServerLifecycleManager` owns one server described by a manifest:
//! it composes the server from plugins once, then starts and stops it on
//! demand, supervises its tasks and shuts it down on process signals.

pub mod composer;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugins;

pub use composer::{Composer, HttpComposer, Plugin, PluginContext, PluginRegistry};
pub use config::{LogLevel, ManagerOptions, Manifest, ManifestSource};
pub use error::{BoxError, CompositionError, ConfigurationError, FaultBoundaryError, LifecycleError};
pub use lifecycle::{LifecycleEvent, LifecycleState, ManagerBuilder, ServerLifecycleManager};
