//! Server composition subsystem.
//!
//! # Data Flow
//! ```text
//! Manifest
//!     → compose (once): plugin.rs registry lookup → plugin routers
//!       merged per server binding → server.rs layered axum Router
//!     → start (every cycle): bind listeners → plugin on_start hooks
//!       → serve tasks under the fault boundary
//!     → stop (every cycle): drain with timeout → force close → plugin
//!       on_stop hooks
//! ```
//!
//! # Design Decisions
//! - The lifecycle manager only sees the `Composer` trait
//! - Composition output is kept and reused across start/stop cycles
//! - Every long-lived task is spawned through the fault boundary

pub mod plugin;
pub mod request_id;
pub mod server;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Manifest;
use crate::error::{CompositionError, LifecycleError};
use crate::lifecycle::FaultBoundary;

pub use plugin::{Plugin, PluginContext, PluginFactory, PluginRegistry};
pub use server::HttpComposer;

/// The server framework seen by the lifecycle manager.
#[async_trait]
pub trait Composer: Send {
    /// Build the server from the manifest.
    ///
    /// Called until it succeeds once; a failed call must leave the composer
    /// ready for another attempt.
    async fn compose(&mut self, manifest: &Manifest) -> Result<(), CompositionError>;

    /// Bind listeners and run plugin startup hooks.
    ///
    /// Long-lived tasks must be spawned through `boundary`.
    async fn start(&mut self, boundary: &FaultBoundary) -> Result<(), LifecycleError>;

    /// Drain connections for at most `timeout`, then force the rest closed
    /// and run plugin teardown hooks.
    async fn stop(&mut self, timeout: Duration);

    /// Synchronous best-effort stop, used when the owner goes away while started.
    fn halt(&mut self) {}

    /// Addresses currently being served.
    fn local_addrs(&self) -> Vec<SocketAddr> {
        Vec::new()
    }
}
