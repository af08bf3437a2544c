//! The server lifecycle manager.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pluggable_server::ServerLifecycleManager;
//! use serde_json::json;
//!
//! let server = ServerLifecycleManager::builder(json!({
//!     "pack": {},
//!     "servers": [{ "port": 8000 }],
//!     "plugins": { "health": {} }
//! }))
//! .name("api")
//! .auto_start(false)
//! .build()?;
//!
//! server.start().await?;
//! server.stop().await;
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::composer::{Composer, HttpComposer, PluginRegistry};
use crate::config::validation::validate_options;
use crate::config::{FileResolver, LogLevel, ManagerOptions, Manifest, ManifestResolver, ManifestSource};
use crate::error::{ConfigurationError, LifecycleError};
use crate::lifecycle::fault::{process_exit, ExitHandler, FaultBoundary};
use crate::lifecycle::signals::{SignalDispatcher, SignalGuard};
use crate::lifecycle::state::{LifecycleEvent, LifecycleState};
use crate::observability::metrics;

/// Invoked after every `start` call with its outcome.
pub type StartCallback = Arc<dyn Fn(Result<(), LifecycleError>) + Send + Sync>;

/// Invoked after every `stop` call.
pub type StopCallback = Arc<dyn Fn() + Send + Sync>;

const EVENT_CAPACITY: usize = 16;

/// Time allowed on top of the drain timeout before a signal or fault
/// triggered shutdown gives up and exits anyway.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Start/stop state machine around a composed server.
///
/// Cheap to clone; clones share the same instance. When the last handle is
/// dropped while started, the server is halted synchronously.
#[derive(Clone)]
pub struct ServerLifecycleManager {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    stop_timeout: Duration,
    log_level: LogLevel,
    handle_signals: bool,
    manifest: Value,
    on_start: Option<StartCallback>,
    on_stop: Option<StopCallback>,
    exit: ExitHandler,
    signals: SignalDispatcher,
    events: broadcast::Sender<LifecycleEvent>,
    core: Mutex<Core>,
}

/// Everything a transition mutates. Guarded by one async mutex.
struct Core {
    state: LifecycleState,
    start_count: u64,
    composed: bool,
    composer: Box<dyn Composer>,
    boundary: Option<FaultBoundary>,
    signals: Option<SignalGuard>,
}

impl ServerLifecycleManager {
    /// Start building a manager for the given manifest source.
    pub fn builder(manifest: impl Into<ManifestSource>) -> ManagerBuilder {
        ManagerBuilder::new(manifest)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Upper bound on connection draining during stop.
    pub fn stop_timeout(&self) -> Duration {
        self.shared.stop_timeout
    }

    /// Validated verbosity. The manager never installs a subscriber; the
    /// embedding application applies this level, e.g. with
    /// `observability::logging::init(server.log_level())`.
    pub fn log_level(&self) -> LogLevel {
        self.shared.log_level
    }

    /// The resolved manifest value.
    pub fn manifest(&self) -> &Value {
        &self.shared.manifest
    }

    pub async fn state(&self) -> LifecycleState {
        self.shared.core.lock().await.state
    }

    /// Number of successful starts.
    pub async fn start_count(&self) -> u64 {
        self.shared.core.lock().await.start_count
    }

    pub async fn is_composed(&self) -> bool {
        self.shared.core.lock().await.composed
    }

    /// Addresses being served; empty unless started.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.shared.core.lock().await.composer.local_addrs()
    }

    /// Subscribe to `Started`/`Stopped` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.events.subscribe()
    }

    /// Start the server.
    ///
    /// Composes on the first successful call. Starting an already started
    /// server is a no-op; starting a terminated one fails.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let result = {
            let mut core = self.shared.core.lock().await;
            match core.state {
                LifecycleState::Started => {
                    info!(server = %self.name(), "Server is already started");
                    Ok(())
                }
                LifecycleState::Terminated => Err(LifecycleError::Restart {
                    name: self.shared.name.clone(),
                }),
                LifecycleState::Stopped => self.start_stopped(&mut core).await,
            }
        };

        if let Err(e) = &result {
            match e {
                LifecycleError::Composition(_) => {
                    error!(server = %self.name(), error = %e, "Failed composing server")
                }
                _ => error!(server = %self.name(), error = %e, "Failed starting server"),
            }
        }

        if let Some(callback) = &self.shared.on_start {
            let callback = Arc::clone(callback);
            let outcome = result.clone();
            tokio::spawn(async move { callback(outcome) });
        }
        tokio::task::yield_now().await;
        result
    }

    /// Stop the server, draining connections for at most the stop timeout.
    ///
    /// Stopping a server that is not started is a no-op.
    pub async fn stop(&self) {
        self.stop_inner(false).await;
        self.after_stop().await;
    }

    /// Stop the server and refuse any further start.
    pub async fn terminate(&self) {
        self.stop_inner(true).await;
        self.after_stop().await;
    }

    async fn start_stopped(&self, core: &mut Core) -> Result<(), LifecycleError> {
        debug!(server = %self.name(), "Starting server");

        if !core.composed {
            let manifest = Manifest::from_value(&self.shared.manifest)?;
            core.composer.compose(&manifest).await?;
            core.composed = true;
            info!(server = %self.name(), "Server is composed");
        }

        let boundary = self.fault_boundary();
        if let Err(e) = core.composer.start(&boundary).await {
            boundary.dispose();
            return Err(e);
        }

        core.state = LifecycleState::Started;
        core.start_count += 1;
        core.boundary = Some(boundary);
        if self.shared.handle_signals {
            core.signals = Some(self.signal_guard());
        }

        let pid = std::process::id();
        info!(
            pid,
            server = %self.name(),
            start_count = core.start_count,
            "Server started"
        );
        metrics::record_started(self.name());
        let _ = self.shared.events.send(LifecycleEvent::Started {
            pid,
            name: self.shared.name.clone(),
            start_count: core.start_count,
        });

        Ok(())
    }

    async fn stop_inner(&self, terminate: bool) {
        let mut core = self.shared.core.lock().await;

        if core.state == LifecycleState::Started {
            info!(server = %self.name(), "Stopping server");
            core.composer.stop(self.shared.stop_timeout).await;
            core.state = LifecycleState::Stopped;
            info!(server = %self.name(), "Server stopped");
            let _ = self.shared.events.send(LifecycleEvent::Stopped);

            if let Some(boundary) = core.boundary.take() {
                boundary.dispose();
            }
            core.signals = None;
            metrics::record_stopped(self.name());
        } else {
            debug!(server = %self.name(), state = %core.state, "Server is already stopped");
        }

        if terminate && core.state != LifecycleState::Terminated {
            core.state = LifecycleState::Terminated;
            info!(server = %self.name(), "Server terminated");
        }
    }

    async fn after_stop(&self) {
        if let Some(callback) = &self.shared.on_stop {
            let callback = Arc::clone(callback);
            tokio::spawn(async move { callback() });
        }
        tokio::task::yield_now().await;
    }

    fn fault_boundary(&self) -> FaultBoundary {
        let owner = Arc::downgrade(&self.shared);
        let exit = Arc::clone(&self.shared.exit);
        FaultBoundary::new(self.shared.name.clone(), move |_fault| {
            terminate_then_exit(owner, exit, 1)
        })
    }

    fn signal_guard(&self) -> SignalGuard {
        let owner = Arc::downgrade(&self.shared);
        let exit = Arc::clone(&self.shared.exit);
        self.shared
            .signals
            .install(move |_signal| terminate_then_exit(owner, exit, 0))
    }
}

/// Best-effort bounded terminate of the owner, then exit with `code`.
async fn terminate_then_exit(owner: Weak<Shared>, exit: ExitHandler, code: i32) {
    if let Some(shared) = owner.upgrade() {
        let manager = ServerLifecycleManager { shared };
        let limit = manager.stop_timeout() + EXIT_GRACE;
        info!(server = %manager.name(), code, "Shutting down before exit");

        if tokio::time::timeout(limit, manager.terminate()).await.is_err() {
            warn!(server = %manager.name(), "Stop did not complete in time");
        }
    }
    exit(code);
}

impl fmt::Debug for ServerLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerLifecycleManager")
            .field("name", &self.shared.name)
            .field("stop_timeout", &self.shared.stop_timeout)
            .field("handle_signals", &self.shared.handle_signals)
            .finish_non_exhaustive()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if core.state == LifecycleState::Started {
            warn!(server = %self.name, "Server dropped while started, halting");
            core.composer.halt();
        }
    }
}

// =============================================================================
// ManagerBuilder
// =============================================================================

/// Builder for a `ServerLifecycleManager`.
///
/// All validation happens in [`ManagerBuilder::build`]; nothing is deferred
/// to `start`.
pub struct ManagerBuilder {
    manifest: ManifestSource,
    options: ManagerOptions,
    composer: Option<Box<dyn Composer>>,
    resolver: Box<dyn ManifestResolver>,
    on_start: Option<StartCallback>,
    on_stop: Option<StopCallback>,
    exit: ExitHandler,
    signals: SignalDispatcher,
}

impl ManagerBuilder {
    pub fn new(manifest: impl Into<ManifestSource>) -> Self {
        Self {
            manifest: manifest.into(),
            options: ManagerOptions::default(),
            composer: None,
            resolver: Box::new(FileResolver::new()),
            on_start: None,
            on_stop: None,
            exit: process_exit(),
            signals: SignalDispatcher::process(),
        }
    }

    /// Replace every option at once, e.g. from an options file.
    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Start once from `build()` (default: true). Requires a tokio runtime.
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.options.auto_start = auto_start;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.options.stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn stop_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.stop_timeout_ms = timeout_ms;
        self
    }

    /// Verbosity reported by [`ServerLifecycleManager::log_level`].
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.options.log_level = level.to_string();
        self
    }

    /// Own process signal handling (default: true).
    pub fn handle_signals(mut self, handle: bool) -> Self {
        self.options.handle_signals = handle;
        self
    }

    /// Use the axum composer with this plugin registry.
    pub fn plugins(mut self, registry: PluginRegistry) -> Self {
        self.composer = Some(Box::new(HttpComposer::new(registry)));
        self
    }

    /// Use a custom composer.
    pub fn composer(mut self, composer: impl Composer + 'static) -> Self {
        self.composer = Some(Box::new(composer));
        self
    }

    /// Resolver for `ManifestSource::Reference` (default: files).
    pub fn resolver(mut self, resolver: impl ManifestResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(Result<(), LifecycleError>) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_stop<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(callback));
        self
    }

    /// Replace `std::process::exit` for signal and fault shutdowns.
    pub fn exit_handler<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(exit);
        self
    }

    /// Route signals through `dispatcher` instead of the process-wide one.
    pub fn signal_dispatcher(mut self, dispatcher: SignalDispatcher) -> Self {
        self.signals = dispatcher;
        self
    }

    /// Validate options, resolve the manifest and, with `auto_start`, start.
    pub fn build(self) -> Result<ServerLifecycleManager, ConfigurationError> {
        let name = self.options.name.clone();
        let logged = |e: ConfigurationError| {
            error!(server = %name, error = %e, "Invalid server configuration");
            e
        };

        let log_level = validate_options(&self.options)
            .map_err(ConfigurationError::Invalid)
            .map_err(logged)?;

        let runtime = if self.options.auto_start {
            Some(
                tokio::runtime::Handle::try_current()
                    .map_err(|_| ConfigurationError::NoRuntime)
                    .map_err(logged)?,
            )
        } else {
            None
        };

        let manifest = self.manifest.resolve(self.resolver.as_ref()).map_err(logged)?;
        debug!(server = %name, manifest = %manifest, "Manifest resolved");

        let composer = self
            .composer
            .unwrap_or_else(|| Box::new(HttpComposer::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = ServerLifecycleManager {
            shared: Arc::new(Shared {
                name: name.clone(),
                stop_timeout: Duration::from_millis(self.options.stop_timeout_ms),
                log_level,
                handle_signals: self.options.handle_signals,
                manifest,
                on_start: self.on_start,
                on_stop: self.on_stop,
                exit: self.exit,
                signals: self.signals,
                events,
                core: Mutex::new(Core {
                    state: LifecycleState::Stopped,
                    start_count: 0,
                    composed: false,
                    composer,
                    boundary: None,
                    signals: None,
                }),
            }),
        };

        if let Some(runtime) = runtime {
            debug!(server = %name, "Auto starting");
            let server = manager.clone();
            runtime.spawn(async move {
                let _ = server.start().await;
            });
        }

        Ok(manager)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Value {
        json!({ "servers": [{ "port": 0 }], "plugins": {} })
    }

    #[test]
    fn builder_applies_options() {
        let server = ServerLifecycleManager::builder(manifest())
            .name("api")
            .auto_start(false)
            .stop_timeout(Duration::from_millis(250))
            .log_level(LogLevel::Debug)
            .build()
            .unwrap();

        assert_eq!(server.name(), "api");
        assert_eq!(server.stop_timeout(), Duration::from_millis(250));
        assert_eq!(server.log_level(), LogLevel::Debug);
        assert_eq!(server.manifest(), &manifest());
    }

    #[test]
    fn options_file_values_are_validated() {
        let options = ManagerOptions {
            name: String::new(),
            log_level: "LOUD".to_string(),
            auto_start: false,
            ..ManagerOptions::default()
        };
        let err = ServerLifecycleManager::builder(manifest())
            .options(options)
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::Invalid(ref errors) if errors.len() == 2));
    }

    #[test]
    fn unbounded_stop_timeout_is_accepted() {
        let server = ServerLifecycleManager::builder(manifest())
            .auto_start(false)
            .stop_timeout_ms(u64::MAX)
            .build()
            .unwrap();

        assert_eq!(server.stop_timeout(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn defaults_name_the_server() {
        let server = ServerLifecycleManager::builder(manifest())
            .auto_start(false)
            .build()
            .unwrap();

        assert_eq!(server.name(), "default-server");
        assert_eq!(server.log_level(), LogLevel::Warn);
    }

    #[tokio::test]
    async fn new_instance_is_stopped_and_uncomposed() {
        let server = ServerLifecycleManager::builder(manifest())
            .auto_start(false)
            .build()
            .unwrap();

        assert_eq!(server.state().await, LifecycleState::Stopped);
        assert_eq!(server.start_count().await, 0);
        assert!(!server.is_composed().await);
        assert!(server.local_addrs().await.is_empty());
    }

    #[tokio::test]
    async fn stop_before_start_still_notifies() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let server = ServerLifecycleManager::builder(manifest())
            .auto_start(false)
            .on_stop(move || {
                let _ = tx.send(());
            })
            .build()
            .unwrap();
        let mut events = server.subscribe();

        server.stop().await;
        assert_eq!(server.state().await, LifecycleState::Stopped);
        assert!(rx.recv().await.is_some());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn debug_shows_identity() {
        let server = ServerLifecycleManager::builder(manifest())
            .name("api")
            .auto_start(false)
            .build()
            .unwrap();
        assert!(format!("{server:?}").contains("\"api\""));
    }
}
