//! Axum-backed composer.
//!
//! # Responsibilities
//! - Resolve manifest plugins against the registry
//! - Merge plugin routers per server binding, honoring `select` labels
//! - Wire up middleware (tracing, request id, timeout, in-flight tracking)
//! - Bind and serve on start, drain on stop

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{http::HeaderName, middleware, Router};
use serde_json::Value;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::composer::plugin::{Plugin, PluginContext, PluginRegistry};
use crate::composer::request_id::{UuidRequestId, X_REQUEST_ID};
use crate::composer::Composer;
use crate::config::{Manifest, ServerBinding};
use crate::error::{BoxError, CompositionError, LifecycleError};
use crate::lifecycle::{DrainSignal, FaultBoundary};
use crate::net::connection::{track_in_flight, InFlightTracker};
use crate::net::listener;

/// How long forced-closed handlers get to unwind before tasks are aborted.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Composer hosting plugin routers on axum.
pub struct HttpComposer {
    registry: PluginRegistry,
    composition: Option<Composition>,
    running: Option<Running>,
}

struct SelectedPlugin {
    name: String,
    plugin: Arc<dyn Plugin>,
    /// Server labels the plugin is restricted to. `None` means every server.
    select: Option<Vec<String>>,
}

impl SelectedPlugin {
    fn applies_to(&self, binding: &ServerBinding) -> bool {
        match &self.select {
            None => true,
            Some(labels) => binding.matches_any(labels),
        }
    }
}

struct Composition {
    plugins: Vec<SelectedPlugin>,
    servers: Vec<(ServerBinding, Router)>,
    tracker: InFlightTracker,
}

struct Running {
    drain: DrainSignal,
    tasks: Vec<JoinHandle<()>>,
    addrs: Vec<SocketAddr>,
}

impl HttpComposer {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            composition: None,
            running: None,
        }
    }

    /// Build the layered router for one server binding.
    #[allow(deprecated)]
    fn build_router(router: Router, binding: &ServerBinding, tracker: &InFlightTracker) -> Router {
        let header = HeaderName::from_static(X_REQUEST_ID);

        router
            .layer(middleware::from_fn_with_state(tracker.clone(), track_in_flight))
            .layer(TimeoutLayer::new(Duration::from_secs(binding.options.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::new(header.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(header, UuidRequestId))
    }
}

impl Default for HttpComposer {
    fn default() -> Self {
        Self::new(PluginRegistry::with_builtins())
    }
}

#[async_trait]
impl Composer for HttpComposer {
    async fn compose(&mut self, manifest: &Manifest) -> Result<(), CompositionError> {
        let mut plugins = Vec::with_capacity(manifest.plugins.len());

        for (name, options) in &manifest.plugins {
            let factory = self
                .registry
                .get(name)
                .ok_or_else(|| CompositionError::PluginNotFound(name.clone()))?;
            let select = parse_select(name, options)?;

            let ctx = PluginContext {
                name,
                options,
                app: &manifest.pack.app,
            };
            let plugin = factory(&ctx).map_err(|e| registration_error(name, e.to_string()))?;

            tracing::debug!(plugin = %name, select = ?select, "Plugin registered");
            plugins.push(SelectedPlugin {
                name: name.clone(),
                plugin,
                select,
            });
        }

        let tracker = InFlightTracker::new();
        let mut servers = Vec::with_capacity(manifest.servers.len());

        for binding in &manifest.servers {
            let mut router = Router::new();
            for selected in plugins.iter().filter(|p| p.applies_to(binding)) {
                let routes = selected.plugin.router();
                router = catch_unwind(AssertUnwindSafe(move || router.merge(routes)))
                    .map_err(|_| registration_error(&selected.name, "routes conflict with another plugin"))?;
            }
            servers.push((binding.clone(), Self::build_router(router, binding, &tracker)));
        }

        self.composition = Some(Composition {
            plugins,
            servers,
            tracker,
        });
        Ok(())
    }

    async fn start(&mut self, boundary: &FaultBoundary) -> Result<(), LifecycleError> {
        if self.running.is_some() {
            return Ok(());
        }
        let composition = self.composition.as_ref().ok_or_else(|| {
            CompositionError::InvalidManifest("server has not been composed".to_string())
        })?;

        let mut listeners = Vec::with_capacity(composition.servers.len());
        for (binding, router) in &composition.servers {
            let (listener, addr) = listener::bind(binding).await?;
            listeners.push((listener, addr, router.clone()));
        }

        for (i, selected) in composition.plugins.iter().enumerate() {
            if let Err(e) = selected.plugin.on_start().await {
                tracing::error!(plugin = %selected.name, error = %e, "Plugin failed to start");
                for started in composition.plugins[..i].iter().rev() {
                    started.plugin.on_stop().await;
                }
                return Err(LifecycleError::plugin_start(&selected.name, &e));
            }
        }

        composition.tracker.reset();
        let drain = DrainSignal::new();
        let mut tasks = Vec::with_capacity(listeners.len());
        let mut addrs = Vec::with_capacity(listeners.len());

        for (listener, addr, router) in listeners {
            let shutdown = DrainSignal::wait(drain.subscribe());
            tasks.push(boundary.spawn(format!("listener {addr}"), async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown)
                    .await
                    .map_err(BoxError::from)
            }));
            addrs.push(addr);
        }

        tracing::info!(listeners = ?addrs, plugins = composition.plugins.len(), "Server listening");
        self.running = Some(Running { drain, tasks, addrs });
        Ok(())
    }

    async fn stop(&mut self, timeout: Duration) {
        let Some(running) = self.running.take() else {
            return;
        };
        let Running { drain, mut tasks, addrs } = running;

        drain.trigger();
        if !join_within(&mut tasks, timeout).await {
            let in_flight = self
                .composition
                .as_ref()
                .map(|c| c.tracker.active_count())
                .unwrap_or(0);
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                in_flight,
                "Drain timed out, closing remaining connections"
            );

            if let Some(c) = &self.composition {
                c.tracker.force_close();
            }
            if !join_within(&mut tasks, FORCE_CLOSE_GRACE).await {
                for task in &tasks {
                    task.abort();
                }
            }
        }

        if let Some(c) = &self.composition {
            for selected in c.plugins.iter().rev() {
                selected.plugin.on_stop().await;
            }
        }
        tracing::info!(listeners = ?addrs, "Server drained");
    }

    fn halt(&mut self) {
        if let Some(running) = self.running.take() {
            running.drain.trigger();
            if let Some(c) = &self.composition {
                c.tracker.force_close();
            }
            for task in &running.tasks {
                task.abort();
            }
        }
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .as_ref()
            .map(|r| r.addrs.clone())
            .unwrap_or_default()
    }
}

/// Await tasks until all finish or `limit` elapses. Finished handles are removed.
async fn join_within(tasks: &mut Vec<JoinHandle<()>>, limit: Duration) -> bool {
    tokio::time::timeout(limit, async {
        while let Some(task) = tasks.last_mut() {
            let _ = task.await;
            tasks.pop();
        }
    })
    .await
    .is_ok()
}

/// Read a plugin's optional `select` entry: a label or a list of labels.
fn parse_select(name: &str, options: &Value) -> Result<Option<Vec<String>>, CompositionError> {
    match options.get("select") {
        None => Ok(None),
        Some(Value::String(label)) => Ok(Some(vec![label.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| registration_error(name, "select entries must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(registration_error(name, "select must be a label or a list of labels")),
    }
}

fn registration_error(plugin: &str, reason: impl Into<String>) -> CompositionError {
    CompositionError::PluginRegistration {
        plugin: plugin.to_string(),
        reason: reason.into(),
    }
}
