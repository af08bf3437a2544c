//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, Router};
use futures_util::stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use pluggable_server::composer::Composer;
use pluggable_server::config::Manifest;
use pluggable_server::error::{BoxError, CompositionError, LifecycleError};
use pluggable_server::lifecycle::{FaultBoundary, ShutdownSignal, SignalDispatcher};
use pluggable_server::{ManagerBuilder, Plugin, PluginRegistry, ServerLifecycleManager};

pub const WAIT: Duration = Duration::from_secs(5);

/// A manifest with one ephemeral-port server and the given plugins.
pub fn manifest(plugins: Value) -> Value {
    json!({
        "pack": { "app": { "env": "test" } },
        "servers": [{ "port": 0 }],
        "plugins": plugins,
    })
}

/// Builder preset for tests: no auto start, no process signals, and an
/// exit handler that records codes instead of exiting.
pub fn builder(manifest: Value, exits: &ExitRecorder) -> ManagerBuilder {
    let recorder = exits.clone();
    ServerLifecycleManager::builder(manifest)
        .name("test-server")
        .auto_start(false)
        .handle_signals(false)
        .plugins(registry())
        .exit_handler(move |code| recorder.record(code))
}

/// Captures exit codes requested by the manager.
#[derive(Clone)]
pub struct ExitRecorder {
    tx: mpsc::UnboundedSender<i32>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<i32>>>,
}

impl ExitRecorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    pub fn record(&self, code: i32) {
        let _ = self.tx.send(code);
    }

    /// Wait for the next exit code.
    pub async fn next(&self) -> Option<i32> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
    }

    /// Whether an exit is requested within `within`.
    pub async fn exited_within(&self, within: Duration) -> bool {
        let mut rx = self.rx.lock().await;
        matches!(tokio::time::timeout(within, rx.recv()).await, Ok(Some(_)))
    }
}

/// A dispatcher fed by the returned sender. Unowned signals exit through
/// `exits`, like owned ones.
pub fn signal_feed(exits: &ExitRecorder) -> (mpsc::UnboundedSender<ShutdownSignal>, SignalDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    let source = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|s| (s, rx)) });
    let recorder = exits.clone();
    let dispatcher = SignalDispatcher::new(Box::pin(source), Arc::new(move |code| recorder.record(code)));
    (tx, dispatcher)
}

/// The built-in plugins plus test plugins:
/// - `slow`: `GET /slow` sleeps for `delay_ms` (default 5000)
/// - `broken_start`: fails its start hook
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins();
    registry.register("slow", |ctx| {
        let delay = ctx.options.get("delay_ms").and_then(Value::as_u64).unwrap_or(5_000);
        Ok(Arc::new(SlowPlugin {
            delay: Duration::from_millis(delay),
        }) as Arc<dyn Plugin>)
    });
    registry.register("broken_start", |_| Ok(Arc::new(BrokenStartPlugin) as Arc<dyn Plugin>));
    registry
}

/// Registry whose `counted` plugin counts factory and hook invocations.
pub fn counting_registry(counts: &Counts) -> PluginRegistry {
    let mut registry = registry();
    let counts = counts.clone();
    registry.register("counted", move |_| {
        counts.composed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountedPlugin {
            counts: counts.clone(),
        }) as Arc<dyn Plugin>)
    });
    registry
}

#[derive(Clone, Default)]
pub struct Counts {
    pub composed: Arc<AtomicUsize>,
    pub started: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl Counts {
    pub fn get(&self) -> (usize, usize, usize) {
        (
            self.composed.load(Ordering::SeqCst),
            self.started.load(Ordering::SeqCst),
            self.stopped.load(Ordering::SeqCst),
        )
    }
}

struct SlowPlugin {
    delay: Duration,
}

#[async_trait]
impl Plugin for SlowPlugin {
    fn router(&self) -> Router {
        let delay = self.delay;
        Router::new().route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
    }
}

struct BrokenStartPlugin;

#[async_trait]
impl Plugin for BrokenStartPlugin {
    fn router(&self) -> Router {
        Router::new()
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        Err("database unreachable".into())
    }
}

struct CountedPlugin {
    counts: Counts,
}

#[async_trait]
impl Plugin for CountedPlugin {
    fn router(&self) -> Router {
        Router::new().route("/counted", get(|| async { "counted" }))
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        self.counts.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_stop(&self) {
        self.counts.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a `FaultyComposer` worker ends.
#[derive(Clone, Copy)]
pub enum Failure {
    Error,
    Panic,
}

/// Composer whose only task fails shortly after start.
pub struct FaultyComposer {
    pub failure: Failure,
    pub after: Duration,
}

#[async_trait]
impl Composer for FaultyComposer {
    async fn compose(&mut self, _manifest: &Manifest) -> Result<(), CompositionError> {
        Ok(())
    }

    async fn start(&mut self, boundary: &FaultBoundary) -> Result<(), LifecycleError> {
        let failure = self.failure;
        let after = self.after;
        boundary.spawn("worker", async move {
            tokio::time::sleep(after).await;
            match failure {
                Failure::Error => Err::<(), BoxError>("worker crashed".into()),
                Failure::Panic => panic!("worker exploded"),
            }
        });
        Ok(())
    }

    async fn stop(&mut self, _timeout: Duration) {}
}

/// The first address a started manager serves on.
pub async fn address(server: &ServerLifecycleManager) -> SocketAddr {
    server.local_addrs().await[0]
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(WAIT)
        .build()
        .unwrap()
}
