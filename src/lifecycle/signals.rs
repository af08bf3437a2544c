//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT (Ctrl+C) and SIGTERM once some server owns signals
//! - Hand each signal to every live owner, on a detached task
//! - Apply the default disposition (exit 130 / 143) when nobody owns it
//! - Deregister an owner when its guard is dropped
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Once Tokio registers a handler the OS default is gone for good, so
//!   one process-wide dispatcher stands in for it
//! - A guard is a per-instance registration token: dropping it removes
//!   exactly this owner and nothing else
//! - The signal source is pluggable so the shutdown path can be exercised
//!   without sending real signals

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::lifecycle::fault::{process_exit, ExitHandler};

/// A termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Exit status of a process killed by this signal (128 + signo).
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Stream of signals feeding a dispatcher.
pub type SignalSource = Pin<Box<dyn Stream<Item = ShutdownSignal> + Send>>;

/// The process termination signals. Must be called within a Tokio runtime.
pub fn process_signals() -> SignalSource {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(interrupt), Ok(terminate)) => Box::pin(stream::unfold(
                (interrupt, terminate),
                |(mut interrupt, mut terminate)| async move {
                    let signal = tokio::select! {
                        Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                        Some(()) = terminate.recv() => ShutdownSignal::Terminate,
                        else => return None,
                    };
                    Some((signal, (interrupt, terminate)))
                },
            )) as SignalSource,
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers");
                Box::pin(stream::pending::<ShutdownSignal>()) as SignalSource
            }
        }
    }

    #[cfg(not(unix))]
    {
        Box::pin(stream::unfold((), |()| async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some((ShutdownSignal::Interrupt, ())),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                    None
                }
            }
        }))
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// For callers that own shutdown themselves instead of registering with a
/// dispatcher. A listener that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("SIGINT"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

type SourceFactory = Box<dyn FnMut() -> Option<SignalSource> + Send>;

static PROCESS: OnceLock<SignalDispatcher> = OnceLock::new();

/// Routes signals to registered owners, or to the default action when
/// there are none.
///
/// The source is only consumed once the first owner registers, so a
/// process that never owns signals keeps the OS defaults.
#[derive(Clone)]
pub struct SignalDispatcher {
    inner: Arc<Dispatcher>,
}

struct Dispatcher {
    fallback: ExitHandler,
    next_id: AtomicU64,
    owners: Mutex<Vec<(u64, oneshot::Sender<ShutdownSignal>)>>,
    feed: Mutex<Feed>,
}

struct Feed {
    factory: SourceFactory,
    pump: Option<JoinHandle<()>>,
}

impl SignalDispatcher {
    /// Dispatcher fed by `source`. Unowned signals call `fallback` with the
    /// signal's exit status.
    pub fn new(source: SignalSource, fallback: ExitHandler) -> Self {
        let mut source = Some(source);
        Self::with_factory(Box::new(move || source.take()), fallback)
    }

    /// The process-wide dispatcher for SIGINT/SIGTERM.
    pub fn process() -> Self {
        PROCESS
            .get_or_init(|| Self::with_factory(Box::new(|| Some(process_signals())), process_exit()))
            .clone()
    }

    fn with_factory(factory: SourceFactory, fallback: ExitHandler) -> Self {
        Self {
            inner: Arc::new(Dispatcher {
                fallback,
                next_id: AtomicU64::new(1),
                owners: Mutex::new(Vec::new()),
                feed: Mutex::new(Feed {
                    factory,
                    pump: None,
                }),
            }),
        }
    }

    /// Register an owner. `on_signal` runs on a detached task for the next
    /// signal, unless the guard is dropped first.
    ///
    /// Must be called within a Tokio runtime.
    pub fn install<F, Fut>(&self, on_signal: F) -> SignalGuard
    where
        F: FnOnce(ShutdownSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_pump();

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.owners().push((id, tx));

        let listener = tokio::spawn(async move {
            if let Ok(signal) = rx.await {
                tokio::spawn(on_signal(signal));
            }
        });

        SignalGuard {
            id,
            dispatcher: Arc::downgrade(&self.inner),
            listener,
        }
    }

    /// Owners currently registered.
    pub fn owner_count(&self) -> usize {
        self.inner.owners().len()
    }

    /// Start consuming the source, again if a previous runtime took the
    /// pump down with it.
    fn ensure_pump(&self) {
        let mut feed = self.inner.feed.lock().unwrap_or_else(PoisonError::into_inner);
        if feed.pump.as_ref().is_some_and(|pump| !pump.is_finished()) {
            return;
        }
        let Some(mut source) = (feed.factory)() else {
            return;
        };

        let dispatcher = Arc::downgrade(&self.inner);
        feed.pump = Some(tokio::spawn(async move {
            while let Some(signal) = source.next().await {
                match dispatcher.upgrade() {
                    Some(dispatcher) => dispatcher.dispatch(signal),
                    None => break,
                }
            }
        }));
    }
}

impl Dispatcher {
    fn owners(&self) -> MutexGuard<'_, Vec<(u64, oneshot::Sender<ShutdownSignal>)>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, signal: ShutdownSignal) {
        let owners = std::mem::take(&mut *self.owners());

        let mut delivered = 0;
        for (_, owner) in owners {
            if owner.send(signal).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            tracing::info!(%signal, "No server owns the signal, exiting");
            (self.fallback)(signal.exit_code());
        } else {
            tracing::info!(%signal, owners = delivered, "Shutdown signal received");
        }
    }

    fn remove(&self, id: u64) {
        self.owners().retain(|(owner, _)| *owner != id);
    }
}

impl fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDispatcher")
            .field("owners", &self.owner_count())
            .finish_non_exhaustive()
    }
}

/// Registration token for one owner.
pub struct SignalGuard {
    id: u64,
    dispatcher: Weak<Dispatcher>,
    listener: JoinHandle<()>,
}

impl fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGuard").field("id", &self.id).finish()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        tracing::debug!(owner = self.id, "Removing signal listener");
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove(self.id);
        }
        self.listener.abort();
    }
}
