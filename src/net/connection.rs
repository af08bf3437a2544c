//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being served by the composed server
//! - Give each request an id for tracing
//! - Report what was still running when a drain timed out
//! - Cut off in-flight handlers once a drain has timed out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::watch;

/// Global atomic counter for request ids.
/// Relaxed ordering is enough: only uniqueness matters.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedId(u64);

impl TrackedId {
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TrackedId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Tracks in-flight requests across every listener of a composed server.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
    forced: Arc<watch::Sender<bool>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (forced, _) = watch::channel(false);
        Self {
            active: Arc::new(AtomicU64::new(0)),
            forced: Arc::new(forced),
        }
    }

    /// Abort every in-flight handler. New requests are cut off too until `reset`.
    pub fn force_close(&self) {
        self.forced.send_replace(true);
    }

    /// Re-arm the tracker for a new start cycle.
    pub fn reset(&self) {
        self.forced.send_replace(false);
    }

    pub fn is_forced(&self) -> bool {
        *self.forced.borrow()
    }

    /// Record a new request. The returned guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
            id: TrackedId::new(),
        }
    }

    /// Requests currently being served.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held for the duration of one request.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    id: TrackedId,
}

impl InFlightGuard {
    pub fn id(&self) -> TrackedId {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(request = %self.id, "Request finished");
    }
}

/// Axum middleware counting requests for the duration of the handler.
///
/// The handler is dropped if the tracker is forced closed while it runs.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let guard = tracker.track();
    let mut forced = tracker.forced.subscribe();
    tracing::trace!(request = %guard.id(), path = %request.uri().path(), "Request started");

    tokio::select! {
        response = next.run(request) => response,
        true = async { forced.wait_for(|forced| *forced).await.is_ok() } => {
            tracing::warn!(request = %guard.id(), "Request cut off by forced shutdown");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
