//! Lifecycle states and notifications.

use std::fmt;

/// State of a `ServerLifecycleManager`.
///
/// ```text
/// Stopped ──start──▶ Started ──stop──▶ Stopped
///    │                  │
///    └────terminate─────┴──────────▶ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Started,
    /// Final. `start` fails with a restart error.
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Started => "STARTED",
            LifecycleState::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Notification broadcast to subscribers on each transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started {
        pid: u32,
        name: String,
        start_count: u64,
    },
    Stopped,
}
