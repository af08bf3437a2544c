//! Fault boundary for server tasks.
//!
//! # Responsibilities
//! - Run every long-lived server task under supervision
//! - Turn a task error or panic into a `FaultBoundaryError`
//! - Hand the first fault to the configured handler (stop, then exit 1)
//!
//! # Design Decisions
//! - One boundary per start; it is disposed on stop
//! - The fault handler runs on a detached task so disposing the boundary
//!   from inside the handler cannot cancel it
//! - Faults reported after disposal are dropped

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{BoxError, FaultBoundaryError};
use crate::observability::metrics;

/// Called with the process exit status once the boundary gives up.
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit handler that terminates the process.
pub fn process_exit() -> ExitHandler {
    Arc::new(|code| std::process::exit(code))
}

/// Supervisor for the tasks of one running server.
pub struct FaultBoundary {
    name: String,
    faults: mpsc::UnboundedSender<FaultBoundaryError>,
    monitor: JoinHandle<()>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl FaultBoundary {
    /// Create a boundary that calls `on_fault` for the first fault reported.
    pub fn new<F, Fut>(name: impl Into<String>, on_fault: F) -> Self
    where
        F: FnOnce(FaultBoundaryError) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (faults, mut rx) = mpsc::unbounded_channel();

        let monitor_name = name.clone();
        let monitor = tokio::spawn(async move {
            if let Some(fault) = rx.recv().await {
                tracing::error!(
                    server = %monitor_name,
                    error = %fault,
                    "Unexpected error - process will exit"
                );
                metrics::record_fault(&monitor_name);
                tokio::spawn(on_fault(fault));
            }
        });

        Self {
            name,
            faults,
            monitor,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a supervised task.
    ///
    /// The returned handle resolves when the task ends, whatever the outcome;
    /// failures are routed to the boundary rather than to the handle.
    pub fn spawn<Fut>(&self, label: impl Into<String>, task: Fut) -> JoinHandle<()>
    where
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let label = label.into();
        let faults = self.faults.clone();

        let handle = tokio::spawn(async move {
            let fault = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(FaultBoundaryError::TaskFailed {
                    task: label,
                    reason: e.to_string(),
                }),
                Err(panic) => Some(FaultBoundaryError::TaskPanicked {
                    task: label,
                    reason: panic_message(panic.as_ref()),
                }),
            };

            if let Some(fault) = fault {
                let _ = faults.send(fault);
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(handle.abort_handle());
        }
        handle
    }

    /// Stop monitoring and abort anything still running.
    pub fn dispose(self) {
        tracing::debug!(server = %self.name, "Disposing fault boundary");
        self.monitor.abort();
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
