//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Construction (manager.rs, ManagerBuilder::build):
//!     Validate options → Resolve manifest source → [auto start]
//!
//! Start (manager.rs):
//!     Stopped → [compose once] → fault boundary → composer.start
//!     → Started, STARTED event, signal guard installed
//!
//! Stop (manager.rs):
//!     Started → composer.stop(drain timeout) → Stopped, STOPPED event
//!     → fault boundary disposed, signal guard dropped
//!
//! Faults (fault.rs):
//!     supervised task error/panic → log → terminate → exit(1)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → owning servers: terminate → exit(0)
//!                    → no owner: exit(130 / 143)
//! ```
//!
//! # Design Decisions
//! - Transitions are serialized per instance; no two run concurrently
//! - A stopped server may be started again; only `terminate` is final
//! - Results are never observed synchronously: every operation yields
//!   before returning and callbacks run on their own task

pub mod fault;
pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use fault::{process_exit, ExitHandler, FaultBoundary};
pub use manager::{ManagerBuilder, ServerLifecycleManager, StartCallback, StopCallback};
pub use shutdown::DrainSignal;
pub use signals::{process_signals, ShutdownSignal, SignalDispatcher, SignalGuard, SignalSource};
pub use state::{LifecycleEvent, LifecycleState};
