//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle transitions and faults produce:
//!     → logging.rs (structured log events, level from options or RUST_LOG)
//!     → metrics.rs (start/stop/fault counters, started gauge)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every event carries the server name as a field
//! - Metrics are recorded through the `metrics` facade; without an
//!   installed exporter they are no-ops

pub mod logging;
pub mod metrics;
