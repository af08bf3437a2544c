//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Manifest server entry
//!     → listener.rs (resolve host, bind TCP listener)
//!     → axum::serve (HTTP/1.1, graceful shutdown on drain)
//!     → connection.rs (in-flight request tracking)
//! ```
//!
//! # Design Decisions
//! - Listeners are bound on every start and released on every stop;
//!   the composed router is reused
//! - In-flight requests are tracked so a timed-out drain can report
//!   what it cut off

pub mod connection;
pub mod listener;
