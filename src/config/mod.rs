//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! ManifestSource (inline value | reference | generator)
//!     → source.rs (resolve once, at construction)
//!     → loader.rs (references: read TOML/JSON from disk)
//!     → serde_json::Value (must be a mapping)
//!     → schema.rs Manifest (typed on first start, by the composer)
//!
//! Options file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerOptions
//! ```
//!
//! # Design Decisions
//! - Manifest *type* errors fail construction; manifest *content* errors
//!   fail composition, so the instance can be retried
//! - All option fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;

pub use schema::{LogLevel, ManagerOptions, Manifest, ServerBinding, ServerOptions};
pub use source::{FileResolver, ManifestResolver, ManifestSource};
