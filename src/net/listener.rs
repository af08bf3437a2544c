//! Listener binding for manifest server entries.
//!
//! # Responsibilities
//! - Resolve a `ServerBinding` to a socket address
//! - Bind the TCP listener
//! - Report bind failures with the offending address

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener};

use crate::config::ServerBinding;
use crate::error::SharedIoError;

/// Error type for listener operations.
#[derive(Debug, Clone)]
pub enum ListenerError {
    /// The configured host/port did not resolve to an address.
    Resolve { address: String, source: SharedIoError },
    /// Failed to bind to address.
    Bind { address: String, source: SharedIoError },
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::Resolve { address, source } => {
                write!(f, "failed to resolve {}: {}", address, source)
            }
            ListenerError::Bind { address, source } => {
                write!(f, "failed to bind {}: {}", address, source)
            }
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind the listener for one manifest server entry.
///
/// Returns the listener with the address it actually bound (port 0 is
/// replaced by the ephemeral port).
pub async fn bind(binding: &ServerBinding) -> Result<(TcpListener, SocketAddr), ListenerError> {
    let address = binding.address();

    let addr: SocketAddr = lookup_host(&address)
        .await
        .map_err(|e| ListenerError::Resolve {
            address: address.clone(),
            source: Arc::new(e),
        })?
        .next()
        .ok_or_else(|| ListenerError::Resolve {
            address: address.clone(),
            source: Arc::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses found",
            )),
        })?;

    let bind_error = |e: std::io::Error| ListenerError::Bind {
        address: address.clone(),
        source: Arc::new(e),
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(
        address = %local_addr,
        labels = ?binding.options.labels,
        "Listener bound"
    );

    Ok((listener, local_addr))
}
