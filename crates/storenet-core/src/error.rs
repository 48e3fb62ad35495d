//! Error types for storenet
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for storenet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for storenet
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed CIDR, prefix, MAC address or identifier
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Location, site, connector, LAN or reservation missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate MAC or a site that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// No free reservation slot for a device class
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// No free subnet left in the address plan
    #[error("Address space exhausted: {0}")]
    AddressSpaceExhausted(String),

    /// A remote API answered `success=false` or a non-2xx status
    #[error("Upstream rejected ({service}): {message}")]
    UpstreamRejected {
        /// Remote service name ("fabric", "dns")
        service: String,
        /// Error payload as returned by the service
        message: String,
    },

    /// Remote object is missing structure the local records rely on
    ///
    /// Signals drift between the fabric control plane and the local store.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid settings
    #[error("Config error: {0}")]
    Config(String),

    /// Local store failures
    #[error("Store error: {0}")]
    Store(String),

    /// HTTP transport failures (connection, timeout, unreadable body)
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a capacity error
    pub fn capacity_exceeded(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }

    /// Create an address space exhaustion error
    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::AddressSpaceExhausted(msg.into())
    }

    /// Create an upstream rejection error
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a drift error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a settings error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error came from a remote system rejecting a call
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamRejected { .. } | Self::Http(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_carries_payload() {
        let err = Error::upstream("fabric", r#"[{"code":1002,"message":"bad site"}]"#);
        let text = err.to_string();
        assert!(text.contains("fabric"));
        assert!(text.contains("bad site"));
        assert!(err.is_upstream());
    }

    #[test]
    fn local_errors_are_not_upstream() {
        assert!(!Error::not_found("site").is_upstream());
        assert!(!Error::configuration("no dhcp_server").is_upstream());
    }
}
