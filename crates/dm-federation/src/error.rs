//! Federation error types.
//!
//! Every variant names the phase that failed so callers can tell a
//! configuration problem (bad bind account, bad filter) from a transient
//! network problem.
//!
//! A wrong password is *not* an error: it is reported as
//! [`AuthOutcome::Rejected`](crate::provider::AuthOutcome::Rejected).
//! Error messages must never carry passwords.

use thiserror::Error;

/// Errors that can occur during federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Invalid directory configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dial or transport failure talking to the directory.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS handshake or StartTLS upgrade failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The service account bind was rejected.
    #[error("Service bind rejected: {0}")]
    Bind(String),

    /// A search failed (invalid filter, unknown base DN, server error).
    #[error("Directory search failed: {0}")]
    Search(String),

    /// A directory operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The identity sink failed to persist an entry.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected protocol response.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl FederationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a search error.
    #[must_use]
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Checks if this is a transport-level error (dial, TLS, timeout).
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_) | Self::Timeout(_))
    }

    /// Checks if this error most likely means the configuration is wrong.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Bind(_))
    }

    /// Checks if this is a search error.
    #[must_use]
    pub const fn is_search_error(&self) -> bool {
        matches!(self, Self::Search(_))
    }

    /// Short name of the phase that failed, for logs and reports.
    #[must_use]
    pub const fn phase(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connection(_) | Self::Tls(_) | Self::Timeout(_) => "connect",
            Self::Bind(_) => "bind",
            Self::Search(_) => "search",
            Self::Storage(_) => "store",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
