//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak sensitive information like
//! passwords or bind credentials.

use std::fmt;

use dm_federation::FederationError;
use thiserror::Error;

/// Directory operation phase, carried by timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dial, TLS handshake or StartTLS upgrade.
    Connect,
    /// Simple bind.
    Bind,
    /// Search.
    Search,
    /// Unbind.
    Unbind,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Bind => "bind",
            Self::Search => "search",
            Self::Unbind => "unbind",
        })
    }
}

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Dial or transport failure.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// TLS handshake failure.
    #[error("LDAP TLS error: {0}")]
    Tls(String),

    /// The server refused the StartTLS upgrade. The connection is never
    /// continued in plaintext.
    #[error("LDAP StartTLS upgrade rejected: {0}")]
    StartTlsRejected(String),

    /// Service account bind rejected.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// Search operation failed.
    #[error("LDAP search failed: {0}")]
    Search(String),

    /// The search base does not exist.
    #[error("LDAP entry does not exist: {0}")]
    NoSuchObject(String),

    /// An operation exceeded its deadline.
    #[error("LDAP {0} timed out")]
    Timeout(Phase),

    /// The connection is not bound as the service account (closed, or a
    /// service rebind after an end-user bind failed).
    #[error("LDAP connection is not bound as the service account")]
    NotServiceBound,

    /// Unexpected protocol response.
    #[error("LDAP protocol error: {0}")]
    Protocol(String),
}

impl LdapError {
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

    /// Creates a TLS error.
    #[must_use]
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Creates a search error.
    #[must_use]
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Checks if this is a transport-level error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Tls(_)
                | Self::StartTlsRejected(_)
                | Self::Timeout(Phase::Connect)
        )
    }

    /// Checks if this error most likely means the configuration is wrong.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Bind(_))
    }

    /// Phase the error belongs to.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connection(_) | Self::Tls(_) | Self::StartTlsRejected(_) => Some(Phase::Connect),
            Self::Bind(_) | Self::NotServiceBound => Some(Phase::Bind),
            Self::Search(_) | Self::NoSuchObject(_) => Some(Phase::Search),
            Self::Timeout(phase) => Some(*phase),
            Self::Configuration(_) | Self::Protocol(_) => None,
        }
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for FederationError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) => FederationError::Configuration(msg),
            LdapError::Connection(msg) => FederationError::Connection(msg),
            LdapError::Tls(msg) => FederationError::Tls(msg),
            LdapError::StartTlsRejected(_) => FederationError::Tls(err.to_string()),
            LdapError::Bind(msg) => FederationError::Bind(msg),
            LdapError::Search(msg) => FederationError::Search(msg),
            LdapError::NoSuchObject(_) => FederationError::Search(err.to_string()),
            LdapError::Timeout(phase) => FederationError::Timeout(format!("LDAP {phase}")),
            LdapError::NotServiceBound => FederationError::Connection(err.to_string()),
            LdapError::Protocol(msg) => FederationError::Protocol(msg),
        }
    }
}
