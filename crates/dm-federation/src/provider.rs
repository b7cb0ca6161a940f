//! Directory provider traits.
//!
//! These traits are what the rest of the system sees of a directory
//! backend: a read-only source of normalized entries, and a credential
//! validator with a three-valued outcome.

use serde::{Deserialize, Serialize};

use crate::entry::DirectoryEntry;
use crate::error::FederationResult;

// ============================================================================
// Directory Source
// ============================================================================

/// A read-only source of directory entries.
///
/// ## Implementation Notes
///
/// - Every call opens and releases its own connection
/// - Calls issue read-only traffic and are safe to repeat
/// - Zero matches is `Ok(vec![])`, never an error
#[allow(async_fn_in_trait)]
pub trait DirectorySource: Send + Sync {
    /// Returns the provider type identifier (e.g. "ldap").
    fn provider_type(&self) -> &'static str;

    /// Verifies the directory is reachable and the service account binds.
    async fn test_connection(&self) -> FederationResult<()>;

    /// Runs the user filter and returns the matching users.
    async fn user_entries(&self) -> FederationResult<Vec<DirectoryEntry>>;

    /// Runs the group filter and returns the matching groups.
    async fn group_entries(&self) -> FederationResult<Vec<DirectoryEntry>>;

    /// Runs the group filter and returns the users that are members of
    /// the matching groups.
    async fn group_member_entries(&self) -> FederationResult<Vec<DirectoryEntry>>;
}

// ============================================================================
// Credential Validator
// ============================================================================

/// Why a credential was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// The directory rejected the password.
    InvalidCredential,

    /// An empty password was supplied. It is never sent to the directory.
    EmptyPassword,

    /// No directory entry matches the login.
    UnknownIdentity,

    /// More than one directory entry matches the login.
    AmbiguousIdentity {
        /// Number of matching entries.
        matches: usize,
    },

    /// The directory refused the bind for a reason other than the password
    /// (account disabled, password expired, policy).
    Refused {
        /// LDAP result code.
        code: u32,
    },
}

/// Result of a credential check.
///
/// A rejected credential is a valid answer, not an error: transport and
/// configuration failures travel in the `Err` side of
/// [`FederationResult`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOutcome {
    /// The directory accepted the credential.
    Authenticated {
        /// Distinguished name the login resolved to.
        dn: String,
    },

    /// The credential was not accepted.
    Rejected(RejectReason),
}

impl AuthOutcome {
    /// Returns true if the credential was accepted.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Trait for validating credentials against a directory.
///
/// ## Security
///
/// - The password must never be logged or stored
/// - Failed attempts must not be retried here; retry and lockout policy
///   belong to the caller
#[allow(async_fn_in_trait)]
pub trait CredentialValidator: Send + Sync {
    /// Validates a login and plaintext password.
    async fn validate_credential(&self, login: &str, password: &str)
        -> FederationResult<AuthOutcome>;
}
