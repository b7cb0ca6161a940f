//! Credential authentication by search-then-bind.
//!
//! The login is resolved to exactly one DN on a service-bound connection,
//! the connection binds as that DN with the supplied password, and the
//! service bind is restored afterwards. Zero or several matches fail
//! closed without any bind attempt.

use dm_federation::{AuthOutcome, RejectReason};

use crate::config::LdapConfig;
use crate::connection::LdapConnection;
use crate::error::{LdapError, LdapResult};
use crate::search::FilterExecutor;
use crate::session::{
    BindStatus, DirectorySession, RC_CONSTRAINT_VIOLATION, RC_INAPPROPRIATE_AUTHENTICATION,
    RC_INSUFFICIENT_ACCESS_RIGHTS, RC_INVALID_CREDENTIALS, RC_UNWILLING_TO_PERFORM,
};

/// Rejects credentials that must never reach the server.
///
/// An empty password would be an unauthenticated bind (RFC 4513 5.1.2),
/// which many servers report as a success.
#[must_use]
pub fn precheck(login: &str, password: &str) -> Option<AuthOutcome> {
    if password.is_empty() {
        return Some(AuthOutcome::Rejected(RejectReason::EmptyPassword));
    }
    if login.trim().is_empty() {
        return Some(AuthOutcome::Rejected(RejectReason::UnknownIdentity));
    }
    None
}

/// Verifies a login and password against the directory.
///
/// `conn` must be bound as the service account. A wrong password is
/// `Ok(Rejected(..))`; only transport, search and server failures are
/// errors. The password is never logged.
pub async fn authenticate<S: DirectorySession>(
    conn: &mut LdapConnection<S>,
    config: &LdapConfig,
    login: &str,
    password: &str,
) -> LdapResult<AuthOutcome> {
    if let Some(outcome) = precheck(login, password) {
        return Ok(outcome);
    }
    let login = login.trim();

    let mut matches = FilterExecutor::new(conn, config).find_by_login(login).await?;
    let dn = match matches.len() {
        1 => matches.remove(0).dn,
        0 => {
            tracing::warn!(login = %login, "LDAP login matches no entry");
            return Ok(AuthOutcome::Rejected(RejectReason::UnknownIdentity));
        }
        n => {
            tracing::warn!(
                login = %login,
                matches = n,
                "LDAP login is ambiguous, refusing to bind"
            );
            return Ok(AuthOutcome::Rejected(RejectReason::AmbiguousIdentity { matches: n }));
        }
    };

    let status = conn.bind_end_user(&dn, password).await;

    if let Err(e) = conn.bind_service(config).await {
        tracing::error!(
            error = %e,
            "LDAP service rebind failed after authentication, connection unusable"
        );
    }

    let outcome = match status? {
        BindStatus::Accepted => AuthOutcome::Authenticated { dn },
        BindStatus::Rejected { code, message } => match code {
            RC_INVALID_CREDENTIALS => AuthOutcome::Rejected(RejectReason::InvalidCredential),
            RC_INAPPROPRIATE_AUTHENTICATION
            | RC_INSUFFICIENT_ACCESS_RIGHTS
            | RC_UNWILLING_TO_PERFORM
            | RC_CONSTRAINT_VIOLATION => {
                tracing::debug!(dn = %dn, code, message = %message, "LDAP refused end-user bind");
                AuthOutcome::Rejected(RejectReason::Refused { code })
            }
            code => {
                return Err(LdapError::Bind(format!(
                    "end-user bind failed with result code {code}: {message}"
                )))
            }
        },
    };

    tracing::info!(
        login = %login,
        authenticated = outcome.is_authenticated(),
        "LDAP credential check completed"
    );
    Ok(outcome)
}
