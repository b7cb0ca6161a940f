//! Transport sessions to the directory server.
//!
//! A [`Dialer`] opens a [`DirectorySession`]: a raw, not yet bound
//! transport that can bind, search and unbind. The production pair is
//! [`Ldap3Dialer`] / [`Ldap3Session`] on top of `ldap3`; anything else
//! (tests, alternative clients) plugs in behind the same traits.
//!
//! Every operation is bounded: the dial and TLS handshake by the
//! configured connection timeout, each bind/search/unbind by the
//! operation timeout.

use std::time::Duration;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry};

use crate::config::{EncryptionType, LdapConfig, SearchScope};
use crate::error::{LdapError, LdapResult, Phase};
use crate::search::LdapEntry;

/// LDAP result code: success.
pub const RC_SUCCESS: u32 = 0;
/// LDAP result code: sizeLimitExceeded.
pub const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
/// LDAP result code: referral.
pub const RC_REFERRAL: u32 = 10;
/// LDAP result code: constraintViolation.
pub const RC_CONSTRAINT_VIOLATION: u32 = 19;
/// LDAP result code: noSuchObject.
pub const RC_NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code: inappropriateAuthentication.
pub const RC_INAPPROPRIATE_AUTHENTICATION: u32 = 48;
/// LDAP result code: invalidCredentials.
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code: insufficientAccessRights.
pub const RC_INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
/// LDAP result code: unwillingToPerform.
pub const RC_UNWILLING_TO_PERFORM: u32 = 53;

/// Server answer to a simple bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindStatus {
    /// The bind succeeded.
    Accepted,

    /// The server answered with a non-success result code.
    Rejected {
        /// LDAP result code.
        code: u32,
        /// Diagnostic message from the server.
        message: String,
    },
}

/// A live transport to a directory server.
///
/// Implementations must treat a transport failure as an `Err` and a
/// server-side refusal of a bind as `Ok(BindStatus::Rejected { .. })`.
#[allow(async_fn_in_trait)]
pub trait DirectorySession: Send {
    /// Performs a simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> LdapResult<BindStatus>;

    /// Runs a search and returns the matching entries.
    ///
    /// A missing base DN is [`LdapError::NoSuchObject`]; zero matches is
    /// an empty vector.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> LdapResult<Vec<LdapEntry>>;

    /// Unbinds and closes the transport.
    async fn unbind(&mut self) -> LdapResult<()>;

    /// Releases the transport without waiting, from a synchronous context.
    fn abandon(&mut self);
}

/// Opens sessions to the server described by a configuration.
#[allow(async_fn_in_trait)]
pub trait Dialer: Send + Sync {
    /// Session type produced by this dialer.
    type Session: DirectorySession;

    /// Opens a transport, negotiating encryption per configuration.
    async fn dial(&self, config: &LdapConfig) -> LdapResult<Self::Session>;
}

// ============================================================================
// ldap3 implementation
// ============================================================================

/// Dialer backed by the async `ldap3` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Dialer;

impl Dialer for Ldap3Dialer {
    type Session = Ldap3Session;

    async fn dial(&self, config: &LdapConfig) -> LdapResult<Ldap3Session> {
        let url = config.url();
        let encryption = config.encryption_type;

        if !encryption.is_encrypted() {
            tracing::warn!(
                url = %url,
                "LDAP connection is not encrypted, credentials are sent in cleartext"
            );
        }
        if encryption.is_encrypted() && !config.validate_certificates {
            tracing::warn!(url = %url, "LDAP server certificate validation is disabled");
        }

        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.connection_timeout)
            .set_starttls(encryption == EncryptionType::StartTls)
            .set_no_tls_verify(!config.validate_certificates);

        tracing::debug!(url = %url, ?encryption, "Connecting to LDAP server");

        let (conn, ldap) = tokio::time::timeout(
            config.connection_timeout,
            LdapConnAsync::with_settings(settings, &url),
        )
        .await
        .map_err(|_| LdapError::Timeout(Phase::Connect))?
        .map_err(|e| classify_connect_error(e, encryption))?;

        // The async client needs its driver polled for the connection's lifetime.
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Ldap3Session {
            ldap,
            operation_timeout: config.operation_timeout,
        })
    }
}

/// Maps a dial failure to the error of the phase that failed.
///
/// Under StartTLS every failure after the TCP connect is an upgrade
/// failure; the connection is never continued in plaintext.
fn classify_connect_error(err: ldap3::LdapError, encryption: EncryptionType) -> LdapError {
    match (&err, encryption) {
        (ldap3::LdapError::Timeout { .. }, _) => LdapError::Timeout(Phase::Connect),
        (ldap3::LdapError::Io { .. }, _) => LdapError::connection(err.to_string()),
        (_, EncryptionType::StartTls) => LdapError::StartTlsRejected(err.to_string()),
        (_, EncryptionType::Ldaps) => LdapError::tls(err.to_string()),
        (_, EncryptionType::None) => LdapError::connection(err.to_string()),
    }
}

/// Maps a failure while an operation was in flight.
fn classify_operation_error(err: ldap3::LdapError, phase: Phase) -> LdapError {
    match err {
        ldap3::LdapError::Timeout { .. } => LdapError::Timeout(phase),
        ldap3::LdapError::Io { .. } => LdapError::connection(err.to_string()),
        _ if phase == Phase::Search => LdapError::search(err.to_string()),
        _ => LdapError::Protocol(err.to_string()),
    }
}

/// Session on an `ldap3` connection.
pub struct Ldap3Session {
    ldap: Ldap,
    operation_timeout: Duration,
}

impl DirectorySession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> LdapResult<BindStatus> {
        let bind = self.ldap.simple_bind(dn, password);
        let result = tokio::time::timeout(self.operation_timeout, bind)
            .await
            .map_err(|_| LdapError::Timeout(Phase::Bind))?
            .map_err(|e| classify_operation_error(e, Phase::Bind))?;

        if result.rc == RC_SUCCESS {
            Ok(BindStatus::Accepted)
        } else {
            Ok(BindStatus::Rejected {
                code: result.rc,
                message: result.text,
            })
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> LdapResult<Vec<LdapEntry>> {
        let attrs: Vec<&str> = attributes.iter().map(String::as_str).collect();

        let result = tokio::time::timeout(
            self.operation_timeout,
            self.ldap.search(base_dn, scope.to_ldap3(), filter, attrs),
        )
        .await
        .map_err(|_| LdapError::Timeout(Phase::Search))?
        .map_err(|e| classify_operation_error(e, Phase::Search))?;

        let entries = result.0;
        let status = result.1;
        match status.rc {
            RC_SUCCESS => {}
            RC_SIZE_LIMIT_EXCEEDED => {
                tracing::warn!(
                    base_dn = %base_dn,
                    returned = entries.len(),
                    "LDAP size limit exceeded, results are partial"
                );
            }
            RC_REFERRAL => {
                tracing::debug!(
                    base_dn = %base_dn,
                    refs = ?status.refs,
                    "LDAP search returned a referral"
                );
            }
            RC_NO_SUCH_OBJECT => return Err(LdapError::NoSuchObject(base_dn.to_string())),
            rc => {
                return Err(LdapError::search(format!(
                    "result code {rc}: {}",
                    status.text
                )))
            }
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(LdapEntry::from_search_entry)
            .collect())
    }

    async fn unbind(&mut self) -> LdapResult<()> {
        tokio::time::timeout(self.operation_timeout, self.ldap.unbind())
            .await
            .map_err(|_| LdapError::Timeout(Phase::Unbind))?
            .map_err(|e| classify_operation_error(e, Phase::Unbind))
    }

    fn abandon(&mut self) {
        let mut ldap = self.ldap.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = ldap.unbind().await;
            });
        }
    }
}
