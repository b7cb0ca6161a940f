//! LDAP connection management.
//!
//! ## Security Requirements
//!
//! - StartTLS is negotiated before any other traffic; if the server
//!   refuses it the connection fails and is never continued in plaintext.
//! - LDAPS is TLS from the first byte.
//! - A connection tracks whether it is bound as the service account.
//!   Searches are only issued on a service-bound connection.

use crate::config::LdapConfig;
use crate::error::{LdapError, LdapResult};
use crate::session::{BindStatus, Dialer, DirectorySession, Ldap3Dialer, Ldap3Session};

/// Identity a connection is currently bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// Not bound, or a bind failed.
    Unbound,
    /// Bound as the configured service account.
    Service,
    /// Bound (or attempting to bind) as an end user.
    EndUser,
}

/// One live, owned directory connection.
///
/// Release it with [`close`](Self::close). A connection dropped without
/// closing is abandoned: its session is torn down in the background.
pub struct LdapConnection<S: DirectorySession = Ldap3Session> {
    session: Option<S>,
    state: BindState,
}

impl LdapConnection<Ldap3Session> {
    /// Opens a connection with the `ldap3` client and binds as the
    /// service account.
    pub async fn open(config: &LdapConfig) -> LdapResult<Self> {
        Self::establish(&Ldap3Dialer, config).await
    }
}

impl<S: DirectorySession> LdapConnection<S> {
    /// Dials the server and binds as the service account.
    ///
    /// If the bind fails the transport is closed before the error is
    /// returned.
    pub async fn establish<D>(dialer: &D, config: &LdapConfig) -> LdapResult<Self>
    where
        D: Dialer<Session = S>,
    {
        let session = dialer.dial(config).await?;
        let mut conn = Self::from_session(session);

        if let Err(e) = conn.bind_service(config).await {
            tracing::warn!(
                host = %config.server_host,
                bind_dn = %config.bind_dn,
                error = %e,
                "LDAP service bind failed"
            );
            conn.close().await;
            return Err(e);
        }

        tracing::debug!(
            host = %config.server_host,
            port = config.port(),
            encryption = ?config.encryption_type,
            "LDAP connection established"
        );
        Ok(conn)
    }

    /// Wraps an unbound session.
    #[must_use]
    pub fn from_session(session: S) -> Self {
        Self {
            session: Some(session),
            state: BindState::Unbound,
        }
    }

    /// Current bind identity.
    #[must_use]
    pub const fn bind_state(&self) -> BindState {
        self.state
    }

    /// Returns true if service operations may run on this connection.
    #[must_use]
    pub fn is_service_bound(&self) -> bool {
        self.state == BindState::Service && self.session.is_some()
    }

    /// Binds as the configured service account.
    ///
    /// A rejected bind is [`LdapError::Bind`]; transport failures keep
    /// their own variants.
    pub async fn bind_service(&mut self, config: &LdapConfig) -> LdapResult<()> {
        let session = self.session.as_mut().ok_or_else(closed)?;
        self.state = BindState::Unbound;

        tracing::debug!(bind_dn = %config.bind_dn, "Binding as LDAP service account");
        match session
            .simple_bind(&config.bind_dn, &config.bind_password)
            .await?
        {
            BindStatus::Accepted => {
                self.state = BindState::Service;
                Ok(())
            }
            BindStatus::Rejected { code, message } => Err(LdapError::Bind(format!(
                "service account rejected with result code {code}: {message}"
            ))),
        }
    }

    /// Binds as an end user. The connection leaves the service identity
    /// whatever the answer.
    pub(crate) async fn bind_end_user(
        &mut self,
        dn: &str,
        password: &str,
    ) -> LdapResult<BindStatus> {
        let session = self.session.as_mut().ok_or_else(closed)?;
        self.state = BindState::EndUser;
        session.simple_bind(dn, password).await
    }

    /// Session for a service operation.
    pub(crate) fn service_session(&mut self) -> LdapResult<&mut S> {
        if self.state != BindState::Service {
            return Err(LdapError::NotServiceBound);
        }
        self.session.as_mut().ok_or(LdapError::NotServiceBound)
    }

    /// Unbinds and releases the connection.
    pub async fn close(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.unbind().await {
                tracing::debug!(error = %e, "LDAP unbind failed");
            }
        }
    }
}

impl<S: DirectorySession> Drop for LdapConnection<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!("LDAP connection dropped without close, abandoning");
            session.abandon();
        }
    }
}

fn closed() -> LdapError {
    LdapError::connection("connection already closed")
}
