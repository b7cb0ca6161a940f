//! LDAP directory provider.
//!
//! ## Security Requirements
//!
//! - Encryption follows the configured mode; StartTLS never downgrades
//! - Passwords are never logged
//! - Every call opens its own connection and releases it on every path

use std::sync::Arc;

use dm_federation::error::FederationResult;
use dm_federation::provider::{AuthOutcome, CredentialValidator, DirectorySource};
use dm_federation::DirectoryEntry;

use crate::auth;
use crate::config::LdapConfig;
use crate::connection::LdapConnection;
use crate::error::LdapResult;
use crate::search::{FilterExecutor, FilterKind};
use crate::session::{Dialer, Ldap3Dialer};

/// LDAP directory provider.
///
/// Holds a validated, read-only configuration. Calls share nothing but
/// that configuration, so a provider may be used from many tasks at once.
pub struct LdapDirectoryProvider<D: Dialer = Ldap3Dialer> {
    config: Arc<LdapConfig>,
    dialer: D,
}

impl LdapDirectoryProvider {
    /// Creates a provider that connects with the `ldap3` client.
    ///
    /// ## Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: LdapConfig) -> LdapResult<Self> {
        Self::with_dialer(config, Ldap3Dialer)
    }
}

impl<D: Dialer> LdapDirectoryProvider<D> {
    /// Creates a provider with a custom dialer.
    ///
    /// ## Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn with_dialer(config: LdapConfig, dialer: D) -> LdapResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            dialer,
        })
    }

    /// Returns the LDAP configuration.
    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Opens a service-bound connection.
    pub async fn connect(&self) -> LdapResult<LdapConnection<D::Session>> {
        LdapConnection::establish(&self.dialer, &self.config).await
    }

    /// Connects, binds and reads the base DN.
    pub async fn test_connection(&self) -> LdapResult<()> {
        let mut conn = self.connect().await?;
        let result = FilterExecutor::new(&mut conn, &self.config)
            .probe_base()
            .await;
        conn.close().await;

        let url = self.config.url();
        match &result {
            Ok(()) => tracing::info!(url = %url, "LDAP connection test succeeded"),
            Err(e) => tracing::warn!(url = %url, error = %e, "LDAP connection test failed"),
        }
        result
    }

    /// Runs the user filter.
    pub async fn execute_user_filter(&self) -> LdapResult<Vec<DirectoryEntry>> {
        self.run_filter(FilterKind::User).await
    }

    /// Runs the group filter.
    pub async fn execute_group_filter(&self) -> LdapResult<Vec<DirectoryEntry>> {
        self.run_filter(FilterKind::Group).await
    }

    /// Runs the group filter and resolves the members of every match.
    pub async fn group_members(&self) -> LdapResult<Vec<DirectoryEntry>> {
        let mut conn = self.connect().await?;
        let result = {
            let mut executor = FilterExecutor::new(&mut conn, &self.config);
            match executor.execute_groups().await {
                Ok(groups) => executor.expand_group_members(&groups).await,
                Err(e) => Err(e),
            }
        };
        conn.close().await;
        result
    }

    /// Verifies a login and password.
    ///
    /// Credentials rejected locally never open a connection.
    pub async fn authenticate(&self, login: &str, password: &str) -> LdapResult<AuthOutcome> {
        if let Some(outcome) = auth::precheck(login, password) {
            return Ok(outcome);
        }

        let mut conn = self.connect().await?;
        let result = auth::authenticate(&mut conn, &self.config, login, password).await;
        conn.close().await;
        result
    }

    async fn run_filter(&self, kind: FilterKind) -> LdapResult<Vec<DirectoryEntry>> {
        let mut conn = self.connect().await?;
        let result = FilterExecutor::new(&mut conn, &self.config)
            .execute(kind)
            .await;
        conn.close().await;
        result
    }
}

impl<D: Dialer> DirectorySource for LdapDirectoryProvider<D> {
    fn provider_type(&self) -> &'static str {
        "ldap"
    }

    async fn test_connection(&self) -> FederationResult<()> {
        Self::test_connection(self).await.map_err(Into::into)
    }

    async fn user_entries(&self) -> FederationResult<Vec<DirectoryEntry>> {
        self.execute_user_filter().await.map_err(Into::into)
    }

    async fn group_entries(&self) -> FederationResult<Vec<DirectoryEntry>> {
        self.execute_group_filter().await.map_err(Into::into)
    }

    async fn group_member_entries(&self) -> FederationResult<Vec<DirectoryEntry>> {
        self.group_members().await.map_err(Into::into)
    }
}

impl<D: Dialer> CredentialValidator for LdapDirectoryProvider<D> {
    async fn validate_credential(
        &self,
        login: &str,
        password: &str,
    ) -> FederationResult<AuthOutcome> {
        self.authenticate(login, password).await.map_err(Into::into)
    }
}
