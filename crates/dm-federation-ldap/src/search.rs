//! LDAP search operations.
//!
//! The [`FilterExecutor`] runs the configured user and group filters on a
//! service-bound connection and maps the results to [`DirectoryEntry`]
//! values.

use std::collections::{HashMap, HashSet};

use dm_federation::DirectoryEntry;
use ldap3::SearchEntry;

use crate::config::{LdapConfig, SearchScope};
use crate::connection::LdapConnection;
use crate::error::{LdapError, LdapResult};
use crate::mapper::LdapEntryMapper;
use crate::session::{DirectorySession, Ldap3Session};

/// Represents an LDAP entry with parsed attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute value, keeping earlier values.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Creates a new LDAP entry from search result.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }

    /// Gets a single-valued attribute.
    ///
    /// Attribute names compare case-insensitively, as servers may return
    /// them in a different case than requested.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Gets a multi-valued attribute.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&[String]> {
        if let Some(values) = self.attributes.get(name) {
            return Some(values);
        }
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Checks if the entry has an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attrs(name).is_some()
    }
}

/// Which configured filter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// The user filter.
    User,
    /// The group filter.
    Group,
}

/// Runs configured filters on a service-bound connection.
pub struct FilterExecutor<'a, S: DirectorySession = Ldap3Session> {
    conn: &'a mut LdapConnection<S>,
    config: &'a LdapConfig,
}

impl<'a, S: DirectorySession> FilterExecutor<'a, S> {
    /// Creates a new executor.
    pub fn new(conn: &'a mut LdapConnection<S>, config: &'a LdapConfig) -> Self {
        Self { conn, config }
    }

    /// Effective filter for a kind.
    #[must_use]
    pub fn filter_for(&self, kind: FilterKind) -> &'a str {
        match kind {
            FilterKind::User => self.config.user_filter(),
            FilterKind::Group => self.config.group_filter(),
        }
    }

    /// Runs a filter under the base DN and maps every match.
    ///
    /// Zero matches is an empty vector.
    pub async fn execute(&mut self, kind: FilterKind) -> LdapResult<Vec<DirectoryEntry>> {
        let config = self.config;
        let filter = self.filter_for(kind);
        let attrs = match kind {
            FilterKind::User => config.user_attributes(),
            FilterKind::Group => config.group_attributes(),
        };

        let entries = self
            .search(&config.base_dn, SearchScope::Subtree, filter, &attrs)
            .await?;

        tracing::info!(?kind, count = entries.len(), "LDAP filter executed");

        let mapper = LdapEntryMapper::new(&config.attributes);
        Ok(entries
            .iter()
            .map(|entry| match kind {
                FilterKind::User => mapper.map_user(entry),
                FilterKind::Group => mapper.map_group(entry),
            })
            .collect())
    }

    /// Runs the user filter.
    pub async fn execute_users(&mut self) -> LdapResult<Vec<DirectoryEntry>> {
        self.execute(FilterKind::User).await
    }

    /// Runs the group filter.
    pub async fn execute_groups(&mut self) -> LdapResult<Vec<DirectoryEntry>> {
        self.execute(FilterKind::Group).await
    }

    /// Resolves the members of the given groups to user entries.
    ///
    /// Each distinct member DN is read with a base-scope search constrained
    /// by the user filter, so nested groups and non-user members drop out.
    /// Members that no longer exist are skipped.
    pub async fn expand_group_members(
        &mut self,
        groups: &[DirectoryEntry],
    ) -> LdapResult<Vec<DirectoryEntry>> {
        let config = self.config;
        let filter = config.user_filter();
        let attrs = config.user_attributes();
        let mapper = LdapEntryMapper::new(&config.attributes);

        let mut seen = HashSet::new();
        let mut users = Vec::new();

        for member in groups.iter().flat_map(|group| group.members.iter()) {
            if !seen.insert(member.to_lowercase()) {
                continue;
            }
            match self.search(member, SearchScope::Base, filter, &attrs).await {
                Ok(found) => users.extend(found.iter().map(|entry| mapper.map_user(entry))),
                Err(LdapError::NoSuchObject(_)) => {
                    tracing::debug!(member = %member, "Group member does not exist, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            groups = groups.len(),
            members = users.len(),
            "LDAP group members resolved"
        );

        Ok(users)
    }

    /// Finds the entries whose login attribute equals `login`.
    ///
    /// The login is escaped before it is placed in the filter.
    pub async fn find_by_login(&mut self, login: &str) -> LdapResult<Vec<LdapEntry>> {
        let config = self.config;
        let filter = config.login_filter(login);
        let attrs = vec![config.attributes.user_rdn.clone()];
        self.search(&config.base_dn, SearchScope::Subtree, &filter, &attrs)
            .await
    }

    /// Reads the base DN entry, proving the base exists and is readable.
    pub async fn probe_base(&mut self) -> LdapResult<()> {
        let config = self.config;
        let base_dn = &config.base_dn;
        let no_attributes = ["1.1".to_string()];
        let found = self
            .search(base_dn, SearchScope::Base, "(objectClass=*)", &no_attributes)
            .await?;
        if found.is_empty() {
            return Err(LdapError::NoSuchObject(base_dn.clone()));
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[String],
    ) -> LdapResult<Vec<LdapEntry>> {
        tracing::debug!(base_dn = %base_dn, ?scope, filter = %filter, "Searching LDAP");
        self.conn
            .service_session()?
            .search(base_dn, scope, filter, attrs)
            .await
    }
}
