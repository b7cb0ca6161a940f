//! LDAP directory configuration.
//!
//! A [`LdapConfig`] is immutable, validated input: it is normalized and
//! checked once when it is loaded (from the persisted organization settings
//! or through [`LdapConfigBuilder`]) and then passed explicitly to every
//! connector, filter and authentication call.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};

// ============================================================================
// Server Type
// ============================================================================

/// Directory dialect.
///
/// The dialect only selects defaults (filters, login attribute); the wire
/// protocol is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerType {
    /// Generic LDAP (OpenLDAP, 389-ds, ...).
    #[default]
    #[serde(rename = "ldap")]
    Ldap,

    /// Microsoft Active Directory.
    #[serde(rename = "ad")]
    ActiveDirectory,
}

impl ServerType {
    /// Returns the default user search filter for this dialect.
    #[must_use]
    pub const fn default_user_filter(&self) -> &'static str {
        match self {
            Self::Ldap => "(|(objectClass=person)(objectClass=user)(objectClass=inetOrgPerson))",
            Self::ActiveDirectory => "(&(objectCategory=person)(objectClass=user))",
        }
    }

    /// Returns the default group search filter for this dialect.
    #[must_use]
    pub const fn default_group_filter(&self) -> &'static str {
        match self {
            Self::Ldap => {
                "(|(objectClass=group)(objectClass=groupOfNames)(objectClass=groupOfUniqueNames))"
            }
            Self::ActiveDirectory => "(objectClass=group)",
        }
    }

    /// Returns the default login attribute for this dialect.
    #[must_use]
    pub const fn default_login_attribute(&self) -> &'static str {
        match self {
            Self::Ldap => "uid",
            Self::ActiveDirectory => "sAMAccountName",
        }
    }
}

// ============================================================================
// Encryption
// ============================================================================

/// Transport encryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionType {
    /// Plain LDAP. Credentials travel in cleartext.
    #[serde(rename = "none")]
    None,

    /// Plain transport upgraded with StartTLS before any other traffic.
    #[default]
    #[serde(rename = "starttls")]
    StartTls,

    /// TLS from the first byte (LDAPS).
    #[serde(rename = "ldaps")]
    Ldaps,
}

impl EncryptionType {
    /// URL scheme used to dial the server.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::None | Self::StartTls => "ldap",
            Self::Ldaps => "ldaps",
        }
    }

    /// Conventional port for this mode.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::None | Self::StartTls => 389,
            Self::Ldaps => 636,
        }
    }

    /// Returns true if traffic is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// ============================================================================
// Search Scope
// ============================================================================

/// LDAP search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Converts to ldap3 scope.
    #[must_use]
    pub fn to_ldap3(&self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

// ============================================================================
// Attribute Map
// ============================================================================

/// Which directory attribute supplies each logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap {
    /// Login identifier (`uid`, `sAMAccountName`).
    #[serde(rename = "attributeUserRDN", default)]
    pub user_rdn: String,

    /// First name (`givenName`).
    #[serde(rename = "attributeUserFirstname", default)]
    pub user_first_name: String,

    /// Last name (`sn`).
    #[serde(rename = "attributeUserLastname", default)]
    pub user_last_name: String,

    /// Email (`mail`).
    #[serde(rename = "attributeUserEmail", default)]
    pub user_email: String,

    /// Optional display name, split into first/last name when those are missing.
    #[serde(rename = "attributeUserDisplayName", default)]
    pub user_display_name: String,

    /// Optional group membership attribute on users (`memberOf`).
    #[serde(rename = "attributeUserGroupName", default)]
    pub user_group_name: String,

    /// Member list attribute on groups (`member`).
    #[serde(rename = "attributeGroupMember", default)]
    pub group_member: String,
}

impl AttributeMap {
    /// Returns the default attribute map for a dialect.
    #[must_use]
    pub fn for_server_type(server_type: ServerType) -> Self {
        Self {
            user_rdn: server_type.default_login_attribute().to_string(),
            user_first_name: "givenName".to_string(),
            user_last_name: "sn".to_string(),
            user_email: "mail".to_string(),
            user_display_name: String::new(),
            user_group_name: String::new(),
            group_member: "member".to_string(),
        }
    }

    /// Trims every name and fills required names left empty.
    fn normalize(&mut self, server_type: ServerType) {
        let defaults = Self::for_server_type(server_type);
        for (value, default) in [
            (&mut self.user_rdn, defaults.user_rdn),
            (&mut self.user_first_name, defaults.user_first_name),
            (&mut self.user_last_name, defaults.user_last_name),
            (&mut self.user_email, defaults.user_email),
            (&mut self.user_display_name, defaults.user_display_name),
            (&mut self.user_group_name, defaults.user_group_name),
            (&mut self.group_member, defaults.group_member),
        ] {
            let trimmed = value.trim();
            *value = if trimmed.is_empty() {
                default
            } else {
                trimmed.to_string()
            };
        }
    }

    fn validate(&self) -> LdapResult<()> {
        let named = [
            ("attributeUserRDN", &self.user_rdn, true),
            ("attributeUserFirstname", &self.user_first_name, false),
            ("attributeUserLastname", &self.user_last_name, false),
            ("attributeUserEmail", &self.user_email, false),
            ("attributeUserDisplayName", &self.user_display_name, false),
            ("attributeUserGroupName", &self.user_group_name, false),
            ("attributeGroupMember", &self.group_member, true),
        ];

        for (key, value, required) in named {
            if value.is_empty() {
                if required {
                    return Err(LdapError::config(format!("{key} cannot be empty")));
                }
                continue;
            }
            if !is_attribute_descriptor(value) {
                return Err(LdapError::config(format!(
                    "{key} is not a valid attribute name: {value:?}"
                )));
            }
        }

        Ok(())
    }
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self::for_server_type(ServerType::default())
    }
}

/// Checks an attribute description: a keystring or a numeric OID.
fn is_attribute_descriptor(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        Some(c) if c.is_ascii_digit() => {
            !name.ends_with('.')
                && !name.contains("..")
                && name.chars().all(|c| c.is_ascii_digit() || c == '.')
        }
        _ => false,
    }
}

// ============================================================================
// LDAP Configuration
// ============================================================================

/// Directory connection and mapping configuration.
///
/// The serialized form matches the persisted organization settings
/// (`serverHost`, `encryptionType`, `attributeUserRDN`, ...). The bind
/// password is accepted on input but never serialized.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapConfig {
    // === Connection ===
    /// Directory dialect.
    #[serde(default)]
    pub server_type: ServerType,

    /// Server host name or address.
    pub server_host: String,

    /// Server port. `0` means the default for the encryption mode.
    #[serde(default)]
    pub server_port: u16,

    /// Transport encryption mode.
    #[serde(default)]
    pub encryption_type: EncryptionType,

    /// Whether to validate the server certificate chain and host name.
    #[serde(default = "default_true")]
    pub validate_certificates: bool,

    /// Dial and TLS handshake deadline.
    #[serde(default = "default_connection_timeout", with = "duration_secs")]
    pub connection_timeout: Duration,

    /// Deadline for each bind, search and unbind.
    #[serde(default = "default_operation_timeout", with = "duration_secs")]
    pub operation_timeout: Duration,

    // === Directory Structure ===
    /// Base DN all searches run under.
    #[serde(rename = "baseDN")]
    pub base_dn: String,

    /// Service account DN.
    #[serde(rename = "bindDN")]
    pub bind_dn: String,

    /// Service account password.
    #[serde(default, skip_serializing)]
    pub bind_password: String,

    // === Search ===
    /// User search filter. Empty selects the dialect default.
    #[serde(default)]
    pub user_filter: String,

    /// Group search filter. Empty selects the dialect default.
    #[serde(default)]
    pub group_filter: String,

    // === Attributes ===
    /// Attribute map.
    #[serde(flatten)]
    pub attributes: AttributeMap,
}

const fn default_true() -> bool {
    true
}

const fn default_connection_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("server_type", &self.server_type)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("encryption_type", &self.encryption_type)
            .field("validate_certificates", &self.validate_certificates)
            .field("connection_timeout", &self.connection_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"***REDACTED***")
            .field("user_filter", &self.user_filter)
            .field("group_filter", &self.group_filter)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl LdapConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LdapConfigBuilder {
        LdapConfigBuilder::new()
    }

    /// Loads a configuration from its persisted JSON form.
    ///
    /// The result is normalized and validated.
    pub fn from_json(json: &str) -> LdapResult<Self> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| LdapError::config(format!("invalid directory settings: {e}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trims whitespace and fills defaults for empty attribute names.
    pub fn normalize(&mut self) {
        self.server_host = self.server_host.trim().to_string();
        self.base_dn = self.base_dn.trim().to_string();
        self.bind_dn = self.bind_dn.trim().to_string();
        self.user_filter = self.user_filter.trim().to_string();
        self.group_filter = self.group_filter.trim().to_string();
        self.attributes.normalize(self.server_type);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LdapResult<()> {
        if self.server_host.is_empty() {
            return Err(LdapError::config("serverHost cannot be empty"));
        }

        if self.base_dn.is_empty() {
            return Err(LdapError::config("baseDN cannot be empty"));
        }

        // A bind with an empty DN or password is an anonymous bind, which
        // most servers accept without checking anything.
        if self.bind_dn.is_empty() {
            return Err(LdapError::config("bindDN cannot be empty"));
        }
        if self.bind_password.is_empty() {
            return Err(LdapError::config("bindPassword cannot be empty"));
        }

        if self.connection_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(LdapError::config("timeouts must be greater than zero"));
        }

        let filters = [
            ("userFilter", &self.user_filter),
            ("groupFilter", &self.group_filter),
        ];
        for (key, filter) in filters {
            if !filter.is_empty() && !is_parenthesized(filter) {
                return Err(LdapError::config(format!(
                    "{key} must be enclosed in parentheses"
                )));
            }
        }

        self.attributes.validate()
    }

    /// Effective server port.
    #[must_use]
    pub fn port(&self) -> u16 {
        if self.server_port == 0 {
            self.encryption_type.default_port()
        } else {
            self.server_port
        }
    }

    /// URL used to dial the server.
    #[must_use]
    pub fn url(&self) -> String {
        let host = if self.server_host.contains(':') && !self.server_host.starts_with('[') {
            format!("[{}]", self.server_host)
        } else {
            self.server_host.clone()
        };
        format!("{}://{}:{}", self.encryption_type.scheme(), host, self.port())
    }

    /// Effective user search filter.
    #[must_use]
    pub fn user_filter(&self) -> &str {
        if self.user_filter.is_empty() {
            self.server_type.default_user_filter()
        } else {
            &self.user_filter
        }
    }

    /// Effective group search filter.
    #[must_use]
    pub fn group_filter(&self) -> &str {
        if self.group_filter.is_empty() {
            self.server_type.default_group_filter()
        } else {
            &self.group_filter
        }
    }

    /// Filter selecting the user with the given login.
    #[must_use]
    pub fn login_filter(&self, login: &str) -> String {
        format!(
            "(&{}({}={}))",
            self.user_filter(),
            self.attributes.user_rdn,
            ldap3::ldap_escape(login)
        )
    }

    /// Attributes requested when searching users.
    #[must_use]
    pub fn user_attributes(&self) -> Vec<String> {
        let a = &self.attributes;
        let mut attrs: Vec<String> = Vec::with_capacity(7);
        for name in [
            "cn",
            &a.user_rdn,
            &a.user_first_name,
            &a.user_last_name,
            &a.user_email,
            &a.user_display_name,
            &a.user_group_name,
        ] {
            if !name.is_empty() && !attrs.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                attrs.push(name.to_string());
            }
        }
        attrs
    }

    /// Attributes requested when searching groups.
    #[must_use]
    pub fn group_attributes(&self) -> Vec<String> {
        let mut attrs = vec!["cn".to_string(), self.attributes.group_member.clone()];
        if !self.attributes.group_member.eq_ignore_ascii_case("uniqueMember") {
            attrs.push("uniqueMember".to_string());
        }
        attrs
    }
}

fn is_parenthesized(filter: &str) -> bool {
    filter.starts_with('(') && filter.ends_with(')')
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for LDAP configuration.
#[derive(Debug, Default)]
pub struct LdapConfigBuilder {
    server_type: ServerType,
    server_host: Option<String>,
    server_port: u16,
    encryption_type: EncryptionType,
    validate_certificates: bool,
    connection_timeout: Duration,
    operation_timeout: Duration,
    base_dn: Option<String>,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    user_filter: String,
    group_filter: String,
    attributes: Option<AttributeMap>,
}

impl LdapConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validate_certificates: true,
            connection_timeout: default_connection_timeout(),
            operation_timeout: default_operation_timeout(),
            ..Default::default()
        }
    }

    /// Sets the directory dialect.
    #[must_use]
    pub const fn server_type(mut self, server_type: ServerType) -> Self {
        self.server_type = server_type;
        self
    }

    /// Sets the server host.
    #[must_use]
    pub fn server_host(mut self, host: impl Into<String>) -> Self {
        self.server_host = Some(host.into());
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Sets the encryption mode.
    #[must_use]
    pub const fn encryption_type(mut self, encryption: EncryptionType) -> Self {
        self.encryption_type = encryption;
        self
    }

    /// Sets whether to validate certificates.
    #[must_use]
    pub const fn validate_certificates(mut self, validate: bool) -> Self {
        self.validate_certificates = validate;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the base DN.
    #[must_use]
    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dn = Some(dn.into());
        self
    }

    /// Sets the service account DN.
    #[must_use]
    pub fn bind_dn(mut self, dn: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self
    }

    /// Sets the service account password.
    #[must_use]
    pub fn bind_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Sets the user filter.
    #[must_use]
    pub fn user_filter(mut self, filter: impl Into<String>) -> Self {
        self.user_filter = filter.into();
        self
    }

    /// Sets the group filter.
    #[must_use]
    pub fn group_filter(mut self, filter: impl Into<String>) -> Self {
        self.group_filter = filter.into();
        self
    }

    /// Sets the attribute map.
    #[must_use]
    pub fn attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Builds, normalizes and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> LdapResult<LdapConfig> {
        let attributes = self
            .attributes
            .unwrap_or_else(|| AttributeMap::for_server_type(self.server_type));

        let mut config = LdapConfig {
            server_type: self.server_type,
            server_host: self
                .server_host
                .ok_or_else(|| LdapError::config("serverHost is required"))?,
            server_port: self.server_port,
            encryption_type: self.encryption_type,
            validate_certificates: self.validate_certificates,
            connection_timeout: self.connection_timeout,
            operation_timeout: self.operation_timeout,
            base_dn: self
                .base_dn
                .ok_or_else(|| LdapError::config("baseDN is required"))?,
            bind_dn: self
                .bind_dn
                .ok_or_else(|| LdapError::config("bindDN is required"))?,
            bind_password: self
                .bind_password
                .ok_or_else(|| LdapError::config("bindPassword is required"))?,
            user_filter: self.user_filter,
            group_filter: self.group_filter,
            attributes,
        };

        config.normalize();
        config.validate()?;

        Ok(config)
    }
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
