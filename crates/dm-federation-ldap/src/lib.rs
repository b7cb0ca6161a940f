//! # dm-federation-ldap
//!
//! LDAP and Active Directory backend for directory federation.
//!
//! The crate connects to a directory with `ldap3` (plain, StartTLS or
//! LDAPS), binds as a service account, runs the configured user and group
//! filters, and verifies end-user credentials by search-then-bind.
//!
//! ## Example
//!
//! ```no_run
//! use dm_federation_ldap::{LdapConfig, LdapDirectoryProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LdapConfig::from_json(r#"{
//!     "serverHost": "ldap.planetexpress.com",
//!     "encryptionType": "starttls",
//!     "baseDN": "ou=people,dc=planetexpress,dc=com",
//!     "bindDN": "cn=admin,dc=planetexpress,dc=com",
//!     "bindPassword": "GoodNewsEveryone"
//! }"#)?;
//!
//! let provider = LdapDirectoryProvider::new(config)?;
//! let outcome = provider.authenticate("professor", "professor").await?;
//! assert!(outcome.is_authenticated());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod mapper;
pub mod provider;
pub mod search;
pub mod session;

#[cfg(test)]
mod testing;

pub use auth::authenticate;
pub use config::{
    AttributeMap, EncryptionType, LdapConfig, LdapConfigBuilder, SearchScope, ServerType,
};
pub use connection::{BindState, LdapConnection};
pub use error::{LdapError, LdapResult, Phase};
pub use mapper::LdapEntryMapper;
pub use provider::LdapDirectoryProvider;
pub use search::{FilterExecutor, FilterKind, LdapEntry};
pub use session::{BindStatus, Dialer, DirectorySession, Ldap3Dialer, Ldap3Session};
