//! Normalized directory records.
//!
//! A [`DirectoryEntry`] is what a directory backend hands to the rest of the
//! system: one record per directory object, with attribute values already
//! resolved through the configured attribute map.

use serde::{Deserialize, Serialize};

/// The class of directory object an entry was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// A person / user account.
    User,
    /// A group of users.
    Group,
}

/// One normalized record per directory object.
///
/// Entries are produced fresh on every search and are never cached;
/// persistence belongs to the identity sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Object class of the entry.
    pub kind: EntryKind,

    /// Remote identifier: always the entry's full distinguished name.
    pub remote_id: String,

    /// Login identifier (value of the login attribute). Empty for groups.
    pub login: String,

    /// Canonical common name.
    pub common_name: String,

    /// First name. Empty when the directory has none.
    pub first_name: String,

    /// Last name. Empty when the directory has none.
    pub last_name: String,

    /// Email address. Empty when the directory has none.
    pub email: String,

    /// Member DNs. Only populated for groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,

    /// Group DNs read from the user's membership attribute, when the
    /// directory exposes one. Only populated for users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_of: Vec<String>,
}

impl DirectoryEntry {
    /// Creates an empty user entry for the given DN.
    #[must_use]
    pub fn user(remote_id: impl Into<String>) -> Self {
        Self::empty(EntryKind::User, remote_id.into())
    }

    /// Creates an empty group entry for the given DN.
    #[must_use]
    pub fn group(remote_id: impl Into<String>) -> Self {
        Self::empty(EntryKind::Group, remote_id.into())
    }

    fn empty(kind: EntryKind, remote_id: String) -> Self {
        Self {
            kind,
            remote_id,
            login: String::new(),
            common_name: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            members: Vec::new(),
            member_of: Vec::new(),
        }
    }

    /// Returns true for user entries.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind == EntryKind::User
    }

    /// Returns true for group entries.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind == EntryKind::Group
    }

    /// Returns the full name ("first last"), or `None` when both are empty.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            None
        } else {
            Some(full.to_string())
        }
    }

    /// Key used to recognise the same directory object across searches.
    ///
    /// DNs compare case-insensitively.
    #[must_use]
    pub fn identity_key(&self) -> String {
        self.remote_id.to_lowercase()
    }
}
