//! LDAP attribute mapping.
//!
//! Maps raw LDAP entries to [`DirectoryEntry`] values through the
//! configured [`AttributeMap`].

use dm_federation::DirectoryEntry;

use crate::config::AttributeMap;
use crate::search::LdapEntry;

/// Fallback member attribute for `groupOfUniqueNames` groups.
const UNIQUE_MEMBER: &str = "uniqueMember";

// ============================================================================
// LDAP Entry Mapper
// ============================================================================

/// Maps LDAP entries to normalized directory entries.
#[derive(Debug, Clone, Copy)]
pub struct LdapEntryMapper<'a> {
    attributes: &'a AttributeMap,
}

impl<'a> LdapEntryMapper<'a> {
    /// Creates a new LDAP entry mapper.
    #[must_use]
    pub const fn new(attributes: &'a AttributeMap) -> Self {
        Self { attributes }
    }

    /// Maps an LDAP entry to a user.
    #[must_use]
    pub fn map_user(&self, entry: &LdapEntry) -> DirectoryEntry {
        let a = self.attributes;
        let mut user = DirectoryEntry::user(entry.dn.clone());

        user.login = text_attr(entry, &a.user_rdn);
        user.first_name = text_attr(entry, &a.user_first_name);
        user.last_name = text_attr(entry, &a.user_last_name);
        user.email = text_attr(entry, &a.user_email);
        user.common_name = text_attr(entry, "cn");

        let display_name = text_attr(entry, &a.user_display_name);
        if !display_name.is_empty() && (user.first_name.is_empty() || user.last_name.is_empty()) {
            let (first, last) = split_display_name(&display_name);
            if user.first_name.is_empty() {
                user.first_name = first;
            }
            if user.last_name.is_empty() {
                user.last_name = last;
            }
        }

        if user.common_name.is_empty() {
            user.common_name = if display_name.is_empty() {
                user.full_name().unwrap_or_else(|| user.login.clone())
            } else {
                display_name
            };
        }

        if !a.user_group_name.is_empty() {
            user.member_of = multi_attr(entry, &a.user_group_name);
        }

        user
    }

    /// Maps an LDAP entry to a group.
    #[must_use]
    pub fn map_group(&self, entry: &LdapEntry) -> DirectoryEntry {
        let mut group = DirectoryEntry::group(entry.dn.clone());
        group.common_name = text_attr(entry, "cn");

        group.members = multi_attr(entry, &self.attributes.group_member);
        if group.members.is_empty() {
            group.members = multi_attr(entry, UNIQUE_MEMBER);
        }

        group
    }
}

/// First value of an attribute, trimmed. Empty when absent or unmapped.
fn text_attr(entry: &LdapEntry, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    entry
        .get_attr(name)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// All non-empty values of an attribute, without case-insensitive duplicates.
fn multi_attr(entry: &LdapEntry, name: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in entry.get_attrs(name).unwrap_or_default() {
        let value = value.trim();
        if !value.is_empty() && !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
            values.push(value.to_string());
        }
    }
    values
}

/// Splits a display name into first name and the rest.
fn split_display_name(display_name: &str) -> (String, String) {
    let display_name = display_name.trim();
    match display_name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (display_name.to_string(), String::new()),
    }
}
