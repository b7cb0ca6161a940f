//! Synchronization of directory entries into the identity store.
//!
//! The orchestrator pulls users and groups from a [`DirectorySource`] and
//! upserts them into an [`IdentitySink`]. User and group phases run
//! independently: a failing group filter never prevents the user phase from
//! running, and the report carries one result per phase.
//!
//! Entries that disappeared from the directory are the sink's concern; the
//! orchestrator only adds and updates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::DirectoryEntry;
use crate::error::{FederationError, FederationResult};
use crate::provider::DirectorySource;

// ============================================================================
// Identity Sink
// ============================================================================

/// What the sink did with an upserted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpsertAction {
    /// A new record was created.
    Added,
    /// An existing record was changed.
    Updated,
    /// The stored record already matched.
    Unchanged,
}

/// The store collaborator that persists synchronized identities.
///
/// Implementations insert or update by [`DirectoryEntry::remote_id`].
#[allow(async_fn_in_trait)]
pub trait IdentitySink: Send + Sync {
    /// Inserts or updates a user.
    async fn upsert_user(&self, entry: &DirectoryEntry) -> FederationResult<UpsertAction>;

    /// Inserts or updates a group.
    async fn upsert_group(&self, entry: &DirectoryEntry) -> FederationResult<UpsertAction>;
}

// ============================================================================
// Sync Results
// ============================================================================

/// Result of one synchronization phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Number of records added.
    pub added: usize,

    /// Number of records updated.
    pub updated: usize,

    /// Number of records that were already current.
    pub unchanged: usize,

    /// Number of records that failed to sync.
    pub failed: usize,

    /// When the phase started.
    pub started_at: DateTime<Utc>,

    /// When the phase completed.
    pub completed_at: DateTime<Utc>,

    /// Status message.
    pub status: String,

    /// Errors encountered (if any).
    pub errors: Vec<SyncError>,

    /// Problems that affected the phase as a whole rather than one record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SyncResult {
    /// Creates a new sync result.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            added: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            started_at,
            completed_at: started_at,
            status: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Marks the phase as complete.
    #[must_use]
    pub fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self.status = format!(
            "Sync completed: {} added, {} updated, {} unchanged, {} failed",
            self.added, self.updated, self.unchanged, self.failed
        );
        self
    }

    /// Records what the sink did with an entry.
    pub fn record(&mut self, action: UpsertAction) {
        match action {
            UpsertAction::Added => self.added += 1,
            UpsertAction::Updated => self.updated += 1,
            UpsertAction::Unchanged => self.unchanged += 1,
        }
    }

    /// Records a sync failure.
    pub fn record_failure(&mut self, error: SyncError) {
        self.failed += 1;
        self.errors.push(error);
    }

    /// Records a phase-level problem. Record counters are untouched.
    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns the total number of records processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged + self.failed
    }

    /// Returns true if the phase had any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Error encountered during sync for a specific entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    /// Remote identifier (DN) of the entry.
    pub remote_id: String,

    /// Login (if available).
    pub login: Option<String>,

    /// Error message.
    pub message: String,
}

impl SyncError {
    /// Creates a new sync error.
    #[must_use]
    pub fn new(remote_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            login: None,
            message: message.into(),
        }
    }

    /// Sets the login.
    #[must_use]
    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        let login = login.into();
        if !login.is_empty() {
            self.login = Some(login);
        }
        self
    }
}

/// Outcome of a full sync pass, one result per phase.
///
/// A phase that was disabled by [`SyncOptions`] is `None`.
#[derive(Debug)]
pub struct SyncReport {
    /// User phase.
    pub users: Option<FederationResult<SyncResult>>,

    /// Group phase.
    pub groups: Option<FederationResult<SyncResult>>,
}

impl SyncReport {
    /// Returns true if every phase that ran completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        [&self.users, &self.groups]
            .into_iter()
            .flatten()
            .all(Result::is_ok)
    }

    /// Returns the names and errors of the phases that failed.
    #[must_use]
    pub fn failed_phases(&self) -> Vec<(&'static str, &FederationError)> {
        let mut failed = Vec::new();
        if let Some(Err(e)) = &self.users {
            failed.push(("users", e));
        }
        if let Some(Err(e)) = &self.groups {
            failed.push(("groups", e));
        }
        failed
    }
}

// ============================================================================
// Preview
// ============================================================================

/// Dry-run view of what a sync would import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryPreview {
    /// Whether the preview failed.
    pub is_error: bool,

    /// Human readable summary or error message.
    pub message: String,

    /// Number of distinct users found.
    pub user_count: usize,

    /// Number of groups found.
    pub group_count: usize,

    /// The first users found.
    pub users: Vec<DirectoryEntry>,

    /// Problems that did not stop the preview.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DirectoryPreview {
    fn failed(err: &FederationError) -> Self {
        Self {
            is_error: true,
            message: err.to_string(),
            user_count: 0,
            group_count: 0,
            users: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Which phases a sync pass runs and how entries are filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    /// Run the user phase.
    pub sync_users: bool,

    /// Run the group phase.
    pub sync_groups: bool,

    /// Add members of the groups matched by the group filter to the user phase.
    pub include_group_members: bool,

    /// Skip (and report) users without an email address.
    pub require_email: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync_users: true,
            sync_groups: true,
            include_group_members: true,
            require_email: true,
        }
    }
}

/// Drives a directory source into an identity sink.
pub struct SyncOrchestrator<'a, P, K> {
    source: &'a P,
    sink: &'a K,
    options: SyncOptions,
}

impl<'a, P, K> SyncOrchestrator<'a, P, K>
where
    P: DirectorySource,
    K: IdentitySink,
{
    /// Creates an orchestrator with default options.
    #[must_use]
    pub fn new(source: &'a P, sink: &'a K) -> Self {
        Self {
            source,
            sink,
            options: SyncOptions::default(),
        }
    }

    /// Replaces the sync options.
    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs every enabled phase.
    pub async fn run(&self) -> SyncReport {
        let users = if self.options.sync_users {
            Some(self.sync_users().await)
        } else {
            None
        };

        let groups = if self.options.sync_groups {
            Some(self.sync_groups().await)
        } else {
            None
        };

        let report = SyncReport { users, groups };
        for (phase, err) in report.failed_phases() {
            tracing::error!(
                provider = self.source.provider_type(),
                phase,
                failed_step = err.phase(),
                error = %err,
                "Directory sync phase failed"
            );
        }
        report
    }

    /// Synchronizes users.
    pub async fn sync_users(&self) -> FederationResult<SyncResult> {
        let mut result = SyncResult::new(Utc::now());

        let mut entries = self.source.user_entries().await?;
        if self.options.include_group_members {
            if let Some(warning) = self.extend_with_members(&mut entries).await {
                result.record_warning(warning);
            }
        }

        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.identity_key()) {
                continue;
            }

            if self.options.require_email && entry.email.trim().is_empty() {
                result.record_failure(
                    SyncError::new(&entry.remote_id, "Missing email attribute")
                        .with_login(&entry.login),
                );
                continue;
            }

            match self.sink.upsert_user(&entry).await {
                Ok(action) => {
                    tracing::debug!(dn = %entry.remote_id, ?action, "Synced user");
                    result.record(action);
                }
                Err(e) => {
                    let error = SyncError::new(&entry.remote_id, e.to_string());
                    result.record_failure(error.with_login(&entry.login));
                }
            }
        }

        let result = result.complete();
        tracing::info!(status = %result.status, "User sync finished");
        Ok(result)
    }

    /// Synchronizes groups.
    pub async fn sync_groups(&self) -> FederationResult<SyncResult> {
        let mut result = SyncResult::new(Utc::now());

        let entries = self.source.group_entries().await?;
        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.identity_key()) {
                continue;
            }

            match self.sink.upsert_group(&entry).await {
                Ok(action) => {
                    tracing::debug!(dn = %entry.remote_id, ?action, "Synced group");
                    result.record(action);
                }
                Err(e) => result.record_failure(SyncError::new(&entry.remote_id, e.to_string())),
            }
        }

        let result = result.complete();
        tracing::info!(status = %result.status, "Group sync finished");
        Ok(result)
    }

    /// Shows what a sync would import without touching the sink.
    ///
    /// At most `limit` users are returned; the counts cover everything.
    pub async fn preview(&self, limit: usize) -> DirectoryPreview {
        if let Err(e) = self.source.test_connection().await {
            return DirectoryPreview::failed(&e);
        }

        let mut users = match self.source.user_entries().await {
            Ok(users) => users,
            Err(e) => return DirectoryPreview::failed(&e),
        };

        let group_count = match self.source.group_entries().await {
            Ok(groups) => groups.len(),
            Err(e) => return DirectoryPreview::failed(&e),
        };

        let mut warnings = Vec::new();
        if self.options.include_group_members && group_count > 0 {
            warnings.extend(self.extend_with_members(&mut users).await);
        }

        let mut seen = HashSet::new();
        users.retain(|entry| seen.insert(entry.identity_key()));
        let user_count = users.len();
        users.truncate(limit);

        DirectoryPreview {
            is_error: false,
            message: format!("Found {user_count} users and {group_count} groups"),
            user_count,
            group_count,
            users,
            warnings,
        }
    }

    /// Appends the members of the matched groups to `entries`.
    ///
    /// A failed expansion leaves `entries` as the user filter returned
    /// them and is reported as a warning.
    async fn extend_with_members(&self, entries: &mut Vec<DirectoryEntry>) -> Option<String> {
        match self.source.group_member_entries().await {
            Ok(members) => {
                entries.extend(members);
                None
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Group member expansion failed, using user filter results only"
                );
                Some(format!("Group member expansion failed: {e}"))
            }
        }
    }
}
