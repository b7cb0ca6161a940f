//! # dm-federation
//!
//! Directory federation framework.
//!
//! This crate holds the directory-agnostic half of identity federation:
//! the normalized [`DirectoryEntry`] record, the error taxonomy shared by
//! directory backends, the traits a backend implements, and the
//! orchestrator that reconciles directory entries into an identity store.
//!
//! The LDAP backend lives in `dm-federation-ldap`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod entry;
pub mod error;
pub mod provider;
pub mod sync;

pub use entry::{DirectoryEntry, EntryKind};
pub use error::{FederationError, FederationResult};
pub use provider::{AuthOutcome, CredentialValidator, DirectorySource, RejectReason};
pub use sync::{
    DirectoryPreview, IdentitySink, SyncOptions, SyncOrchestrator, SyncReport, SyncResult,
    UpsertAction,
};
