//! Directory record change tracking and synchronization.
//!
//! A [`Record`] is an in-memory view of one directory entry: a distinguished name plus
//! multi-valued attributes. Callers add and remove values locally, then [`commit`] turns the
//! staged edits into a single ordered create or modify request for a [`DirectoryWriter`].
//! [`LdapDirectory`] provides both collaborator capabilities on top of `ldap3`.

#![deny(missing_docs)]

mod client;
mod config;
mod dn;
mod export;
mod record;
mod sync;
mod value;

pub use client::{LdapDirectory, SearchScope};
pub use config::{
    DirectoryConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use dn::{DistinguishedName, DistinguishedNameError};
pub use export::{export_view, to_ldif, write_ldif, ExportView, NEW_ITEMS_COMMENT};
pub use record::{PendingDelta, RawEntry, Record, RecordState};
pub use sync::{
    build_request, commit, fetch, CommitOutcome, DirectoryModification, DirectoryReader,
    DirectoryWriter, WriteKind, WriteRequest,
};
pub use value::{AttributeMap, AttributeValue};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirsync_core::Result<T>;
