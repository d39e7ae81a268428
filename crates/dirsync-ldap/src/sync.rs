//! Sync engine: turns a record's staged delta into one directory write.
//!
//! The engine builds an ordered batch (every delete before every add), hands it to a
//! [`DirectoryWriter`] as a single request and, only if the write succeeds, folds the delta into
//! the record's baseline. A failed write leaves the record exactly as it was.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dn::DistinguishedName;
use crate::record::{RawEntry, Record};
use crate::value::{AttributeMap, AttributeValue};
use crate::Result;

/// Single attribute operation inside a write batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<AttributeValue>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete.
        values: Vec<AttributeValue>,
    },
}

impl DirectoryModification {
    /// Attribute the operation applies to.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. } | Self::Delete { attribute, .. } => attribute,
        }
    }

    /// Values carried by the operation.
    #[must_use]
    pub fn values(&self) -> &[AttributeValue] {
        match self {
            Self::Add { values, .. } | Self::Delete { values, .. } => values,
        }
    }

    /// True for a delete operation.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Whether a batch creates the record or modifies an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    /// Create the record with the given attributes.
    Create,
    /// Apply the operations to an existing record.
    Modify,
}

/// One atomic write request for a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Target record.
    pub dn: DistinguishedName,
    /// Create or modify.
    pub kind: WriteKind,
    /// Ordered operations.
    pub operations: Vec<DirectoryModification>,
}

impl WriteRequest {
    /// True if the request creates a new record.
    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self.kind, WriteKind::Create)
    }
}

/// Result of a commit that reached the directory, or did not need to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The record was created.
    Created,
    /// The record was modified.
    Modified,
    /// Nothing was staged; no request was sent.
    Unchanged,
}

/// Capability to apply a write batch to a directory.
///
/// Implementations must submit the request as one operation and report a rejection as
/// [`dirsync_core::Error::DirectoryWrite`] carrying the directory's result code and message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryWriter: Send + Sync {
    /// Submits the request.
    async fn write_batch(&self, request: &WriteRequest) -> Result<()>;
}

/// Capability to read the raw attributes of one record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryReader: Send + Sync {
    /// Reads the entry named by `dn`.
    async fn read_raw(&self, dn: &DistinguishedName) -> Result<RawEntry>;
}

/// Reads `dn` through `reader` and hydrates it as a clean record.
///
/// # Errors
///
/// Propagates the reader's error, or [`dirsync_core::Error::InvalidDn`] if the returned DN is
/// malformed.
pub async fn fetch(reader: &dyn DirectoryReader, dn: &DistinguishedName) -> Result<Record> {
    let entry = reader.read_raw(dn).await?;
    Record::from_raw(entry)
}

/// Builds the write request for `record`, or `None` if an existing record has nothing staged.
///
/// New records are created from their full current attribute set. Existing records get one
/// delete per attribute staged for removal followed by one add per attribute staged for
/// addition, each group in attribute name order.
#[must_use]
pub fn build_request(record: &Record) -> Option<WriteRequest> {
    let operations = if record.is_new() {
        adds(record.attributes())
    } else if record.has_pending_changes() {
        let pending = record.pending();
        let mut operations = deletes(pending.to_remove());
        operations.extend(adds(pending.to_add()));
        operations
    } else {
        return None;
    };

    let kind = if record.is_new() {
        WriteKind::Create
    } else {
        WriteKind::Modify
    };

    debug!(
        dn = %record.dn(),
        ?kind,
        operations = operations.len(),
        "built write batch"
    );

    Some(WriteRequest {
        dn: record.dn().clone(),
        kind,
        operations,
    })
}

/// Commits the staged edits of `record` through `writer`.
///
/// On success the pending delta is cleared and the record is no longer new. On failure the
/// record is left untouched so the caller can inspect or retry.
///
/// # Errors
///
/// Returns the writer's error unchanged, normally [`dirsync_core::Error::DirectoryWrite`].
pub async fn commit(record: &mut Record, writer: &dyn DirectoryWriter) -> Result<CommitOutcome> {
    let Some(request) = build_request(record) else {
        debug!(dn = %record.dn(), "nothing staged, skipping write");
        return Ok(CommitOutcome::Unchanged);
    };

    if let Err(err) = writer.write_batch(&request).await {
        warn!(
            dn = %request.dn,
            kind = err.error_code(),
            code = ?err.result_code(),
            "directory write failed: {err}"
        );
        return Err(err);
    }

    record.mark_committed();
    info!(dn = %request.dn, kind = ?request.kind, "committed record");

    Ok(match request.kind {
        WriteKind::Create => CommitOutcome::Created,
        WriteKind::Modify => CommitOutcome::Modified,
    })
}

fn adds(map: &AttributeMap) -> Vec<DirectoryModification> {
    map.iter()
        .map(|(attribute, values)| DirectoryModification::Add {
            attribute: attribute.clone(),
            values: values.clone(),
        })
        .collect()
}

fn deletes(map: &AttributeMap) -> Vec<DirectoryModification> {
    map.iter()
        .map(|(attribute, values)| DirectoryModification::Delete {
            attribute: attribute.clone(),
            values: values.clone(),
        })
        .collect()
}
