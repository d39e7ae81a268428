//! In-memory directory record with staged attribute edits.
//!
//! A [`Record`] holds the attribute values currently believed to be true for one directory entry
//! together with the add/remove edits made since the last successful commit. Edits apply to the
//! local view immediately; [`crate::sync::commit`] pushes the staged delta to the directory.

use serde::{Deserialize, Serialize};

use crate::dn::DistinguishedName;
use crate::value::{AttributeMap, AttributeValue};
use crate::Result;

/// Raw attribute data for one entry as read from the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Distinguished name as returned by the server.
    pub dn: String,
    /// Attribute values in server order.
    pub attributes: AttributeMap,
}

/// Lifecycle position of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    /// The record does not exist in the directory yet.
    New,
    /// The record exists and has staged edits.
    Modified,
    /// The record exists and matches the last committed view.
    Clean,
}

/// Edits staged since the last successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelta {
    to_add: AttributeMap,
    to_remove: AttributeMap,
}

impl PendingDelta {
    /// Values staged for addition, by attribute.
    #[must_use]
    pub fn to_add(&self) -> &AttributeMap {
        &self.to_add
    }

    /// Values staged for removal, by attribute.
    #[must_use]
    pub fn to_remove(&self) -> &AttributeMap {
        &self.to_remove
    }

    /// True when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    fn clear(&mut self) {
        self.to_add.clear();
        self.to_remove.clear();
    }
}

/// One directory record: a distinguished name, its current attribute values and the pending
/// delta against the directory.
///
/// Not internally synchronized; a record is driven by one owner at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    dn: DistinguishedName,
    current: AttributeMap,
    pending: PendingDelta,
    is_new: bool,
}

impl Record {
    /// Creates an empty record that will be created in the directory on commit.
    #[must_use]
    pub fn new(dn: DistinguishedName) -> Self {
        Self {
            dn,
            current: AttributeMap::new(),
            pending: PendingDelta::default(),
            is_new: true,
        }
    }

    /// Builds a clean record from attribute data read from the directory.
    ///
    /// Attributes without values are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`dirsync_core::Error::InvalidDn`] if the entry's DN cannot be parsed.
    pub fn from_raw(entry: RawEntry) -> Result<Self> {
        let dn = DistinguishedName::parse(&entry.dn)?;
        let current = entry
            .attributes
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();

        Ok(Self {
            dn,
            current,
            pending: PendingDelta::default(),
            is_new: false,
        })
    }

    /// Distinguished name of the record.
    #[must_use]
    pub fn dn(&self) -> &DistinguishedName {
        &self.dn
    }

    /// Names of all attributes currently holding at least one value, in lexicographic order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.current.keys().map(String::as_str).collect()
    }

    /// Current values of `attribute`; empty if the attribute is not set.
    #[must_use]
    pub fn values(&self, attribute: &str) -> &[AttributeValue] {
        self.current
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of `attribute` in insertion order, or [`AttributeValue::EMPTY`].
    #[must_use]
    pub fn first_value(&self, attribute: &str) -> &AttributeValue {
        self.values(attribute)
            .first()
            .unwrap_or(AttributeValue::EMPTY)
    }

    /// Current attribute map.
    #[must_use]
    pub fn attributes(&self) -> &AttributeMap {
        &self.current
    }

    /// Edits staged since the last successful commit.
    #[must_use]
    pub fn pending(&self) -> &PendingDelta {
        &self.pending
    }

    /// True until the record has been successfully committed once.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// True if any edit is staged.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecordState {
        if self.is_new {
            RecordState::New
        } else if self.has_pending_changes() {
            RecordState::Modified
        } else {
            RecordState::Clean
        }
    }

    /// Appends `value` to `attribute`, creating the attribute if needed.
    ///
    /// No deduplication: adding the same value twice stages it twice.
    pub fn add_value(&mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) {
        let attribute = attribute.into();
        let value = value.into();

        self.pending
            .to_add
            .entry(attribute.clone())
            .or_default()
            .push(value.clone());
        self.current.entry(attribute).or_default().push(value);
    }

    /// Removes every occurrence of `value` from `attribute`, staging one removal per
    /// occurrence. Unknown attributes and absent values are ignored.
    pub fn remove_value(&mut self, attribute: &str, value: &AttributeValue) {
        let Some(values) = self.current.get_mut(attribute) else {
            return;
        };

        let before = values.len();
        values.retain(|existing| existing != value);
        let removed = before - values.len();
        let now_empty = values.is_empty();

        if removed > 0 {
            self.pending
                .to_remove
                .entry(attribute.to_string())
                .or_default()
                .extend(std::iter::repeat(value.clone()).take(removed));
        }
        if now_empty {
            self.current.remove(attribute);
        }
    }

    /// Removes `attribute` entirely, staging removal of each of its values.
    pub fn remove_all_values(&mut self, attribute: &str) {
        let Some(values) = self.current.remove(attribute) else {
            return;
        };

        self.pending
            .to_remove
            .entry(attribute.to_string())
            .or_default()
            .extend(values);
    }

    /// Records a successful commit: the staged delta becomes the new baseline.
    pub(crate) fn mark_committed(&mut self) {
        self.pending.clear();
        self.is_new = false;
    }
}
