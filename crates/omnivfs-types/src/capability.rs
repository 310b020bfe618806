//! Operations a file system declares support for.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A single declared operation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Create,
    Delete,
    Rename,
    GetType,
    ListChildren,
    ReadContent,
    WriteContent,
    AppendContent,
    RandomAccessRead,
    RandomAccessWrite,
    Attributes,
    GetLastModified,
    SetLastModifiedFile,
    SetLastModifiedFolder,
    /// Can host junctions (virtual file systems only).
    Junctions,
}

/// An immutable-after-construction set of [`Capability`] values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability.
    pub fn all() -> Self {
        Capability::iter().collect()
    }

    /// The capabilities of a backend that only reads.
    pub fn read_only() -> Self {
        [
            Capability::GetType,
            Capability::ListChildren,
            Capability::ReadContent,
            Capability::RandomAccessRead,
            Capability::GetLastModified,
            Capability::Attributes,
        ]
        .into_iter()
        .collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Builder-style insert.
    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    /// Builder-style removal.
    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
