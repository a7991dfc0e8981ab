//! Index snapshot functionality

use safe_core::{Hash256, Height, SafeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keys::IndexTag;
use crate::memory::MemoryEngine;
use crate::store::{compute_index_root, IndexEntry, KvEngine};

/// Every entry of the index keyspace plus its digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index tip when the snapshot was taken
    pub tip: Option<Height>,
    pub root: Hash256,
    /// Entries in key order
    pub entries: Vec<IndexEntry>,
    pub timestamp: u64,
}

impl IndexSnapshot {
    pub fn new(tip: Option<Height>, mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let root = compute_index_root(&entries);
        Self {
            tip,
            root,
            entries,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Copy every tagged entry out of an engine
    pub fn capture(engine: &dyn KvEngine, tip: Option<Height>) -> SafeResult<Self> {
        let mut entries = Vec::new();
        for tag in IndexTag::ALL {
            for entry in engine.scan_prefix(&tag.prefix())? {
                entries.push(entry?);
            }
        }
        Ok(Self::new(tip, entries))
    }

    pub fn verify(&self) -> bool {
        compute_index_root(&self.entries) == self.root
    }

    pub fn restore(&self) -> MemoryEngine {
        MemoryEngine::with_entries(self.entries.clone())
    }

    pub fn to_bytes(&self) -> SafeResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> SafeResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts_by_tag(&self) -> BTreeMap<IndexTag, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            if let Some(tag) = entry.key.first().copied().and_then(IndexTag::from_byte) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Key-level difference going from `self` to `other`
    pub fn diff(&self, other: &IndexSnapshot) -> SnapshotDiff {
        let before: BTreeMap<&[u8], &[u8]> = self
            .entries
            .iter()
            .map(|e| (e.key.as_slice(), e.value.as_slice()))
            .collect();
        let after: BTreeMap<&[u8], &[u8]> = other
            .entries
            .iter()
            .map(|e| (e.key.as_slice(), e.value.as_slice()))
            .collect();

        let mut diff = SnapshotDiff::default();
        for (key, value) in &after {
            match before.get(key) {
                None => diff.added.push(key.to_vec()),
                Some(old) if old != value => diff.changed.push(key.to_vec()),
                Some(_) => {}
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) {
                diff.removed.push(key.to_vec());
            }
        }
        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<Vec<u8>>,
    pub removed: Vec<Vec<u8>>,
    pub changed: Vec<Vec<u8>>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
