//! Core index store traits and types

use safe_core::{Hash256, SafeError, SafeResult, ShutdownSignal};
use safe_crypto::hashing::{hash_multiple, merkle_root};
use serde::{Deserialize, Serialize};

/// A raw key/value pair held by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl IndexEntry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    pub fn hash(&self) -> Hash256 {
        let len = (self.key.len() as u32).to_be_bytes();
        hash_multiple(&[&len, &self.key, &self.value])
    }
}

/// Digest over a set of entries, independent of input order
pub fn compute_index_root(entries: &[IndexEntry]) -> Hash256 {
    if entries.is_empty() {
        return Hash256::ZERO;
    }

    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let leaves: Vec<Hash256> = sorted.iter().map(|e| e.hash()).collect();
    merkle_root(&leaves)
}

/// Single mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Ordered set of mutations committed all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Keys touched by this batch, in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.ops.iter().map(BatchOp::key)
    }
}

impl From<Vec<IndexEntry>> for WriteBatch {
    fn from(entries: Vec<IndexEntry>) -> Self {
        let mut batch = WriteBatch::new();
        for entry in entries {
            batch.put(entry.key, entry.value);
        }
        batch
    }
}

/// Boxed iterator returned by engine range scans
pub type EntryIter<'a> = Box<dyn Iterator<Item = SafeResult<IndexEntry>> + 'a>;

/// Ordered key-value engine behind the index
///
/// Keys sort lexicographically as bytes. `apply` must be atomic: after an
/// error no operation of the batch is observable.
pub trait KvEngine: Send + Sync {
    /// Point read
    fn get(&self, key: &[u8]) -> SafeResult<Option<Vec<u8>>>;

    /// Commit a batch atomically
    fn apply(&self, batch: WriteBatch) -> SafeResult<()>;

    /// Entries whose key starts with `prefix` and sorts at or after `start`
    fn scan_from<'a>(&'a self, prefix: &[u8], start: &[u8]) -> SafeResult<EntryIter<'a>>;

    /// Number of stored keys
    fn len(&self) -> SafeResult<usize>;

    fn is_empty(&self) -> SafeResult<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, key: &[u8]) -> SafeResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> SafeResult<EntryIter<'a>> {
        self.scan_from(prefix, prefix)
    }

    /// Insert every entry in one atomic batch
    fn write_entries(&self, entries: Vec<IndexEntry>) -> SafeResult<()> {
        self.apply(WriteBatch::from(entries))
    }

    /// Remove every key in one atomic batch. Missing keys are not an error.
    fn erase_keys(&self, keys: Vec<Vec<u8>>) -> SafeResult<()> {
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.delete(key);
        }
        self.apply(batch)
    }

    /// Make committed batches durable
    fn flush(&self) -> SafeResult<()> {
        Ok(())
    }
}

/// Smallest key sorting strictly after `key`, for resuming a scan
pub fn resume_after(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// Prefix scan that stops with `Interrupted` once shutdown is requested
///
/// Remembers the last key it yielded so a caller can restart the scan
/// later with [`resume_after`].
pub struct PrefixScan<'a> {
    inner: EntryIter<'a>,
    shutdown: Option<ShutdownSignal>,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl<'a> PrefixScan<'a> {
    pub fn new(engine: &'a dyn KvEngine, prefix: &[u8]) -> SafeResult<Self> {
        Self::resume(engine, prefix, None)
    }

    /// Restart a scan after the key a previous scan stopped at
    pub fn resume(
        engine: &'a dyn KvEngine,
        prefix: &[u8],
        after: Option<&[u8]>,
    ) -> SafeResult<Self> {
        let inner = match after {
            Some(key) => engine.scan_from(prefix, &resume_after(key))?,
            None => engine.scan_prefix(prefix)?,
        };
        Ok(Self {
            inner,
            shutdown: None,
            last_key: None,
            done: false,
        })
    }

    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn last_key(&self) -> Option<&[u8]> {
        self.last_key.as_deref()
    }
}

impl Iterator for PrefixScan<'_> {
    type Item = SafeResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
            self.done = true;
            return Some(Err(SafeError::Interrupted));
        }
        match self.inner.next()? {
            Ok(entry) => {
                self.last_key = Some(entry.key.clone());
                Some(Ok(entry))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
