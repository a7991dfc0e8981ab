//! In-memory index engine for tests and ephemeral nodes

use parking_lot::RwLock;
use safe_core::{SafeError, SafeResult};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::{BatchOp, EntryIter, IndexEntry, KvEngine, WriteBatch};

/// Ordered in-memory engine
#[derive(Default)]
pub struct MemoryEngine {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    read_only: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<IndexEntry>) -> Self {
        let engine = Self::new();
        {
            let mut data = engine.data.write();
            for entry in entries {
                data.insert(entry.key, entry.value);
            }
        }
        engine
    }

    /// Reject every batch until cleared. Reads keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Copy of every stored entry, in key order
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| IndexEntry::new(k.clone(), v.clone()))
            .collect()
    }
}

impl Clone for MemoryEngine {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
            read_only: AtomicBool::new(self.read_only.load(Ordering::SeqCst)),
        }
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> SafeResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> SafeResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(SafeError::Storage("memory engine is read-only".into()));
        }

        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_from<'a>(&'a self, prefix: &[u8], start: &[u8]) -> SafeResult<EntryIter<'a>> {
        // Snapshot the range so the lock is not held across iteration
        let data = self.data.read();
        let entries: Vec<SafeResult<IndexEntry>> = data
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Ok(IndexEntry::new(k.clone(), v.clone())))
            .collect();
        Ok(Box::new(entries.into_iter()))
    }

    fn len(&self) -> SafeResult<usize> {
        Ok(self.data.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(iter: EntryIter<'_>) -> Vec<Vec<u8>> {
        iter.map(|e| e.unwrap().key).collect()
    }

    #[test]
    fn test_get_and_apply() {
        let engine = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        batch.put(b"key1".to_vec(), b"value1".to_vec());
        batch.put(b"key2".to_vec(), b"value2".to_vec());
        engine.apply(batch).unwrap();

        assert_eq!(engine.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(engine.len().unwrap(), 2);

        engine.erase_keys(vec![b"key1".to_vec(), b"missing".to_vec()]).unwrap();
        assert!(!engine.contains(b"key1").unwrap());
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_prefix_scan_is_bounded_and_ordered() {
        let engine = MemoryEngine::new();
        engine
            .write_entries(vec![
                IndexEntry::new(b"a\x02".to_vec(), vec![]),
                IndexEntry::new(b"a\x01".to_vec(), vec![]),
                IndexEntry::new(b"b\x00".to_vec(), vec![]),
                IndexEntry::new(b"\x00".to_vec(), vec![]),
            ])
            .unwrap();

        let keys = collect(engine.scan_prefix(b"a").unwrap());
        assert_eq!(keys, vec![b"a\x01".to_vec(), b"a\x02".to_vec()]);

        let keys = collect(engine.scan_from(b"a", b"a\x02").unwrap());
        assert_eq!(keys, vec![b"a\x02".to_vec()]);
    }

    #[test]
    fn test_read_only_rejects_whole_batch() {
        let engine = MemoryEngine::new();
        engine.set_read_only(true);
        let result = engine.write_entries(vec![IndexEntry::new(b"k".to_vec(), b"v".to_vec())]);
        assert!(matches!(result, Err(SafeError::Storage(_))));
        assert!(engine.is_empty().unwrap());

        engine.set_read_only(false);
        engine
            .write_entries(vec![IndexEntry::new(b"k".to_vec(), b"v".to_vec())])
            .unwrap();
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let engine = MemoryEngine::new();
        engine
            .write_entries(vec![IndexEntry::new(b"k".to_vec(), b"v".to_vec())])
            .unwrap();
        let copy = engine.clone();
        engine.erase_keys(vec![b"k".to_vec()]).unwrap();
        assert_eq!(copy.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
