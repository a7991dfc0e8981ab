//! Persistent index engine using sled database

use safe_core::{IndexConfig, SafeError, SafeResult};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

use crate::store::{BatchOp, EntryIter, IndexEntry, KvEngine, WriteBatch};

const INDEX_TREE: &str = "appindex";
const META_TREE: &str = "meta";
const SCHEMA_KEY: &[u8] = b"schema_version";

/// Layout version of the keys written into the index tree
pub const SCHEMA_VERSION: u32 = 1;

fn storage_err(e: sled::Error) -> SafeError {
    SafeError::Storage(e.to_string())
}

/// Index engine backed by a dedicated sled tree
pub struct SledEngine {
    db: Db,
    index: Tree,
    flush_on_commit: bool,
}

impl SledEngine {
    pub fn open<P: AsRef<Path>>(path: P, config: &IndexConfig) -> SafeResult<Self> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .cache_capacity(config.cache_capacity_bytes)
            .open()
            .map_err(storage_err)?;
        info!(path = %path.as_ref().display(), "Opened index database");
        Self::from_db(db, config.flush_on_commit)
    }

    /// Throwaway database removed when dropped
    pub fn temporary() -> SafeResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db, false)
    }

    fn from_db(db: Db, flush_on_commit: bool) -> SafeResult<Self> {
        let index = db.open_tree(INDEX_TREE).map_err(storage_err)?;
        let meta = db.open_tree(META_TREE).map_err(storage_err)?;

        match meta.get(SCHEMA_KEY).map_err(storage_err)? {
            Some(bytes) => {
                let stored = <[u8; 4]>::try_from(bytes.as_ref())
                    .map(u32::from_be_bytes)
                    .map_err(|_| SafeError::Storage("corrupt schema version".into()))?;
                if stored != SCHEMA_VERSION {
                    return Err(SafeError::Config(format!(
                        "index schema version {} does not match {}",
                        stored, SCHEMA_VERSION
                    )));
                }
            }
            None => {
                meta.insert(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes()[..])
                    .map_err(storage_err)?;
            }
        }

        Ok(Self {
            db,
            index,
            flush_on_commit,
        })
    }
}

impl KvEngine for SledEngine {
    fn get(&self, key: &[u8]) -> SafeResult<Option<Vec<u8>>> {
        self.index
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(storage_err)
    }

    fn contains(&self, key: &[u8]) -> SafeResult<bool> {
        self.index.contains_key(key).map_err(storage_err)
    }

    fn apply(&self, batch: WriteBatch) -> SafeResult<()> {
        let count = batch.len();
        let mut sled_batch = sled::Batch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => sled_batch.insert(key, value),
                BatchOp::Delete { key } => sled_batch.remove(key),
            }
        }

        self.index.apply_batch(sled_batch).map_err(storage_err)?;
        if self.flush_on_commit {
            self.index.flush().map_err(storage_err)?;
        }
        debug!(ops = count, "Committed index batch");
        Ok(())
    }

    fn scan_from<'a>(&'a self, prefix: &[u8], start: &[u8]) -> SafeResult<EntryIter<'a>> {
        let prefix = prefix.to_vec();
        let iter = self
            .index
            .range(start.to_vec()..)
            .take_while(move |item| match item {
                Ok((k, _)) => k.starts_with(&prefix),
                Err(_) => true,
            })
            .map(|item| {
                item.map(|(k, v)| IndexEntry::new(k.to_vec(), v.to_vec()))
                    .map_err(storage_err)
            });
        Ok(Box::new(iter))
    }

    fn len(&self) -> SafeResult<usize> {
        Ok(self.index.len())
    }

    fn flush(&self) -> SafeResult<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
