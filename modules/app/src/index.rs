//! Typed application index store
//!
//! Single writer, many readers. Block connect and disconnect take the tip
//! lock in write mode for the whole compute-and-commit of one batch. Readers
//! hold it in read mode for their lifetime, so no partial block is observable.

use parking_lot::RwLock;
use safe_core::{EngineKind, Height, NodeConfig, ProtocolConfig, SafeError, SafeResult};
use safe_state::{IndexSnapshot, IndexTag, KvEngine, MemoryEngine, SledEngine, WriteBatch};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::indexer::{AppBlock, BlockIndexer, BlockMutations};
use crate::mempool::PendingPool;
use crate::query::IndexReader;

/// Store-level key holding the last connected height. The zero byte is no
/// index tag, so scans and snapshots never see it.
const TIP_KEY: &[u8] = b"\x00tip";

/// Prefix of the per-block parent links, `PARENT_PREFIX | height:u32 BE`.
/// The value is the previous tip, or empty for the first connected block.
const PARENT_PREFIX: &[u8] = b"\x00prev";

fn parent_key(height: Height) -> Vec<u8> {
    let mut key = PARENT_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

#[derive(Debug, Default)]
pub(crate) struct TipState {
    tip: Option<Height>,
}

/// Per-index entry counts
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexStats {
    pub tip: Option<Height>,
    pub entries: usize,
    pub by_index: BTreeMap<String, usize>,
    pub root: String,
}

/// Application and asset index over one key-value engine
pub struct AppIndexStore {
    engine: Arc<dyn KvEngine>,
    state: RwLock<TipState>,
    indexer: BlockIndexer,
    protocol: ProtocolConfig,
}

impl AppIndexStore {
    pub fn new(engine: Arc<dyn KvEngine>, protocol: ProtocolConfig) -> SafeResult<Self> {
        let tip = read_tip(engine.as_ref())?;
        Ok(Self {
            engine,
            state: RwLock::new(TipState { tip }),
            indexer: BlockIndexer::new(),
            protocol,
        })
    }

    pub fn in_memory(protocol: ProtocolConfig) -> Self {
        Self {
            engine: Arc::new(MemoryEngine::new()),
            state: RwLock::new(TipState::default()),
            indexer: BlockIndexer::new(),
            protocol,
        }
    }

    /// Open the store described by the node configuration
    pub fn open(config: &NodeConfig) -> SafeResult<Self> {
        let engine: Arc<dyn KvEngine> = match config.index.engine {
            EngineKind::Memory => Arc::new(MemoryEngine::new()),
            EngineKind::Sled => Arc::new(SledEngine::open(config.index_path(), &config.index)?),
        };
        let store = Self::new(engine, config.protocol.clone())?;
        info!(
            engine = ?config.index.engine,
            tip = ?store.tip(),
            "Opened application index"
        );
        Ok(store)
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    pub fn engine(&self) -> &dyn KvEngine {
        self.engine.as_ref()
    }

    /// Last connected height
    pub fn tip(&self) -> Option<Height> {
        self.state.read().tip
    }

    /// Compute and commit the mutations of the next block
    pub fn connect_block(&self, block: &AppBlock) -> SafeResult<BlockMutations> {
        let mut state = self.state.write();
        if let Some(tip) = state.tip {
            if block.height <= tip {
                warn!(height = block.height.0, tip = tip.0, "Refusing to connect block below tip");
                return Err(SafeError::NotIndexTip {
                    got: block.height.0,
                    tip: tip.0,
                });
            }
        }

        let mutations = self.indexer.mutations(block)?;
        let mut batch = mutations.batch.clone();
        let parent = state.tip.map(|h| h.to_be_bytes().to_vec()).unwrap_or_default();
        batch.put(parent_key(block.height), parent);
        batch.put(TIP_KEY.to_vec(), block.height.to_be_bytes().to_vec());
        self.engine.apply(batch)?;
        state.tip = Some(block.height);

        info!(
            height = block.height.0,
            outputs = block.outputs.len(),
            entries = mutations.len(),
            "Connected block to application index"
        );
        Ok(mutations)
    }

    /// Erase the mutations of the tip block
    pub fn disconnect_block(&self, block: &AppBlock) -> SafeResult<BlockMutations> {
        let mut state = self.state.write();
        if state.tip != Some(block.height) {
            let tip = state.tip.map(|h| h.0).unwrap_or(0);
            warn!(height = block.height.0, tip, "Refusing to disconnect block that is not the tip");
            return Err(SafeError::NotIndexTip {
                got: block.height.0,
                tip,
            });
        }

        let mutations = self.indexer.mutations(block)?;
        let previous = self.parent_of(block.height)?;
        let mut batch = WriteBatch::new();
        for key in mutations.keys() {
            batch.delete(key);
        }
        batch.delete(parent_key(block.height));
        match previous {
            Some(h) => batch.put(TIP_KEY.to_vec(), h.to_be_bytes().to_vec()),
            None => batch.delete(TIP_KEY.to_vec()),
        }
        self.engine.apply(batch)?;

        state.tip = previous;

        info!(
            height = block.height.0,
            entries = mutations.len(),
            "Disconnected block from application index"
        );
        Ok(mutations)
    }

    /// Commit precomputed mutations without tip bookkeeping
    pub fn write_batch(&self, mutations: &BlockMutations) -> SafeResult<()> {
        let _guard = self.state.write();
        debug!(height = mutations.height.0, entries = mutations.len(), "Writing index batch");
        self.engine.apply(mutations.batch.clone())
    }

    /// Remove exactly the keys a prior `write_batch` added
    pub fn erase_batch(&self, mutations: &BlockMutations) -> SafeResult<()> {
        let _guard = self.state.write();
        debug!(height = mutations.height.0, entries = mutations.len(), "Erasing index batch");
        self.engine.erase_keys(mutations.keys())
    }

    /// Reader gated at `height`. Holds the shared lock until dropped.
    pub fn reader(&self, height: Height) -> IndexReader<'_> {
        IndexReader::new(self, self.state.read(), height)
    }

    /// Reader gated at the current tip
    pub fn tip_reader(&self) -> IndexReader<'_> {
        let guard = self.state.read();
        let height = guard.tip.unwrap_or_default();
        IndexReader::new(self, guard, height)
    }

    /// Reader that also consults the in-flight pool
    pub fn pending_reader<'a>(&'a self, height: Height, pool: &'a PendingPool) -> IndexReader<'a> {
        self.reader(height).with_pending(pool)
    }

    pub fn snapshot(&self) -> SafeResult<IndexSnapshot> {
        let state = self.state.read();
        IndexSnapshot::capture(self.engine.as_ref(), state.tip)
    }

    pub fn stats(&self) -> SafeResult<IndexStats> {
        let snapshot = self.snapshot()?;
        let by_index = snapshot
            .counts_by_tag()
            .into_iter()
            .map(|(tag, n)| (tag.name().to_string(), n))
            .collect();
        Ok(IndexStats {
            tip: snapshot.tip,
            entries: snapshot.len(),
            by_index,
            root: snapshot.root.to_hex(),
        })
    }

    /// Entry count of one logical index
    pub fn count(&self, tag: IndexTag) -> SafeResult<usize> {
        let _guard = self.state.read();
        let mut n = 0;
        for entry in self.engine.scan_prefix(&tag.prefix())? {
            entry?;
            n += 1;
        }
        Ok(n)
    }

    pub fn flush(&self) -> SafeResult<()> {
        self.engine.flush()
    }

    /// Tip that was current before `height` was connected
    fn parent_of(&self, height: Height) -> SafeResult<Option<Height>> {
        let bytes = self.engine.get(&parent_key(height))?.ok_or_else(|| {
            SafeError::Storage(format!("missing parent link for height {}", height.0))
        })?;
        if bytes.is_empty() {
            return Ok(None);
        }
        decode_height(&bytes).map(Some)
    }
}

fn decode_height(bytes: &[u8]) -> SafeResult<Height> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| SafeError::Storage("corrupt height in index metadata".into()))?;
    Ok(Height(u32::from_be_bytes(arr)))
}

fn read_tip(engine: &dyn KvEngine) -> SafeResult<Option<Height>> {
    engine.get(TIP_KEY)?.map(|bytes| decode_height(&bytes)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AppCommand, AppMessage};
    use crate::entity::*;
    use crate::indexer::AppTxOut;
    use safe_core::{Address, Hash256, OutPoint};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn app_block(height: u32, name: &str) -> AppBlock {
        let profile = AppProfile {
            name: name.into(),
            description: "test app".into(),
            developer_type: DeveloperType::Personal,
            developer_name: "dev".into(),
            web_url: String::new(),
            logo_url: String::new(),
            cover_url: String::new(),
        };
        let message = AppMessage::new(
            1,
            Hash256::ZERO,
            AppCommand::RegisterApp {
                admin: addr("Xadmin"),
                profile,
            },
        );
        let tx = AppTxOut::new(
            OutPoint::new(Hash256([height as u8; 32]), 0),
            addr("Xadmin"),
            addr("Xadmin"),
            message,
        );
        AppBlock::new(Height(height), vec![tx])
    }

    #[test]
    fn test_connect_and_disconnect_are_lifo() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        store.connect_block(&app_block(10, "One")).unwrap();
        store.connect_block(&app_block(11, "Two")).unwrap();
        assert_eq!(store.tip(), Some(Height(11)));

        assert!(matches!(
            store.connect_block(&app_block(11, "Three")),
            Err(SafeError::NotIndexTip { got: 11, tip: 11 })
        ));
        assert!(matches!(
            store.disconnect_block(&app_block(10, "One")),
            Err(SafeError::NotIndexTip { .. })
        ));

        store.disconnect_block(&app_block(11, "Two")).unwrap();
        assert_eq!(store.tip(), Some(Height(10)));
        store.disconnect_block(&app_block(10, "One")).unwrap();
        assert_eq!(store.tip(), None);
        assert_eq!(store.count(IndexTag::AppInfo).unwrap(), 0);
        assert_eq!(store.engine().len().unwrap(), 0);
    }

    #[test]
    fn test_tip_survives_reopen() {
        let engine = Arc::new(MemoryEngine::new());
        {
            let store = AppIndexStore::new(engine.clone(), ProtocolConfig::default()).unwrap();
            store.connect_block(&app_block(7, "One")).unwrap();
        }
        let store = AppIndexStore::new(engine, ProtocolConfig::default()).unwrap();
        assert_eq!(store.tip(), Some(Height(7)));
    }

    #[test]
    fn test_disconnect_across_reopen_follows_parent_links() {
        let engine = Arc::new(MemoryEngine::new());
        {
            let store = AppIndexStore::new(engine.clone(), ProtocolConfig::default()).unwrap();
            store.connect_block(&app_block(10, "One")).unwrap();
            store.connect_block(&app_block(20, "Two")).unwrap();
        }

        let store = AppIndexStore::new(engine, ProtocolConfig::default()).unwrap();
        store.disconnect_block(&app_block(20, "Two")).unwrap();
        assert_eq!(store.tip(), Some(Height(10)));
        store.disconnect_block(&app_block(10, "One")).unwrap();
        assert_eq!(store.tip(), None);
        assert_eq!(store.engine().len().unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        store.connect_block(&app_block(3, "One")).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.tip, Some(Height(3)));
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.by_index.get("appid_appinfo"), Some(&1));
    }

    #[test]
    fn test_write_and_erase_batch() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        let before = store.snapshot().unwrap();
        let mutations = BlockIndexer::new().mutations(&app_block(5, "One")).unwrap();
        store.write_batch(&mutations).unwrap();
        assert_eq!(store.count(IndexTag::AppName).unwrap(), 1);
        store.erase_batch(&mutations).unwrap();
        assert!(store.snapshot().unwrap().diff(&before).is_empty());
    }
}
