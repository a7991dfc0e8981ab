//! Node runtime combining the index, the pending pool and the validator

use parking_lot::Mutex;
use safe_app::{
    AppBlock, AppIndexStore, AppTxOut, BlockMutations, CommandValidator, IndexReader, IndexStats,
    PendingPool,
};
use safe_core::{
    Address, ChainHeight, Height, NodeConfig, OutPoint, SafeError, SafeResult, ShutdownSignal,
    TxId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blocks kept for disconnecting the tip
const MAX_RECENT_BLOCKS: usize = 100;

/// Best height taken from the index tip
pub struct IndexTip(Arc<AppIndexStore>);

impl ChainHeight for IndexTip {
    fn best_height(&self) -> Height {
        self.0.tip().unwrap_or_default()
    }
}

/// Node runtime managing the index components
pub struct NodeRuntime {
    config: NodeConfig,
    store: Arc<AppIndexStore>,
    pool: PendingPool,
    validator: CommandValidator,
    chain: Arc<dyn ChainHeight>,
    recent: Mutex<Vec<AppBlock>>,
    shutdown: ShutdownSignal,
}

impl NodeRuntime {
    /// Open the index described by `config`
    pub fn new(config: NodeConfig) -> SafeResult<Self> {
        let store = Arc::new(AppIndexStore::open(&config)?);
        let chain: Arc<dyn ChainHeight> = Arc::new(IndexTip(store.clone()));
        let validator = CommandValidator::new(config.protocol.clone());
        info!(name = %config.name, data_dir = %config.data_dir.display(), "Node runtime ready");
        Ok(Self {
            config,
            store,
            pool: PendingPool::default(),
            validator,
            chain,
            recent: Mutex::new(Vec::new()),
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Gate reads by an external chain instead of the index tip
    pub fn with_chain(mut self, chain: Arc<dyn ChainHeight>) -> Self {
        self.chain = chain;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AppIndexStore> {
        &self.store
    }

    pub fn pool(&self) -> &PendingPool {
        &self.pool
    }

    pub fn best_height(&self) -> Height {
        self.chain.best_height()
    }

    /// Reader at the best height that stops scanning on shutdown
    pub fn reader(&self) -> IndexReader<'_> {
        self.reader_at(self.best_height())
    }

    pub fn reader_at(&self, height: Height) -> IndexReader<'_> {
        self.store
            .reader(height)
            .with_pending(&self.pool)
            .with_shutdown(self.shutdown.clone())
    }

    /// Validate a command for the next block and pool it
    pub fn submit(&self, tx: AppTxOut) -> SafeResult<TxId> {
        let txid = tx.txid();
        let height = self.best_height().next();
        match self.validator.admit(&self.store, &self.pool, height, tx) {
            Ok(true) => Ok(txid),
            Ok(false) => Err(SafeError::Internal("pending pool is full".into())),
            Err(e) => {
                warn!(txid = %txid, error = %e, "Rejected application command");
                Err(e)
            }
        }
    }

    /// Decode a sealed reserve field and submit it
    pub fn submit_reserve(
        &self,
        out: OutPoint,
        address: Address,
        sender: Address,
        reserve: &[u8],
    ) -> SafeResult<TxId> {
        self.submit(AppTxOut::from_reserve(out, address, sender, reserve)?)
    }

    /// Connect a block produced elsewhere
    pub fn connect_block(&self, block: AppBlock) -> SafeResult<BlockMutations> {
        let mutations = self.store.connect_block(&block)?;
        self.pool.remove_block(&block);

        let mut recent = self.recent.lock();
        recent.push(block);
        if recent.len() > MAX_RECENT_BLOCKS {
            recent.remove(0);
        }
        Ok(mutations)
    }

    /// Put every pooled command into a block at the next height
    pub fn mine_block(&self) -> SafeResult<Option<BlockMutations>> {
        let outputs = self.pool.outputs();
        if outputs.is_empty() {
            return Ok(None);
        }
        let height = self.store.tip().map_or(Height::GENESIS, |h| h.next());
        debug!(height = height.0, outputs = outputs.len(), "Building block from pending pool");
        self.connect_block(AppBlock::new(height, outputs)).map(Some)
    }

    /// Disconnect the tip block and return its commands to the pool
    pub fn disconnect_tip(&self) -> SafeResult<Option<Height>> {
        let mut recent = self.recent.lock();
        let Some(block) = recent.pop() else {
            return Ok(None);
        };
        if let Err(e) = self.store.disconnect_block(&block) {
            recent.push(block);
            return Err(e);
        }
        drop(recent);

        let height = self.best_height().next();
        for tx in block.outputs {
            if let Err(e) = self.validator.admit(&self.store, &self.pool, height, tx) {
                debug!(error = %e, "Dropped disconnected command");
            }
        }
        Ok(Some(block.height))
    }

    pub fn stats(&self) -> SafeResult<IndexStats> {
        self.store.stats()
    }

    /// Stop long scans and flush the engine
    pub fn shutdown(&self) -> SafeResult<()> {
        self.shutdown.trigger();
        self.store.flush()?;
        info!("Node runtime stopped");
        Ok(())
    }
}
