//! In-flight pool of admitted but unconfirmed application commands
//!
//! Mirrors only the state that uniqueness and budget checks need. Every
//! insertion is remembered per transaction id so that `remove` undoes
//! exactly what `add` inserted.

use parking_lot::RwLock;
use safe_core::{
    fold_name, AccountId, Address, Amount, AppId, AssetId, Hashable, OutPoint, SafeError,
    SafeResult, TxId,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::codec::AppCommand;
use crate::indexer::{AppBlock, AppTxOut};

/// Default bound on pooled transactions
pub const DEFAULT_MAX_POOL_TXS: usize = 10_000;

/// Confirmed-state limits a command is admitted under
///
/// Pending amounts and counts are added inside the pool lock, so two
/// commands checked against the same confirmed state cannot both use the
/// same room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Headroom {
    #[default]
    Unbounded,
    /// Confirmed supply of the asset an add-issue targets
    Supply { issued: Amount, total: Amount },
    /// Live confirmed offers for the asset a put-candy targets
    Offers { live: usize, max: usize },
    /// Confirmed budget and claims of the offer a get-candy spends
    Claim { offered: Amount, claimed: Amount },
}

/// Single insertion made on behalf of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
enum PoolKey {
    AppName(String),
    AppId(AppId),
    ShortName(String),
    AssetName(String),
    AssetId(AssetId),
    AccountName(String),
    AccountId(AccountId),
    AccountAddress(Address),
    Auth(AppId, Address, u32),
    Issue(AssetId, Amount),
    CandyOffer(AssetId),
    Claim {
        asset_id: AssetId,
        offer: OutPoint,
        address: Address,
        amount: Amount,
    },
}

#[derive(Default)]
struct PoolState {
    order: Vec<TxId>,
    outputs: HashMap<TxId, Vec<AppTxOut>>,
    inserted: HashMap<TxId, Vec<PoolKey>>,

    app_names: HashSet<String>,
    app_ids: HashSet<AppId>,
    short_names: HashSet<String>,
    asset_names: HashSet<String>,
    asset_ids: HashSet<AssetId>,
    account_names: HashSet<String>,
    account_ids: HashSet<AccountId>,
    account_addresses: HashSet<Address>,
    auth_changes: HashSet<(AppId, Address, u32)>,
    issues: HashMap<AssetId, Amount>,
    candy_offers: HashMap<AssetId, usize>,
    claim_totals: HashMap<(AssetId, OutPoint), Amount>,
    claimants: HashSet<(AssetId, OutPoint, Address)>,
}

impl PoolState {
    /// Error if inserting `key` would break a uniqueness rule
    fn conflict(&self, key: &PoolKey) -> Option<SafeError> {
        match key {
            PoolKey::AppName(n) if self.app_names.contains(n) => {
                Some(SafeError::DuplicateAppName(n.clone()))
            }
            PoolKey::AppId(id) if self.app_ids.contains(id) => {
                Some(SafeError::DuplicateAppId(id.to_hex()))
            }
            PoolKey::ShortName(n) if self.short_names.contains(n) => {
                Some(SafeError::DuplicateShortName(n.clone()))
            }
            PoolKey::AssetName(n) if self.asset_names.contains(n) => {
                Some(SafeError::DuplicateAssetName(n.clone()))
            }
            PoolKey::AssetId(id) if self.asset_ids.contains(id) => {
                Some(SafeError::DuplicateAssetId(id.to_hex()))
            }
            PoolKey::AccountName(n) if self.account_names.contains(n) => {
                Some(SafeError::DuplicateAccountName(n.clone()))
            }
            PoolKey::AccountId(id) if self.account_ids.contains(id) => {
                Some(SafeError::DuplicateAccountName(id.to_hex()))
            }
            PoolKey::AccountAddress(a) if self.account_addresses.contains(a) => {
                Some(SafeError::DuplicateAccountAddress(a.to_string()))
            }
            PoolKey::Auth(app, a, auth)
                if self.auth_changes.contains(&(*app, a.clone(), *auth)) =>
            {
                Some(SafeError::AuthAlreadyGranted {
                    address: a.to_string(),
                    auth: *auth,
                })
            }
            PoolKey::Claim {
                asset_id,
                offer,
                address,
                ..
            } if self.claimants.contains(&(*asset_id, *offer, address.clone())) => {
                Some(SafeError::CandyAlreadyClaimed {
                    address: address.to_string(),
                    offer: offer.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Error if the pending totals plus `key` would outgrow `headroom`
    fn over_limit(&self, key: &PoolKey, headroom: Headroom) -> Option<SafeError> {
        match (key, headroom) {
            (PoolKey::Issue(asset, amount), Headroom::Supply { issued, total }) => {
                let pending = self.issues.get(asset).copied().unwrap_or_default();
                let issued = issued.saturating_add(pending);
                if issued.checked_add(*amount).map_or(true, |after| after > total) {
                    return Some(SafeError::ExceedsTotalAmount {
                        requested: amount.0,
                        issued: issued.0,
                        total: total.0,
                    });
                }
                None
            }
            (PoolKey::CandyOffer(asset), Headroom::Offers { live, max }) => {
                let live = live + self.candy_offers.get(asset).copied().unwrap_or(0);
                if live >= max {
                    return Some(SafeError::CandyOfferLimitReached {
                        asset: asset.to_hex(),
                        live,
                    });
                }
                None
            }
            (
                PoolKey::Claim {
                    asset_id,
                    offer,
                    amount,
                    ..
                },
                Headroom::Claim { offered, claimed },
            ) => {
                let pending = self
                    .claim_totals
                    .get(&(*asset_id, *offer))
                    .copied()
                    .unwrap_or_default();
                let remaining = offered.saturating_sub(claimed.saturating_add(pending));
                if *amount > remaining {
                    return Some(SafeError::CandyBudgetExceeded {
                        requested: amount.0,
                        remaining: remaining.0,
                    });
                }
                None
            }
            _ => None,
        }
    }

    fn insert(&mut self, key: &PoolKey) {
        match key.clone() {
            PoolKey::AppName(n) => {
                self.app_names.insert(n);
            }
            PoolKey::AppId(id) => {
                self.app_ids.insert(id);
            }
            PoolKey::ShortName(n) => {
                self.short_names.insert(n);
            }
            PoolKey::AssetName(n) => {
                self.asset_names.insert(n);
            }
            PoolKey::AssetId(id) => {
                self.asset_ids.insert(id);
            }
            PoolKey::AccountName(n) => {
                self.account_names.insert(n);
            }
            PoolKey::AccountId(id) => {
                self.account_ids.insert(id);
            }
            PoolKey::AccountAddress(a) => {
                self.account_addresses.insert(a);
            }
            PoolKey::Auth(app, a, auth) => {
                self.auth_changes.insert((app, a, auth));
            }
            PoolKey::Issue(asset, amount) => {
                let sum = self.issues.entry(asset).or_default();
                *sum = sum.saturating_add(amount);
            }
            PoolKey::CandyOffer(asset) => {
                *self.candy_offers.entry(asset).or_insert(0) += 1;
            }
            PoolKey::Claim {
                asset_id,
                offer,
                address,
                amount,
            } => {
                let sum = self.claim_totals.entry((asset_id, offer)).or_default();
                *sum = sum.saturating_add(amount);
                self.claimants.insert((asset_id, offer, address));
            }
        }
    }

    fn undo(&mut self, key: PoolKey) {
        match key {
            PoolKey::AppName(n) => {
                self.app_names.remove(&n);
            }
            PoolKey::AppId(id) => {
                self.app_ids.remove(&id);
            }
            PoolKey::ShortName(n) => {
                self.short_names.remove(&n);
            }
            PoolKey::AssetName(n) => {
                self.asset_names.remove(&n);
            }
            PoolKey::AssetId(id) => {
                self.asset_ids.remove(&id);
            }
            PoolKey::AccountName(n) => {
                self.account_names.remove(&n);
            }
            PoolKey::AccountId(id) => {
                self.account_ids.remove(&id);
            }
            PoolKey::AccountAddress(a) => {
                self.account_addresses.remove(&a);
            }
            PoolKey::Auth(app, a, auth) => {
                self.auth_changes.remove(&(app, a, auth));
            }
            PoolKey::Issue(asset, amount) => {
                if let Some(sum) = self.issues.get_mut(&asset) {
                    *sum = sum.saturating_sub(amount);
                    if sum.is_zero() {
                        self.issues.remove(&asset);
                    }
                }
            }
            PoolKey::CandyOffer(asset) => {
                if let Some(count) = self.candy_offers.get_mut(&asset) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.candy_offers.remove(&asset);
                    }
                }
            }
            PoolKey::Claim {
                asset_id,
                offer,
                address,
                amount,
            } => {
                if let Some(sum) = self.claim_totals.get_mut(&(asset_id, offer)) {
                    *sum = sum.saturating_sub(amount);
                    if sum.is_zero() {
                        self.claim_totals.remove(&(asset_id, offer));
                    }
                }
                self.claimants.remove(&(asset_id, offer, address));
            }
        }
    }
}

fn pool_keys(tx: &AppTxOut) -> Vec<PoolKey> {
    let app_id = tx.message.header.app_id;
    match tx.command() {
        AppCommand::RegisterApp { profile, .. } => vec![
            PoolKey::AppName(fold_name(&profile.name)),
            PoolKey::AppId(profile.id()),
        ],
        AppCommand::GrantAuth { grant, .. } | AppCommand::RevokeAuth { grant, .. } => {
            vec![PoolKey::Auth(app_id, grant.address.clone(), grant.auth)]
        }
        AppCommand::IssueAsset(profile) => {
            let id = profile.id();
            let mut keys = vec![
                PoolKey::ShortName(fold_name(&profile.short_name)),
                PoolKey::AssetName(fold_name(&profile.name)),
                PoolKey::AssetId(id),
            ];
            if profile.pays_candy {
                keys.push(PoolKey::CandyOffer(id));
            }
            keys
        }
        AppCommand::AddIssue(r) => vec![PoolKey::Issue(r.asset_id, r.amount)],
        AppCommand::PutCandy(offer) => vec![PoolKey::CandyOffer(offer.asset_id)],
        AppCommand::GetCandy(claim) => match tx.candy_source {
            Some(offer) => vec![PoolKey::Claim {
                asset_id: claim.asset_id,
                offer,
                address: tx.address.clone(),
                amount: claim.amount,
            }],
            None => Vec::new(),
        },
        AppCommand::RegisterAccount(profile) => vec![
            PoolKey::AccountName(fold_name(&profile.name)),
            PoolKey::AccountId(profile.id()),
            PoolKey::AccountAddress(profile.safe_address.clone()),
        ],
        AppCommand::Extend(_)
        | AppCommand::TransferAsset(_)
        | AppCommand::DestroyAsset(_)
        | AppCommand::ChangeAsset(_)
        | AppCommand::TransferSafe(_) => Vec::new(),
    }
}

/// Pending application commands
pub struct PendingPool {
    state: RwLock<PoolState>,
    max_txs: usize,
}

impl Default for PendingPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOL_TXS)
    }
}

impl PendingPool {
    pub fn new(max_txs: usize) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            max_txs,
        }
    }

    /// Add one output. Returns `Ok(false)` when the pool is full.
    ///
    /// A uniqueness conflict with an already pooled command, or pending
    /// totals outgrowing `headroom`, is an error and leaves the pool
    /// untouched.
    pub fn add(&self, tx: AppTxOut, headroom: Headroom) -> SafeResult<bool> {
        let txid = tx.txid();
        let keys = pool_keys(&tx);
        let mut state = self.state.write();

        if !state.outputs.contains_key(&txid) && state.order.len() >= self.max_txs {
            warn!("Pending pool full, command rejected");
            return Ok(false);
        }

        // Also catches a conflict between two keys of the same command
        let mut staged = PoolState::default();
        for key in &keys {
            let err = state
                .conflict(key)
                .or_else(|| staged.conflict(key))
                .or_else(|| state.over_limit(key, headroom));
            if let Some(err) = err {
                debug!(txid = %txid, error = %err, "Pooled command conflicts");
                return Err(err);
            }
            staged.insert(key);
        }

        for key in &keys {
            state.insert(key);
        }
        if !state.outputs.contains_key(&txid) {
            state.order.push(txid);
        }
        state.inserted.entry(txid).or_default().extend(keys);
        state.outputs.entry(txid).or_default().push(tx);

        debug!(txid = %txid, "Added command to pending pool");
        Ok(true)
    }

    /// Drop a transaction and everything it inserted
    pub fn remove(&self, txid: &TxId) -> Option<Vec<AppTxOut>> {
        let mut state = self.state.write();
        let outputs = state.outputs.remove(txid)?;
        for key in state.inserted.remove(txid).unwrap_or_default() {
            state.undo(key);
        }
        state.order.retain(|id| id != txid);
        debug!(txid = %txid, "Removed command from pending pool");
        Some(outputs)
    }

    /// Forget every transaction a connected block confirmed
    pub fn remove_block(&self, block: &AppBlock) {
        let txids: HashSet<TxId> = block.outputs.iter().map(AppTxOut::txid).collect();
        for txid in txids {
            self.remove(&txid);
        }
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.state.read().outputs.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pooled outputs in admission order
    pub fn outputs(&self) -> Vec<AppTxOut> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.outputs.get(id))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn has_app_name(&self, name: &str) -> bool {
        self.state.read().app_names.contains(&fold_name(name))
    }

    pub fn has_app_id(&self, id: &AppId) -> bool {
        self.state.read().app_ids.contains(id)
    }

    pub fn has_short_name(&self, name: &str) -> bool {
        self.state.read().short_names.contains(&fold_name(name))
    }

    pub fn has_asset_name(&self, name: &str) -> bool {
        self.state.read().asset_names.contains(&fold_name(name))
    }

    pub fn has_asset_id(&self, id: &AssetId) -> bool {
        self.state.read().asset_ids.contains(id)
    }

    pub fn has_account_name(&self, name: &str) -> bool {
        self.state.read().account_names.contains(&fold_name(name))
    }

    pub fn has_account_address(&self, address: &Address) -> bool {
        self.state.read().account_addresses.contains(address)
    }

    pub fn has_auth_change(&self, app_id: &AppId, address: &Address, auth: u32) -> bool {
        self.state
            .read()
            .auth_changes
            .contains(&(*app_id, address.clone(), auth))
    }

    /// Supply added by pooled add-issue commands
    pub fn pending_issue(&self, asset_id: &AssetId) -> Amount {
        self.state
            .read()
            .issues
            .get(asset_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn pending_offers(&self, asset_id: &AssetId) -> usize {
        self.state
            .read()
            .candy_offers
            .get(asset_id)
            .copied()
            .unwrap_or(0)
    }

    /// Amount pooled claims would take from one offer
    pub fn pending_claim_total(&self, asset_id: &AssetId, offer: &OutPoint) -> Amount {
        self.state
            .read()
            .claim_totals
            .get(&(*asset_id, *offer))
            .copied()
            .unwrap_or_default()
    }

    pub fn has_claimant(&self, asset_id: &AssetId, offer: &OutPoint, address: &Address) -> bool {
        self.state
            .read()
            .claimants
            .contains(&(*asset_id, *offer, address.clone()))
    }
}
