//! Query and uniqueness layer
//!
//! Every read goes through an [`IndexReader`], which fixes the visibility
//! height and holds the store's shared lock. Entries recorded above that
//! height are skipped here; the engine below never looks at heights.

use parking_lot::RwLockReadGuard;
use safe_core::{
    fold_name, AccountId, Address, Amount, AppId, AssetId, Hash256, Height, OutPoint, SafeError,
    SafeResult, ShutdownSignal,
};
use safe_state::{
    AuthKey, CandyClaimKey, CandyOfferKey, ClaimTotalKey, EntityTxKey, HeightKey, IdKey,
    IndexEntry, IndexTag, KvEngine, NameKey, PrefixScan,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::entity::ALL_USER;
use crate::index::{AppIndexStore, TipState};
use crate::mempool::PendingPool;
use crate::records::*;

/// One app-tx index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppTxEntry {
    pub app_id: AppId,
    pub address: Address,
    pub class: AppTxClass,
    pub out: OutPoint,
    pub height: Height,
}

/// One asset-tx index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetTxEntry {
    pub asset_id: AssetId,
    pub address: Address,
    pub class: AssetTxClass,
    pub out: OutPoint,
    pub amount: Amount,
    pub height: Height,
}

/// One grant or revoke recorded for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthEntry {
    pub auth: u32,
    pub action: AuthAction,
    pub height: Height,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandyOfferEntry {
    pub asset_id: AssetId,
    pub out: OutPoint,
    pub offer: CandyOfferRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandyClaimEntry {
    pub asset_id: AssetId,
    pub out: OutPoint,
    pub address: Address,
    pub amount: Amount,
    pub height: Height,
}

/// Height-gated view of the index
pub struct IndexReader<'a> {
    store: &'a AppIndexStore,
    _guard: RwLockReadGuard<'a, TipState>,
    height: Height,
    pending: Option<&'a PendingPool>,
    shutdown: Option<ShutdownSignal>,
}

impl<'a> IndexReader<'a> {
    pub(crate) fn new(
        store: &'a AppIndexStore,
        guard: RwLockReadGuard<'a, TipState>,
        height: Height,
    ) -> Self {
        Self {
            store,
            _guard: guard,
            height,
            pending: None,
            shutdown: None,
        }
    }

    /// Consult this pool when a check asks for in-flight commands
    pub fn with_pending(mut self, pool: &'a PendingPool) -> Self {
        self.pending = Some(pool);
        self
    }

    /// Abort long scans once `signal` fires
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn store(&self) -> &'a AppIndexStore {
        self.store
    }

    pub fn pending(&self) -> Option<&'a PendingPool> {
        self.pending
    }

    fn engine(&self) -> &'a dyn KvEngine {
        self.store.engine()
    }

    /// Point read, `None` when absent or not yet visible
    fn read_point<T: DeserializeOwned + HeightGated>(&self, key: &[u8]) -> SafeResult<Option<T>> {
        match self.engine().get(key)? {
            Some(bytes) => {
                let value: T = from_bytes(&bytes)?;
                Ok(value.visible_at(self.height).then_some(value))
            }
            None => Ok(None),
        }
    }

    fn scan(&self, prefix: &[u8]) -> SafeResult<PrefixScan<'a>> {
        let scan = PrefixScan::new(self.engine(), prefix)?;
        Ok(match &self.shutdown {
            Some(signal) => scan.with_shutdown(signal.clone()),
            None => scan,
        })
    }

    /// Visible entries under `prefix`, in key order
    fn scan_visible<T: DeserializeOwned + HeightGated>(
        &self,
        prefix: &[u8],
    ) -> SafeResult<Vec<(Vec<u8>, T)>> {
        let mut out = Vec::new();
        for entry in self.scan(prefix)? {
            let IndexEntry { key, value } = entry?;
            let value: T = from_bytes(&value)?;
            if value.visible_at(self.height) {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    fn name_lookup(&self, tag: IndexTag, name: &str) -> SafeResult<Option<Hash256>> {
        let key = NameKey::new(tag, fold_name(name)).encode();
        Ok(self.read_point::<NameRecord>(&key)?.map(|r| r.id))
    }

    fn in_flight(&self, include: bool, check: impl FnOnce(&PendingPool) -> bool) -> bool {
        include && self.pending.is_some_and(check)
    }

    // ============ Point lookups ============

    pub fn app_info(&self, app_id: &AppId) -> SafeResult<Option<AppInfoRecord>> {
        self.read_point(&IdKey::new(IndexTag::AppInfo, *app_id).encode())
    }

    pub fn app_id_by_name(&self, name: &str) -> SafeResult<Option<AppId>> {
        self.name_lookup(IndexTag::AppName, name)
    }

    pub fn asset_info(&self, asset_id: &AssetId) -> SafeResult<Option<AssetInfoRecord>> {
        self.read_point(&IdKey::new(IndexTag::AssetInfo, *asset_id).encode())
    }

    pub fn asset_id_by_name(&self, name: &str) -> SafeResult<Option<AssetId>> {
        self.name_lookup(IndexTag::AssetName, name)
    }

    pub fn asset_id_by_short_name(&self, short_name: &str) -> SafeResult<Option<AssetId>> {
        self.name_lookup(IndexTag::AssetShortName, short_name)
    }

    pub fn virtual_account_info(&self, id: &AccountId) -> SafeResult<Option<AccountInfoRecord>> {
        self.read_point(&IdKey::new(IndexTag::AccountInfo, *id).encode())
    }

    pub fn virtual_account_id_by_name(&self, name: &str) -> SafeResult<Option<AccountId>> {
        self.name_lookup(IndexTag::AccountName, name)
    }

    pub fn virtual_account_by_address(
        &self,
        address: &Address,
    ) -> SafeResult<Option<AccountInfoRecord>> {
        let key = NameKey::new(IndexTag::AccountAddress, address.as_str()).encode();
        match self.read_point::<NameRecord>(&key)? {
            Some(rec) => self.virtual_account_info(&rec.id),
            None => Ok(None),
        }
    }

    // ============ Existence ============

    pub fn exists_app_name(&self, name: &str, include_in_flight: bool) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_app_name(name)) {
            return Ok(true);
        }
        Ok(self.app_id_by_name(name)?.is_some())
    }

    pub fn exists_app_id(&self, app_id: &AppId, include_in_flight: bool) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_app_id(app_id)) {
            return Ok(true);
        }
        Ok(self.app_info(app_id)?.is_some())
    }

    pub fn exists_short_name(&self, short_name: &str, include_in_flight: bool) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_short_name(short_name)) {
            return Ok(true);
        }
        Ok(self.asset_id_by_short_name(short_name)?.is_some())
    }

    pub fn exists_asset_name(&self, name: &str, include_in_flight: bool) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_asset_name(name)) {
            return Ok(true);
        }
        Ok(self.asset_id_by_name(name)?.is_some())
    }

    pub fn exists_asset_id(&self, asset_id: &AssetId, include_in_flight: bool) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_asset_id(asset_id)) {
            return Ok(true);
        }
        Ok(self.asset_info(asset_id)?.is_some())
    }

    pub fn exists_virtual_account_name(
        &self,
        name: &str,
        include_in_flight: bool,
    ) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_account_name(name)) {
            return Ok(true);
        }
        Ok(self.virtual_account_id_by_name(name)?.is_some())
    }

    pub fn exists_virtual_account_address(
        &self,
        address: &Address,
        include_in_flight: bool,
    ) -> SafeResult<bool> {
        if self.in_flight(include_in_flight, |p| p.has_account_address(address)) {
            return Ok(true);
        }
        let key = NameKey::new(IndexTag::AccountAddress, address.as_str()).encode();
        Ok(self.read_point::<NameRecord>(&key)?.is_some())
    }

    // ============ Enumerations ============

    pub fn list_apps(&self) -> SafeResult<Vec<(AppId, AppInfoRecord)>> {
        self.list_ids(IndexTag::AppInfo)
    }

    pub fn list_assets(&self) -> SafeResult<Vec<(AssetId, AssetInfoRecord)>> {
        self.list_ids(IndexTag::AssetInfo)
    }

    pub fn list_virtual_accounts(&self) -> SafeResult<Vec<(AccountId, AccountInfoRecord)>> {
        self.list_ids(IndexTag::AccountInfo)
    }

    fn list_ids<T: DeserializeOwned + HeightGated>(
        &self,
        tag: IndexTag,
    ) -> SafeResult<Vec<(Hash256, T)>> {
        self.scan_visible::<T>(&tag.prefix())?
            .into_iter()
            .map(|(key, value)| Ok::<_, SafeError>((IdKey::decode(tag, &key)?.id, value)))
            .collect()
    }

    /// App-tx entries of one application, optionally narrowed to an address
    pub fn app_txs(
        &self,
        app_id: &AppId,
        address: Option<&Address>,
    ) -> SafeResult<Vec<AppTxEntry>> {
        let prefix = match address {
            Some(a) => EntityTxKey::prefix_id_address(IndexTag::AppTx, app_id, a),
            None => EntityTxKey::prefix_id(IndexTag::AppTx, app_id),
        };
        self.scan_visible::<HeightRecord>(&prefix)?
            .into_iter()
            .filter_map(|(key, rec)| app_tx_entry(&key, rec).transpose())
            .collect()
    }

    /// Asset-tx entries of one asset, optionally narrowed to an address
    pub fn asset_txs(
        &self,
        asset_id: &AssetId,
        address: Option<&Address>,
        filter: AssetTxFilter,
    ) -> SafeResult<Vec<AssetTxEntry>> {
        let prefix = match address {
            Some(a) => EntityTxKey::prefix_id_address(IndexTag::AssetTx, asset_id, a),
            None => EntityTxKey::prefix_id(IndexTag::AssetTx, asset_id),
        };
        let mut out = Vec::new();
        for (key, rec) in self.scan_visible::<AmountRecord>(&prefix)? {
            if let Some(entry) = asset_tx_entry(&key, rec)? {
                if filter.accepts(entry.class) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    /// Every asset the address has a visible asset-tx entry for
    pub fn assets_by_address(&self, address: &Address) -> SafeResult<BTreeSet<AssetId>> {
        let mut ids = BTreeSet::new();
        for (key, _) in self.scan_visible::<AmountRecord>(&IndexTag::AssetTx.prefix())? {
            let key = EntityTxKey::decode(IndexTag::AssetTx, &key)?;
            if key.address == *address {
                ids.insert(key.id);
            }
        }
        Ok(ids)
    }

    /// Every application the address has a visible app-tx entry for
    pub fn apps_by_address(&self, address: &Address) -> SafeResult<BTreeSet<AppId>> {
        let mut ids = BTreeSet::new();
        for (key, _) in self.scan_visible::<HeightRecord>(&IndexTag::AppTx.prefix())? {
            let key = EntityTxKey::decode(IndexTag::AppTx, &key)?;
            if key.address == *address {
                ids.insert(key.id);
            }
        }
        Ok(ids)
    }

    // ============ Authorization ============

    /// Visible grants and revokes for an address, oldest first
    pub fn auth_actions(&self, app_id: &AppId, address: &Address) -> SafeResult<Vec<AuthEntry>> {
        self.scan_visible::<AuthRecord>(&AuthKey::prefix_address(app_id, address))?
            .into_iter()
            .map(|(key, rec)| {
                let key = AuthKey::decode(&key)?;
                Ok::<_, SafeError>(AuthEntry {
                    auth: key.auth,
                    action: rec.action,
                    height: key.height,
                    position: key.position,
                })
            })
            .collect()
    }

    /// Last visible action for one mask
    pub fn auth_state(
        &self,
        app_id: &AppId,
        address: &Address,
        auth: u32,
    ) -> SafeResult<Option<AuthAction>> {
        let prefix = AuthKey::prefix_auth(app_id, address, auth);
        let actions = self.scan_visible::<AuthRecord>(&prefix)?;
        Ok(actions.last().map(|(_, rec)| rec.action))
    }

    /// Masks whose last visible action is a grant
    pub fn granted_auths(&self, app_id: &AppId, address: &Address) -> SafeResult<BTreeSet<u32>> {
        let mut granted = BTreeSet::new();
        for entry in self.auth_actions(app_id, address)? {
            match entry.action {
                AuthAction::Grant => granted.insert(entry.auth),
                AuthAction::Revoke => granted.remove(&entry.auth),
            };
        }
        Ok(granted)
    }

    /// The admin holds every mask; others need a grant to themselves or to all users
    pub fn has_auth(&self, app_id: &AppId, address: &Address, auth: u32) -> SafeResult<bool> {
        let Some(info) = self.app_info(app_id)? else {
            return Ok(false);
        };
        if info.admin == *address {
            return Ok(true);
        }
        if self.auth_state(app_id, address, auth)? == Some(AuthAction::Grant) {
            return Ok(true);
        }
        let everyone = Address::new(ALL_USER)?;
        Ok(self.auth_state(app_id, &everyone, auth)? == Some(AuthAction::Grant))
    }

    // ============ Supply ============

    /// Sum of visible issue and add-issue amounts
    pub fn issued_supply(&self, asset_id: &AssetId) -> SafeResult<Amount> {
        Ok(self
            .asset_txs(asset_id, None, AssetTxFilter::All)?
            .into_iter()
            .filter(|e| e.class.is_issuance())
            .map(|e| e.amount)
            .sum())
    }

    // ============ Candy ============

    pub fn candy_offers(&self, asset_id: &AssetId) -> SafeResult<Vec<CandyOfferEntry>> {
        self.scan_visible::<CandyOfferRecord>(&CandyOfferKey::prefix_asset(asset_id))?
            .into_iter()
            .map(|(key, offer)| {
                let key = CandyOfferKey::decode(&key)?;
                Ok::<_, SafeError>(CandyOfferEntry {
                    asset_id: key.asset_id,
                    out: key.out,
                    offer,
                })
            })
            .collect()
    }

    pub fn candy_offer(
        &self,
        asset_id: &AssetId,
        out: &OutPoint,
    ) -> SafeResult<Option<CandyOfferRecord>> {
        let key = CandyOfferKey {
            asset_id: *asset_id,
            out: *out,
        };
        self.read_point(&key.encode())
    }

    /// Visible offers that have not expired
    pub fn live_candy_offers(&self, asset_id: &AssetId) -> SafeResult<usize> {
        let bpm = self.store.protocol().blocks_per_month;
        Ok(self
            .candy_offers(asset_id)?
            .iter()
            .filter(|e| !e.offer.is_expired(self.height, bpm))
            .count())
    }

    /// Claims of an asset, or of one offer when `out` is given
    pub fn candy_claims(
        &self,
        asset_id: &AssetId,
        out: Option<&OutPoint>,
    ) -> SafeResult<Vec<CandyClaimEntry>> {
        let prefix = match out {
            Some(o) => CandyClaimKey::prefix_offer(asset_id, o),
            None => CandyClaimKey::prefix_asset(asset_id),
        };
        self.scan_visible::<AmountRecord>(&prefix)?
            .into_iter()
            .map(|(key, rec)| {
                let key = CandyClaimKey::decode(&key)?;
                Ok::<_, SafeError>(CandyClaimEntry {
                    asset_id: key.asset_id,
                    out: key.out,
                    address: key.address,
                    amount: rec.amount,
                    height: rec.height,
                })
            })
            .collect()
    }

    pub fn candy_claim(
        &self,
        asset_id: &AssetId,
        out: &OutPoint,
        address: &Address,
    ) -> SafeResult<Option<AmountRecord>> {
        let key = CandyClaimKey {
            asset_id: *asset_id,
            out: *out,
            address: address.clone(),
        };
        self.read_point(&key.encode())
    }

    /// Aggregate claimed from one offer: the sum of the visible per-block partials
    pub fn claimed_total(&self, asset_id: &AssetId, out: &OutPoint) -> SafeResult<Amount> {
        Ok(self
            .scan_visible::<AmountRecord>(&ClaimTotalKey::prefix_offer(asset_id, out))?
            .into_iter()
            .map(|(_, rec)| rec.amount)
            .sum())
    }

    /// Recompute the aggregate from individual claims and compare
    pub fn audit_claim_totals(&self, asset_id: &AssetId, out: &OutPoint) -> SafeResult<Amount> {
        let aggregate = self.claimed_total(asset_id, out)?;
        let recomputed: Amount = self
            .candy_claims(asset_id, Some(out))?
            .into_iter()
            .map(|c| c.amount)
            .sum();
        if aggregate != recomputed {
            return Err(SafeError::Internal(format!(
                "claim aggregate {} of offer {} disagrees with claims {}",
                aggregate, out, recomputed
            )));
        }
        Ok(aggregate)
    }

    /// Heights whose blocks offered candy
    pub fn candy_heights(&self) -> SafeResult<Vec<Height>> {
        self.scan_visible::<HeightRecord>(&IndexTag::CandyHeight.prefix())?
            .into_iter()
            .map(|(key, _)| {
                Ok::<_, SafeError>(HeightKey::decode(IndexTag::CandyHeight, &key)?.height)
            })
            .collect()
    }

    /// Candy offered by the block at `height`
    pub fn candy_total_at(&self, height: Height) -> SafeResult<Option<Amount>> {
        let key = HeightKey::new(IndexTag::CandyHeightTotal, height).encode();
        Ok(self.read_point::<AmountRecord>(&key)?.map(|r| r.amount))
    }
}

fn app_tx_entry(key: &[u8], rec: HeightRecord) -> SafeResult<Option<AppTxEntry>> {
    let key = EntityTxKey::decode(IndexTag::AppTx, key)?;
    Ok(AppTxClass::from_u8(key.class).map(|class| AppTxEntry {
        app_id: key.id,
        address: key.address,
        class,
        out: key.out,
        height: rec.height,
    }))
}

fn asset_tx_entry(key: &[u8], rec: AmountRecord) -> SafeResult<Option<AssetTxEntry>> {
    let key = EntityTxKey::decode(IndexTag::AssetTx, key)?;
    Ok(AssetTxClass::from_u8(key.class).map(|class| AssetTxEntry {
        asset_id: key.id,
        address: key.address,
        class,
        out: key.out,
        amount: rec.amount,
        height: rec.height,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AppCommand, AppMessage};
    use crate::entity::*;
    use crate::indexer::{AppBlock, AppTxOut};
    use safe_core::{Hashable, ProtocolConfig};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn out(n: u8) -> OutPoint {
        OutPoint::new(Hash256([n; 32]), 0)
    }

    fn profile(name: &str) -> AppProfile {
        AppProfile {
            name: name.into(),
            description: "query test".into(),
            developer_type: DeveloperType::Personal,
            developer_name: "dev".into(),
            web_url: String::new(),
            logo_url: String::new(),
            cover_url: String::new(),
        }
    }

    fn register(n: u8, name: &str) -> AppTxOut {
        let message = AppMessage::new(
            1,
            Hash256::ZERO,
            AppCommand::RegisterApp {
                admin: addr("Xadmin"),
                profile: profile(name),
            },
        );
        AppTxOut::new(out(n), addr("Xadmin"), addr("Xadmin"), message)
    }

    fn auth_tx(n: u8, app_id: AppId, grantee: &str, grant: bool) -> AppTxOut {
        let set_type = if grant {
            AuthSetType::Grant
        } else {
            AuthSetType::Revoke
        };
        let payload = AuthGrant {
            set_type,
            address: addr(grantee),
            auth: 1000,
        };
        let command = if grant {
            AppCommand::GrantAuth {
                admin: addr("Xadmin"),
                grant: payload,
            }
        } else {
            AppCommand::RevokeAuth {
                admin: addr("Xadmin"),
                grant: payload,
            }
        };
        AppTxOut::new(
            out(n),
            addr("Xadmin"),
            addr("Xadmin"),
            AppMessage::new(1, app_id, command),
        )
    }

    #[test]
    fn test_name_lookup_is_case_insensitive_and_gated() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        store
            .connect_block(&AppBlock::new(Height(10), vec![register(1, "Acme")]))
            .unwrap();

        let reader = store.reader(Height(9));
        assert!(!reader.exists_app_name("acme", false).unwrap());
        drop(reader);

        let reader = store.reader(Height(10));
        assert!(reader.exists_app_name("ACME", false).unwrap());
        assert!(reader.exists_app_name("acme", true).unwrap());
        assert_eq!(reader.app_id_by_name("Acme").unwrap(), Some(profile("Acme").id()));
        assert_eq!(reader.list_apps().unwrap().len(), 1);
        assert_eq!(reader.apps_by_address(&addr("Xadmin")).unwrap().len(), 1);
    }

    #[test]
    fn test_last_visible_auth_action_wins() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        let app_id = profile("Acme").id();
        store
            .connect_block(&AppBlock::new(Height(10), vec![register(1, "Acme")]))
            .unwrap();
        store
            .connect_block(&AppBlock::new(Height(11), vec![auth_tx(2, app_id, "Xuser", true)]))
            .unwrap();
        store
            .connect_block(&AppBlock::new(Height(12), vec![auth_tx(3, app_id, "Xuser", false)]))
            .unwrap();

        let user = addr("Xuser");
        let reader = store.reader(Height(11));
        assert!(reader.has_auth(&app_id, &user, 1000).unwrap());
        assert_eq!(reader.granted_auths(&app_id, &user).unwrap().len(), 1);
        drop(reader);

        let reader = store.reader(Height(12));
        assert!(!reader.has_auth(&app_id, &user, 1000).unwrap());
        assert!(reader.has_auth(&app_id, &addr("Xadmin"), 1000).unwrap());
        assert_eq!(reader.auth_actions(&app_id, &user).unwrap().len(), 2);
        assert_eq!(reader.app_txs(&app_id, Some(&user)).unwrap().len(), 0);
        assert_eq!(reader.app_txs(&app_id, None).unwrap().len(), 3);
    }

    #[test]
    fn test_all_user_grant() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        let app_id = profile("Acme").id();
        store
            .connect_block(&AppBlock::new(
                Height(10),
                vec![register(1, "Acme"), auth_tx(2, app_id, ALL_USER, true)],
            ))
            .unwrap();
        let reader = store.reader(Height(10));
        assert!(reader.has_auth(&app_id, &addr("Xanyone"), 1000).unwrap());
        assert!(!reader.has_auth(&app_id, &addr("Xanyone"), 1001).unwrap());
    }

    #[test]
    fn test_interrupted_scan() {
        let store = AppIndexStore::in_memory(ProtocolConfig::default());
        store
            .connect_block(&AppBlock::new(Height(10), vec![register(1, "Acme")]))
            .unwrap();
        let signal = ShutdownSignal::new();
        signal.trigger();
        let reader = store.reader(Height(10)).with_shutdown(signal);
        assert!(matches!(reader.list_apps(), Err(SafeError::Interrupted)));
    }
}
