//! Derives the index mutations of a connecting block
//!
//! The mutation set of a block is a pure function of the block: no index
//! reads happen here. Disconnecting a block recomputes the same set and
//! erases exactly its keys.

use safe_core::{
    fold_name, Address, Amount, AssetId, Hashable, Height, OutPoint, SafeError, SafeResult, TxId,
};
use safe_state::{
    AuthKey, CandyClaimKey, CandyOfferKey, ClaimTotalKey, EntityTxKey, HeightKey, IdKey,
    IndexTag, NameKey, WriteBatch,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::codec::{self, AppCommand, AppMessage};
use crate::records::*;

/// One output of a transaction carrying an application payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTxOut {
    pub out: OutPoint,
    /// Destination of the output carrying the payload
    pub address: Address,
    /// Address funding the transaction; the acting party for admin and auth checks
    pub sender: Address,
    pub message: AppMessage,
    /// Output is time-locked
    pub locked: bool,
    /// Candy output a get-candy transaction spends
    pub candy_source: Option<OutPoint>,
}

impl AppTxOut {
    pub fn new(out: OutPoint, address: Address, sender: Address, message: AppMessage) -> Self {
        Self {
            out,
            address,
            sender,
            message,
            locked: false,
            candy_source: None,
        }
    }

    /// Parse the reserve field of an output
    pub fn from_reserve(
        out: OutPoint,
        address: Address,
        sender: Address,
        reserve: &[u8],
    ) -> SafeResult<Self> {
        let message = codec::decode_reserve(reserve)?;
        Ok(Self::new(out, address, sender, message))
    }

    pub fn with_lock(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn claiming(mut self, source: OutPoint) -> Self {
        self.candy_source = Some(source);
        self
    }

    pub fn txid(&self) -> TxId {
        self.out.txid
    }

    pub fn command(&self) -> &AppCommand {
        &self.message.command
    }
}

/// Application outputs of one block, in transaction order
#[derive(Debug, Clone, Default)]
pub struct AppBlock {
    pub height: Height,
    pub outputs: Vec<AppTxOut>,
}

impl AppBlock {
    pub fn new(height: Height, outputs: Vec<AppTxOut>) -> Self {
        Self { height, outputs }
    }
}

/// Everything one block writes into the index
#[derive(Debug, Clone)]
pub struct BlockMutations {
    pub height: Height,
    pub batch: WriteBatch,
}

impl BlockMutations {
    /// Keys a disconnect must erase
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.batch.keys().map(<[u8]>::to_vec).collect()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Builds a block's batch while refusing to write one key twice
struct BatchBuilder {
    height: Height,
    batch: WriteBatch,
    seen: HashSet<Vec<u8>>,
}

impl BatchBuilder {
    fn new(height: Height) -> Self {
        Self {
            height,
            batch: WriteBatch::new(),
            seen: HashSet::new(),
        }
    }

    fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> SafeResult<()> {
        if !self.seen.insert(key.clone()) {
            let tag = key
                .first()
                .copied()
                .and_then(IndexTag::from_byte)
                .map(IndexTag::name)
                .unwrap_or("unknown");
            return Err(SafeError::Internal(format!(
                "block {} writes {} key {} twice",
                self.height,
                tag,
                hex::encode(&key)
            )));
        }
        self.batch.put(key, to_bytes(value)?);
        Ok(())
    }

    fn height_record(&self) -> HeightRecord {
        HeightRecord {
            height: self.height,
        }
    }

    fn amount_record(&self, amount: Amount) -> AmountRecord {
        AmountRecord {
            amount,
            height: self.height,
        }
    }
}

/// Stateless translator from decoded commands to index entries
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockIndexer;

impl BlockIndexer {
    pub fn new() -> Self {
        Self
    }

    pub fn mutations(&self, block: &AppBlock) -> SafeResult<BlockMutations> {
        let mut b = BatchBuilder::new(block.height);
        let mut claim_sums: BTreeMap<(AssetId, OutPoint), Amount> = BTreeMap::new();
        let mut candy_total = Amount::ZERO;
        let mut candy_offered = false;

        for (position, tx) in block.outputs.iter().enumerate() {
            let app_id = tx.message.header.app_id;
            match tx.command() {
                AppCommand::RegisterApp { admin, profile } => {
                    let id = profile.id();
                    let info = AppInfoRecord {
                        admin: admin.clone(),
                        profile: profile.clone(),
                        out: tx.out,
                        height: block.height,
                    };
                    b.put(IdKey::new(IndexTag::AppInfo, id).encode(), &info)?;
                    b.put(
                        NameKey::new(IndexTag::AppName, fold_name(&profile.name)).encode(),
                        &NameRecord {
                            id,
                            height: block.height,
                        },
                    )?;
                    let rec = b.height_record();
                    b.put(app_tx_key(id, tx, AppTxClass::Register), &rec)?;
                }
                AppCommand::GrantAuth { grant, .. } | AppCommand::RevokeAuth { grant, .. } => {
                    let (action, class) = match tx.command() {
                        AppCommand::GrantAuth { .. } => (AuthAction::Grant, AppTxClass::GrantAuth),
                        _ => (AuthAction::Revoke, AppTxClass::RevokeAuth),
                    };
                    let key = AuthKey {
                        app_id,
                        address: grant.address.clone(),
                        auth: grant.auth,
                        height: block.height,
                        position: position as u32,
                    };
                    b.put(
                        key.encode(),
                        &AuthRecord {
                            action,
                            height: block.height,
                        },
                    )?;
                    let rec = b.height_record();
                    b.put(app_tx_key(app_id, tx, class), &rec)?;
                }
                AppCommand::Extend(_) => {
                    let rec = b.height_record();
                    b.put(app_tx_key(app_id, tx, AppTxClass::Extend), &rec)?;
                }
                AppCommand::IssueAsset(profile) => {
                    let id = profile.id();
                    let info = AssetInfoRecord {
                        issuer: tx.sender.clone(),
                        profile: profile.clone(),
                        out: tx.out,
                        height: block.height,
                    };
                    let name_rec = NameRecord {
                        id,
                        height: block.height,
                    };
                    b.put(IdKey::new(IndexTag::AssetInfo, id).encode(), &info)?;
                    b.put(
                        NameKey::new(IndexTag::AssetShortName, fold_name(&profile.short_name))
                            .encode(),
                        &name_rec,
                    )?;
                    b.put(
                        NameKey::new(IndexTag::AssetName, fold_name(&profile.name)).encode(),
                        &name_rec,
                    )?;
                    // Issue counts the whole first issue, candy reserve included
                    let rec = b.amount_record(profile.first_issue_amount);
                    b.put(asset_tx_key(id, tx, AssetTxClass::Issue), &rec)?;

                    if profile.pays_candy && !profile.candy_amount.is_zero() {
                        put_offer(
                            &mut b,
                            id,
                            tx.out,
                            profile.candy_amount,
                            profile.candy_expired_months,
                        )?;
                        candy_total = candy_total.saturating_add(profile.candy_amount);
                        candy_offered = true;
                    }
                }
                AppCommand::AddIssue(r) => {
                    let rec = b.amount_record(r.amount);
                    b.put(asset_tx_key(r.asset_id, tx, AssetTxClass::AddIssue), &rec)?;
                }
                AppCommand::TransferAsset(r) => {
                    let class = if tx.locked {
                        AssetTxClass::Locked
                    } else {
                        AssetTxClass::Transfer
                    };
                    let rec = b.amount_record(r.amount);
                    b.put(asset_tx_key(r.asset_id, tx, class), &rec)?;
                }
                AppCommand::DestroyAsset(r) => {
                    let rec = b.amount_record(r.amount);
                    b.put(asset_tx_key(r.asset_id, tx, AssetTxClass::Destroy), &rec)?;
                }
                AppCommand::ChangeAsset(r) => {
                    let rec = b.amount_record(r.amount);
                    b.put(asset_tx_key(r.asset_id, tx, AssetTxClass::ChangeAsset), &rec)?;
                }
                AppCommand::PutCandy(offer) => {
                    put_offer(&mut b, offer.asset_id, tx.out, offer.amount, offer.expired_months)?;
                    let rec = b.amount_record(offer.amount);
                    b.put(asset_tx_key(offer.asset_id, tx, AssetTxClass::PutCandy), &rec)?;
                    candy_total = candy_total.saturating_add(offer.amount);
                    candy_offered = true;
                }
                AppCommand::GetCandy(claim) => {
                    let source = tx.candy_source.ok_or_else(|| {
                        let msg = format!("get-candy {} names no candy output", tx.out);
                        SafeError::MalformedPayload(msg)
                    })?;
                    let key = CandyClaimKey {
                        asset_id: claim.asset_id,
                        out: source,
                        address: tx.address.clone(),
                    };
                    let rec = b.amount_record(claim.amount);
                    b.put(key.encode(), &rec)?;
                    b.put(asset_tx_key(claim.asset_id, tx, AssetTxClass::GetCandy), &rec)?;

                    let sum = claim_sums.entry((claim.asset_id, source)).or_default();
                    *sum = sum.saturating_add(claim.amount);
                }
                AppCommand::TransferSafe(_) => {}
                AppCommand::RegisterAccount(profile) => {
                    let id = profile.id();
                    let info = AccountInfoRecord {
                        profile: profile.clone(),
                        out: tx.out,
                        height: block.height,
                    };
                    let name_rec = NameRecord {
                        id,
                        height: block.height,
                    };
                    b.put(IdKey::new(IndexTag::AccountInfo, id).encode(), &info)?;
                    b.put(
                        NameKey::new(IndexTag::AccountName, fold_name(&profile.name)).encode(),
                        &name_rec,
                    )?;
                    b.put(
                        NameKey::new(IndexTag::AccountAddress, profile.safe_address.as_str())
                            .encode(),
                        &name_rec,
                    )?;
                }
            }
        }

        // Claim aggregates: one partial sum per offer per block
        for ((asset_id, out), amount) in claim_sums {
            let key = ClaimTotalKey {
                asset_id,
                out,
                height: block.height,
            };
            let rec = b.amount_record(amount);
            b.put(key.encode(), &rec)?;
        }

        if candy_offered {
            let marker = b.height_record();
            b.put(HeightKey::new(IndexTag::CandyHeight, block.height).encode(), &marker)?;
            let rec = b.amount_record(candy_total);
            b.put(
                HeightKey::new(IndexTag::CandyHeightTotal, block.height).encode(),
                &rec,
            )?;
        }

        Ok(BlockMutations {
            height: block.height,
            batch: b.batch,
        })
    }
}

fn app_tx_key(app_id: safe_core::AppId, tx: &AppTxOut, class: AppTxClass) -> Vec<u8> {
    EntityTxKey {
        tag: IndexTag::AppTx,
        id: app_id,
        address: tx.address.clone(),
        class: class as u8,
        out: tx.out,
    }
    .encode()
}

fn asset_tx_key(asset_id: AssetId, tx: &AppTxOut, class: AssetTxClass) -> Vec<u8> {
    EntityTxKey {
        tag: IndexTag::AssetTx,
        id: asset_id,
        address: tx.address.clone(),
        class: class as u8,
        out: tx.out,
    }
    .encode()
}

fn put_offer(
    b: &mut BatchBuilder,
    asset_id: AssetId,
    out: OutPoint,
    amount: Amount,
    expired_months: u16,
) -> SafeResult<()> {
    let rec = CandyOfferRecord {
        amount,
        expired_months,
        height: b.height,
    };
    b.put(CandyOfferKey { asset_id, out }.encode(), &rec)
}
