//! Values stored in the index, each stamped with its visibility height

use safe_core::{Address, Amount, Hash256, Height, OutPoint, SafeResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::{AppProfile, AssetProfile, VirtualAccountProfile};

/// Values that become visible once the chain reaches their height
pub trait HeightGated {
    fn height(&self) -> Height;

    fn visible_at(&self, current: Height) -> bool {
        self.height().visible_at(current)
    }
}

pub fn to_bytes<T: Serialize>(value: &T) -> SafeResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> SafeResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

macro_rules! height_gated {
    ($($ty:ty),* $(,)?) => {
        $(impl HeightGated for $ty {
            fn height(&self) -> Height {
                self.height
            }
        })*
    };
}

height_gated!(
    AppInfoRecord,
    AssetInfoRecord,
    AccountInfoRecord,
    NameRecord,
    HeightRecord,
    AmountRecord,
    AuthRecord,
    CandyOfferRecord,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfoRecord {
    pub admin: Address,
    pub profile: AppProfile,
    pub out: OutPoint,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfoRecord {
    pub issuer: Address,
    pub profile: AssetProfile,
    pub out: OutPoint,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoRecord {
    pub profile: VirtualAccountProfile,
    pub out: OutPoint,
    pub height: Height,
}

/// Value of the name-to-id and address-to-id indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub id: Hash256,
    pub height: Height,
}

/// Bare visibility marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRecord {
    pub height: Height,
}

/// Asset-tx entries, claims and the per-height candy sums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRecord {
    pub amount: Amount,
    pub height: Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthAction {
    Grant,
    Revoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub action: AuthAction,
    pub height: Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandyOfferRecord {
    pub amount: Amount,
    pub expired_months: u16,
    pub height: Height,
}

impl CandyOfferRecord {
    /// Last height at which the offer can still be claimed
    pub fn expiry_height(&self, blocks_per_month: u32) -> Height {
        let span = u32::from(self.expired_months).saturating_mul(blocks_per_month);
        Height(self.height.0.saturating_add(span))
    }

    pub fn is_expired(&self, current: Height, blocks_per_month: u32) -> bool {
        self.expiry_height(blocks_per_month) < current
    }

    /// Claims open once the offer has aged `delay` blocks
    pub fn is_claimable(&self, current: Height, delay: u32) -> bool {
        self.height.0.saturating_add(delay) <= current.0
    }
}

/// Class byte of app-tx entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AppTxClass {
    Register = 4,
    GrantAuth = 5,
    RevokeAuth = 6,
    Extend = 7,
}

impl AppTxClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(AppTxClass::Register),
            5 => Some(AppTxClass::GrantAuth),
            6 => Some(AppTxClass::RevokeAuth),
            7 => Some(AppTxClass::Extend),
            _ => None,
        }
    }
}

/// Class byte of asset-tx entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AssetTxClass {
    Locked = 3,
    Issue = 4,
    AddIssue = 5,
    Destroy = 6,
    Transfer = 7,
    PutCandy = 8,
    GetCandy = 9,
    ChangeAsset = 10,
}

impl AssetTxClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        use AssetTxClass::*;
        [Locked, Issue, AddIssue, Destroy, Transfer, PutCandy, GetCandy, ChangeAsset]
            .into_iter()
            .find(|c| *c as u8 == value)
    }

    /// Classes that mint new supply
    pub fn is_issuance(self) -> bool {
        matches!(self, AssetTxClass::Issue | AssetTxClass::AddIssue)
    }
}

/// Narrowing applied to asset-tx scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetTxFilter {
    #[default]
    All,
    /// Everything except locked outputs
    Unlocked,
    Only(AssetTxClass),
}

impl AssetTxFilter {
    pub fn accepts(self, class: AssetTxClass) -> bool {
        match self {
            AssetTxFilter::All => true,
            AssetTxFilter::Unlocked => class != AssetTxClass::Locked,
            AssetTxFilter::Only(wanted) => class == wanted,
        }
    }
}
