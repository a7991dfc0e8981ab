//! Entity model for the application/asset protocol
//!
//! Plain value types carried inside command payloads. Each profile's id is
//! the double SHA-256 of its canonical encoding (see [`crate::codec`]).
//! Field validation beyond the codec's length ceilings lives here too.

use safe_core::{
    AccountId, Address, Amount, AppId, AssetId, Hash256, Hashable, SafeError, SafeResult,
    MAX_ADDRESS_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::codec::{Encode, Writer};

// ============ Field ceilings ============

pub const MAX_APP_NAME_SIZE: usize = 50;
pub const MAX_APP_DESC_SIZE: usize = 600;
pub const MAX_DEV_NAME_SIZE: usize = 100;
pub const MAX_URL_SIZE: usize = 300;
pub const MIN_AUTH_VALUE: u32 = 1000;
pub const MAX_EXTEND_DATA_SIZE: usize = 2956;

pub const MAX_SHORT_NAME_SIZE: usize = 20;
pub const MAX_ASSET_NAME_SIZE: usize = 20;
pub const MAX_ASSET_DESC_SIZE: usize = 300;
pub const MAX_ASSET_UNIT_SIZE: usize = 10;
pub const MIN_ASSET_DECIMALS: u8 = 4;
pub const MAX_ASSET_DECIMALS: u8 = 10;
pub const MIN_CANDY_EXPIRED: u16 = 1;
pub const MAX_CANDY_EXPIRED: u16 = 3;
pub const MAX_REMARKS_SIZE: usize = 500;
pub const MIN_TOTAL_ASSETS: u64 = 100;
pub const MAX_TOTAL_ASSETS: u64 = 200_000_000_000_000;

pub const MIN_ACCOUNT_NAME_SIZE: usize = 3;
pub const MAX_ACCOUNT_NAME_SIZE: usize = 13;

/// Grantee standing for every address of an application
pub const ALL_USER: &str = "ALL_USER";

/// Header app id carried by every asset command
pub const SAFE_ASSET_APP_ID: &str =
    "cfe2450bf016e2ad8130e4996960a32e0686c1704b62a6ad02e49ee805a9b288";

/// Header app id carried by plain currency transfer notes
pub const SAFE_PAY_APP_ID: &str =
    "a4bea6705cd38d535e873da1c9ad897048b6bbc8e286ca9b28bd18bb22eedcc9";

pub fn safe_asset_app_id() -> AppId {
    Hash256::from_hex(SAFE_ASSET_APP_ID).unwrap_or_default()
}

pub fn safe_pay_app_id() -> AppId {
    Hash256::from_hex(SAFE_PAY_APP_ID).unwrap_or_default()
}

const RESERVED_WORDS: &[&str] = &[
    "安资", "安聊", "安投", "安付", "安資",
    "SafeAsset", "SafeChat", "SafeVote", "SafePay", "AnWang", "BankLedger", "ElectionChain",
    "SafeNetSpace", "DarkNetSpace",
    "SAFE", "ELT", "DNC", "DNC2",
    "BTC", "ETH", "EOS", "LTC", "DASH", "ETC",
    "Bitcoin", "Ethereum", "LiteCoin", "Ethereum Classic",
    "人民币", "港元", "港币", "澳门元", "澳门币", "新台币", "RMB", "CNY", "HKD", "MOP", "TWD",
    "人民幣", "港幣", "澳門元", "澳門幣", "新台幣", "澳门幣",
    "mSAFE", "μSAFE", "duffs", "tSAFE", "mtSAFE", "μtSAFE", "tduffs", "AnYou", "SafeGame",
];

// Rejected anywhere inside a name
const RESERVED_FRAGMENTS: &[&str] = &["安网", "银链", "安網", "銀鏈", "銀链", "银鏈", "安游", "安遊"];

/// Whole-word keyword match or a reserved fragment anywhere, ignoring case
pub fn is_reserved_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    RESERVED_WORDS.iter().any(|w| w.to_lowercase() == lower)
        || RESERVED_FRAGMENTS.iter().any(|f| lower.contains(&f.to_lowercase()))
}

pub fn contains_space(value: &str) -> bool {
    value.contains(' ') || value.contains('\t')
}

pub fn is_valid_url(url: &str) -> bool {
    if url == "http://" || url == "https://" {
        return false;
    }
    url.starts_with("http://") || url.starts_with("https://")
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn check_len(field: &'static str, value: &str, max: usize) -> SafeResult<()> {
    if value.len() > max {
        return Err(SafeError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SafeError {
    SafeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Non-empty, within its ceiling, and free of surrounding spaces
fn check_text(field: &'static str, value: &str, max: usize) -> SafeResult<()> {
    check_len(field, value, max)?;
    if value.is_empty() {
        return Err(invalid(field, "empty"));
    }
    if value.trim() != value {
        return Err(invalid(field, "surrounding whitespace"));
    }
    Ok(())
}

fn check_not_reserved(value: &str) -> SafeResult<()> {
    if is_reserved_name(value) {
        return Err(SafeError::ReservedName(value.to_string()));
    }
    Ok(())
}

/// Letter or CJK first, then at least one more letter, digit or CJK character
fn check_asset_name(field: &'static str, value: &str) -> SafeResult<()> {
    check_text(field, value, MAX_ASSET_NAME_SIZE.max(MAX_SHORT_NAME_SIZE))?;
    if contains_space(value) {
        return Err(invalid(field, "contains whitespace"));
    }
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || is_cjk(c));
    let rest: Vec<char> = chars.collect();
    if !first_ok
        || rest.is_empty()
        || !rest.iter().all(|&c| c.is_ascii_alphanumeric() || is_cjk(c))
    {
        return Err(invalid(field, "must start with a letter and hold only letters or digits"));
    }
    check_not_reserved(value)
}

fn check_remarks(value: &str) -> SafeResult<()> {
    check_len("remarks", value, MAX_REMARKS_SIZE)
}

// ============ Header ============

/// Stable command numbers carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CommandCode {
    RegisterApp = 100,
    GrantAuth = 101,
    RevokeAuth = 102,
    Extend = 103,
    IssueAsset = 200,
    AddIssue = 201,
    TransferAsset = 202,
    DestroyAsset = 203,
    ChangeAsset = 204,
    PutCandy = 205,
    GetCandy = 206,
    TransferSafe = 300,
    RegisterAccount = 400,
}

impl CommandCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> SafeResult<Self> {
        use CommandCode::*;
        Ok(match code {
            100 => RegisterApp,
            101 => GrantAuth,
            102 => RevokeAuth,
            103 => Extend,
            200 => IssueAsset,
            201 => AddIssue,
            202 => TransferAsset,
            203 => DestroyAsset,
            204 => ChangeAsset,
            205 => PutCandy,
            206 => GetCandy,
            300 => TransferSafe,
            400 => RegisterAccount,
            other => return Err(SafeError::UnknownCommandCode(other)),
        })
    }

    pub fn is_app_command(self) -> bool {
        (100..200).contains(&self.as_u32())
    }

    pub fn is_asset_command(self) -> bool {
        (200..300).contains(&self.as_u32())
    }
}

/// Fixed-layout prefix of every command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppHeader {
    pub version: u16,
    pub app_id: AppId,
    pub code: CommandCode,
}

impl AppHeader {
    /// Encoded size: version, app id, command code
    pub const ENCODED_LEN: usize = 2 + 32 + 4;

    pub fn new(version: u16, app_id: AppId, code: CommandCode) -> Self {
        Self {
            version,
            app_id,
            code,
        }
    }
}

// ============ Applications ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeveloperType {
    Company = 1,
    Personal = 2,
}

impl DeveloperType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DeveloperType::Company),
            2 => Some(DeveloperType::Personal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProfile {
    pub name: String,
    pub description: String,
    pub developer_type: DeveloperType,
    pub developer_name: String,
    pub web_url: String,
    pub logo_url: String,
    pub cover_url: String,
}

impl AppProfile {
    pub fn validate(&self) -> SafeResult<()> {
        check_text("app name", &self.name, MAX_APP_NAME_SIZE)?;
        check_not_reserved(&self.name)?;
        check_text("app description", &self.description, MAX_APP_DESC_SIZE)?;
        check_text("developer name", &self.developer_name, MAX_DEV_NAME_SIZE)?;
        check_not_reserved(&self.developer_name)?;

        let urls = [
            ("web url", &self.web_url),
            ("logo url", &self.logo_url),
            ("cover url", &self.cover_url),
        ];
        for (field, url) in urls {
            check_len(field, url, MAX_URL_SIZE)?;
            // Personal developers may leave urls out entirely
            if url.is_empty() && self.developer_type == DeveloperType::Personal {
                continue;
            }
            if !is_valid_url(url) {
                return Err(SafeError::InvalidUrl(url.clone()));
            }
        }
        Ok(())
    }
}

impl Hashable for AppProfile {
    fn id(&self) -> AppId {
        content_id(self)
    }
}

/// Whether an authorization command adds or removes a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuthSetType {
    Grant = 1,
    Revoke = 2,
}

impl AuthSetType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AuthSetType::Grant),
            2 => Some(AuthSetType::Revoke),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub set_type: AuthSetType,
    /// Grantee, or [`ALL_USER`]
    pub address: Address,
    pub auth: u32,
}

impl AuthGrant {
    pub fn validate(&self) -> SafeResult<()> {
        check_len("grantee address", self.address.as_str(), MAX_ADDRESS_SIZE)?;
        if self.auth < MIN_AUTH_VALUE {
            return Err(invalid(
                "auth mask",
                format!("{} below minimum {}", self.auth, MIN_AUTH_VALUE),
            ));
        }
        Ok(())
    }

    pub fn is_all_users(&self) -> bool {
        self.address.as_str() == ALL_USER
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendPayload {
    pub required_auth: u32,
    pub data: Vec<u8>,
}

impl ExtendPayload {
    pub fn validate(&self) -> SafeResult<()> {
        if self.data.len() > MAX_EXTEND_DATA_SIZE {
            return Err(SafeError::FieldTooLong {
                field: "extend data",
                len: self.data.len(),
                max: MAX_EXTEND_DATA_SIZE,
            });
        }
        if self.data.is_empty() {
            return Err(invalid("extend data", "empty"));
        }
        Ok(())
    }
}

// ============ Assets ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProfile {
    pub short_name: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub total_amount: Amount,
    pub first_issue_amount: Amount,
    /// First issue less the candy reserved at issue time
    pub first_actual_amount: Amount,
    pub decimals: u8,
    pub destroyable: bool,
    pub pays_candy: bool,
    pub candy_amount: Amount,
    pub candy_expired_months: u16,
    pub remarks: String,
}

impl AssetProfile {
    pub fn validate(&self) -> SafeResult<()> {
        check_len("short name", &self.short_name, MAX_SHORT_NAME_SIZE)?;
        check_asset_name("short name", &self.short_name)?;
        check_len("asset name", &self.name, MAX_ASSET_NAME_SIZE)?;
        check_asset_name("asset name", &self.name)?;
        check_text("asset description", &self.description, MAX_ASSET_DESC_SIZE)?;

        check_text("asset unit", &self.unit, MAX_ASSET_UNIT_SIZE)?;
        if !self.unit.chars().all(|c| c.is_ascii_alphabetic() || is_cjk(c)) {
            return Err(invalid("asset unit", "letters only"));
        }
        check_not_reserved(&self.unit)?;

        if !(MIN_ASSET_DECIMALS..=MAX_ASSET_DECIMALS).contains(&self.decimals) {
            return Err(invalid(
                "decimals",
                format!(
                    "{} outside {}..={}",
                    self.decimals, MIN_ASSET_DECIMALS, MAX_ASSET_DECIMALS
                ),
            ));
        }

        let total = self.total_amount.0;
        if !(MIN_TOTAL_ASSETS..=MAX_TOTAL_ASSETS).contains(&total) {
            return Err(invalid(
                "total amount",
                format!("{} outside {}..={}", total, MIN_TOTAL_ASSETS, MAX_TOTAL_ASSETS),
            ));
        }
        if self.first_issue_amount.is_zero() {
            return Err(invalid("first issue amount", "zero"));
        }
        if self.first_issue_amount > self.total_amount {
            return Err(SafeError::FirstExceedsTotal {
                first: self.first_issue_amount.0,
                total,
            });
        }

        if self.pays_candy {
            if self.candy_amount > self.first_issue_amount {
                return Err(SafeError::CandyExceedsFirst {
                    candy: self.candy_amount.0,
                    first: self.first_issue_amount.0,
                });
            }
            // Between one per mille and ten percent of the total
            if self.candy_amount.0 < total / 1000 || self.candy_amount.0 > total / 10 {
                return Err(invalid(
                    "candy amount",
                    format!("{} outside 0.001..=0.1 of total {}", self.candy_amount, total),
                ));
            }
            if !(MIN_CANDY_EXPIRED..=MAX_CANDY_EXPIRED).contains(&self.candy_expired_months) {
                return Err(invalid(
                    "candy expired",
                    format!("{} months", self.candy_expired_months),
                ));
            }
        } else if !self.candy_amount.is_zero() || self.candy_expired_months != 0 {
            return Err(invalid("candy amount", "set without paying candy"));
        }

        let actual = self.first_issue_amount.checked_sub(self.candy_amount);
        if actual != Some(self.first_actual_amount) {
            return Err(invalid(
                "first actual amount",
                "must equal first issue amount less candy",
            ));
        }
        check_remarks(&self.remarks)
    }
}

impl Hashable for AssetProfile {
    fn id(&self) -> AssetId {
        content_id(self)
    }
}

/// Payload of add-issue, transfer, destroy and change commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub asset_id: AssetId,
    pub amount: Amount,
    pub remarks: String,
}

impl TransferRecord {
    pub fn validate(&self) -> SafeResult<()> {
        if self.amount.is_zero() || self.amount.0 > MAX_TOTAL_ASSETS {
            return Err(invalid("asset amount", format!("{}", self.amount)));
        }
        check_remarks(&self.remarks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandyOffer {
    pub asset_id: AssetId,
    pub amount: Amount,
    pub expired_months: u16,
    pub remarks: String,
}

impl CandyOffer {
    pub fn validate(&self) -> SafeResult<()> {
        if self.amount.is_zero() {
            return Err(invalid("candy amount", "zero"));
        }
        if !(MIN_CANDY_EXPIRED..=MAX_CANDY_EXPIRED).contains(&self.expired_months) {
            return Err(invalid("candy expired", format!("{} months", self.expired_months)));
        }
        check_remarks(&self.remarks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandyClaim {
    pub asset_id: AssetId,
    pub amount: Amount,
    pub remarks: String,
}

impl CandyClaim {
    pub fn validate(&self) -> SafeResult<()> {
        if self.amount.is_zero() {
            return Err(invalid("candy amount", "zero"));
        }
        check_remarks(&self.remarks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SafeTransferNote {
    pub remarks: String,
}

impl SafeTransferNote {
    pub fn validate(&self) -> SafeResult<()> {
        check_remarks(&self.remarks)
    }
}

// ============ Virtual accounts ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccountProfile {
    pub safe_address: Address,
    pub name: String,
    pub owner: Address,
    pub active: Address,
}

impl VirtualAccountProfile {
    pub fn validate(&self) -> SafeResult<()> {
        check_text("account name", &self.name, MAX_ACCOUNT_NAME_SIZE)?;
        if self.name.len() < MIN_ACCOUNT_NAME_SIZE {
            return Err(invalid(
                "account name",
                format!("shorter than {} bytes", MIN_ACCOUNT_NAME_SIZE),
            ));
        }
        if contains_space(&self.name) {
            return Err(invalid("account name", "contains whitespace"));
        }
        check_not_reserved(&self.name)
    }
}

impl Hashable for VirtualAccountProfile {
    fn id(&self) -> AccountId {
        content_id(self)
    }
}

fn content_id<T: Encode>(value: &T) -> Hash256 {
    let mut writer = Writer::new();
    value.encode_to(&mut writer);
    safe_crypto::hash(&writer.into_bytes())
}
