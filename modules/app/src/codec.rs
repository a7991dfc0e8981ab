//! Wire codec for application command payloads
//!
//! Layout: `version:u16 | app_id:32 | code:u32 | payload`. Integers are
//! little-endian, strings are UTF-8 behind a `u16` length, booleans are a
//! single 0/1 byte. A payload travels in a transaction output's reserve field
//! behind the [`RESERVE_MAGIC`] marker.

use safe_core::{Address, Amount, AppId, Hash256, SafeError, SafeResult, MAX_ADDRESS_SIZE};
use serde::{Deserialize, Serialize};

use crate::entity::*;

/// Marker in front of every application payload inside a reserve field
pub const RESERVE_MAGIC: &[u8; 4] = b"safe";

/// Marker used by consensus data sharing the reserve field
pub const CONSENSUS_MAGIC: &[u8; 4] = b"spos";

/// Accumulates an encoding, remembering the first field over its ceiling
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    error: Option<SafeError>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn hash(&mut self, value: &Hash256) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn bytes(&mut self, field: &'static str, value: &[u8], max: usize) {
        if value.len() > max && self.error.is_none() {
            self.error = Some(SafeError::FieldTooLong {
                field,
                len: value.len(),
                max,
            });
        }
        self.u16(u16::try_from(value.len()).unwrap_or(u16::MAX));
        self.buf.extend_from_slice(value);
    }

    pub fn str(&mut self, field: &'static str, value: &str, max: usize) {
        self.bytes(field, value.as_bytes(), max);
    }

    pub fn address(&mut self, field: &'static str, value: &Address) {
        self.str(field, value.as_str(), MAX_ADDRESS_SIZE);
    }

    /// Encoded bytes, or the first ceiling violation
    pub fn finish(self) -> SafeResult<Vec<u8>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.buf),
        }
    }

    /// Encoded bytes regardless of ceilings; used for content ids
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn malformed(msg: impl Into<String>) -> SafeError {
    SafeError::MalformedPayload(msg.into())
}

/// Consumes an encoding field by field
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> SafeResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(malformed(format!(
                "truncated: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> SafeResult<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    pub fn u8(&mut self) -> SafeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> SafeResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> SafeResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> SafeResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn amount(&mut self) -> SafeResult<Amount> {
        self.u64().map(Amount)
    }

    pub fn bool(&mut self) -> SafeResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed(format!("invalid bool byte {}", other))),
        }
    }

    pub fn hash(&mut self) -> SafeResult<Hash256> {
        self.array().map(Hash256)
    }

    pub fn bytes(&mut self, field: &'static str, max: usize) -> SafeResult<Vec<u8>> {
        let len = self.u16()? as usize;
        if len > max {
            return Err(malformed(format!(
                "{} length {} exceeds ceiling {}",
                field, len, max
            )));
        }
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self, field: &'static str, max: usize) -> SafeResult<String> {
        let bytes = self.bytes(field, max)?;
        String::from_utf8(bytes).map_err(|_| malformed(format!("{} is not utf-8", field)))
    }

    pub fn address(&mut self, field: &'static str) -> SafeResult<Address> {
        let text = self.string(field, MAX_ADDRESS_SIZE)?;
        Address::new(text).map_err(|e| malformed(format!("{}: {}", field, e)))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn finish(self) -> SafeResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(malformed(format!("{} trailing bytes", n))),
        }
    }
}

/// Canonical field-order encoding of a payload
pub trait Encode {
    fn encode_to(&self, w: &mut Writer);
}

/// Inverse of [`Encode`]
pub trait Decode: Sized {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self>;
}

impl Encode for AppHeader {
    fn encode_to(&self, w: &mut Writer) {
        w.u16(self.version);
        w.hash(&self.app_id);
        w.u32(self.code.as_u32());
    }
}

impl Decode for AppHeader {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        let version = r.u16()?;
        let app_id = r.hash()?;
        let code = CommandCode::from_u32(r.u32()?)?;
        Ok(AppHeader::new(version, app_id, code))
    }
}

impl Encode for AppProfile {
    fn encode_to(&self, w: &mut Writer) {
        w.str("app name", &self.name, MAX_APP_NAME_SIZE);
        w.str("app description", &self.description, MAX_APP_DESC_SIZE);
        w.u8(self.developer_type as u8);
        w.str("developer name", &self.developer_name, MAX_DEV_NAME_SIZE);
        w.str("web url", &self.web_url, MAX_URL_SIZE);
        w.str("logo url", &self.logo_url, MAX_URL_SIZE);
        w.str("cover url", &self.cover_url, MAX_URL_SIZE);
    }
}

impl Decode for AppProfile {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        let name = r.string("app name", MAX_APP_NAME_SIZE)?;
        let description = r.string("app description", MAX_APP_DESC_SIZE)?;
        let dev = r.u8()?;
        let developer_type = DeveloperType::from_u8(dev)
            .ok_or_else(|| malformed(format!("unknown developer type {}", dev)))?;
        Ok(AppProfile {
            name,
            description,
            developer_type,
            developer_name: r.string("developer name", MAX_DEV_NAME_SIZE)?,
            web_url: r.string("web url", MAX_URL_SIZE)?,
            logo_url: r.string("logo url", MAX_URL_SIZE)?,
            cover_url: r.string("cover url", MAX_URL_SIZE)?,
        })
    }
}

impl Encode for AuthGrant {
    fn encode_to(&self, w: &mut Writer) {
        w.u8(self.set_type as u8);
        w.address("grantee address", &self.address);
        w.u32(self.auth);
    }
}

impl Decode for AuthGrant {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        let set = r.u8()?;
        let set_type = AuthSetType::from_u8(set)
            .ok_or_else(|| malformed(format!("unknown set type {}", set)))?;
        Ok(AuthGrant {
            set_type,
            address: r.address("grantee address")?,
            auth: r.u32()?,
        })
    }
}

impl Encode for ExtendPayload {
    fn encode_to(&self, w: &mut Writer) {
        w.u32(self.required_auth);
        w.bytes("extend data", &self.data, MAX_EXTEND_DATA_SIZE);
    }
}

impl Decode for ExtendPayload {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(ExtendPayload {
            required_auth: r.u32()?,
            data: r.bytes("extend data", MAX_EXTEND_DATA_SIZE)?,
        })
    }
}

impl Encode for AssetProfile {
    fn encode_to(&self, w: &mut Writer) {
        w.str("short name", &self.short_name, MAX_SHORT_NAME_SIZE);
        w.str("asset name", &self.name, MAX_ASSET_NAME_SIZE);
        w.str("asset description", &self.description, MAX_ASSET_DESC_SIZE);
        w.str("asset unit", &self.unit, MAX_ASSET_UNIT_SIZE);
        w.u64(self.total_amount.0);
        w.u64(self.first_issue_amount.0);
        w.u64(self.first_actual_amount.0);
        w.u8(self.decimals);
        w.bool(self.destroyable);
        w.bool(self.pays_candy);
        w.u64(self.candy_amount.0);
        w.u16(self.candy_expired_months);
        w.str("remarks", &self.remarks, MAX_REMARKS_SIZE);
    }
}

impl Decode for AssetProfile {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(AssetProfile {
            short_name: r.string("short name", MAX_SHORT_NAME_SIZE)?,
            name: r.string("asset name", MAX_ASSET_NAME_SIZE)?,
            description: r.string("asset description", MAX_ASSET_DESC_SIZE)?,
            unit: r.string("asset unit", MAX_ASSET_UNIT_SIZE)?,
            total_amount: r.amount()?,
            first_issue_amount: r.amount()?,
            first_actual_amount: r.amount()?,
            decimals: r.u8()?,
            destroyable: r.bool()?,
            pays_candy: r.bool()?,
            candy_amount: r.amount()?,
            candy_expired_months: r.u16()?,
            remarks: r.string("remarks", MAX_REMARKS_SIZE)?,
        })
    }
}

impl Encode for TransferRecord {
    fn encode_to(&self, w: &mut Writer) {
        w.hash(&self.asset_id);
        w.u64(self.amount.0);
        w.str("remarks", &self.remarks, MAX_REMARKS_SIZE);
    }
}

impl Decode for TransferRecord {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(TransferRecord {
            asset_id: r.hash()?,
            amount: r.amount()?,
            remarks: r.string("remarks", MAX_REMARKS_SIZE)?,
        })
    }
}

impl Encode for CandyOffer {
    fn encode_to(&self, w: &mut Writer) {
        w.hash(&self.asset_id);
        w.u64(self.amount.0);
        w.u16(self.expired_months);
        w.str("remarks", &self.remarks, MAX_REMARKS_SIZE);
    }
}

impl Decode for CandyOffer {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(CandyOffer {
            asset_id: r.hash()?,
            amount: r.amount()?,
            expired_months: r.u16()?,
            remarks: r.string("remarks", MAX_REMARKS_SIZE)?,
        })
    }
}

impl Encode for CandyClaim {
    fn encode_to(&self, w: &mut Writer) {
        w.hash(&self.asset_id);
        w.u64(self.amount.0);
        w.str("remarks", &self.remarks, MAX_REMARKS_SIZE);
    }
}

impl Decode for CandyClaim {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(CandyClaim {
            asset_id: r.hash()?,
            amount: r.amount()?,
            remarks: r.string("remarks", MAX_REMARKS_SIZE)?,
        })
    }
}

impl Encode for SafeTransferNote {
    fn encode_to(&self, w: &mut Writer) {
        w.str("remarks", &self.remarks, MAX_REMARKS_SIZE);
    }
}

impl Decode for SafeTransferNote {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(SafeTransferNote {
            remarks: r.string("remarks", MAX_REMARKS_SIZE)?,
        })
    }
}

impl Encode for VirtualAccountProfile {
    fn encode_to(&self, w: &mut Writer) {
        w.address("safe address", &self.safe_address);
        w.str("account name", &self.name, MAX_ACCOUNT_NAME_SIZE);
        w.address("owner address", &self.owner);
        w.address("active address", &self.active);
    }
}

impl Decode for VirtualAccountProfile {
    fn decode_from(r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(VirtualAccountProfile {
            safe_address: r.address("safe address")?,
            name: r.string("account name", MAX_ACCOUNT_NAME_SIZE)?,
            owner: r.address("owner address")?,
            active: r.address("active address")?,
        })
    }
}

/// One variant per command code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AppCommand {
    RegisterApp { admin: Address, profile: AppProfile },
    GrantAuth { admin: Address, grant: AuthGrant },
    RevokeAuth { admin: Address, grant: AuthGrant },
    Extend(ExtendPayload),
    IssueAsset(AssetProfile),
    AddIssue(TransferRecord),
    TransferAsset(TransferRecord),
    DestroyAsset(TransferRecord),
    ChangeAsset(TransferRecord),
    PutCandy(CandyOffer),
    GetCandy(CandyClaim),
    TransferSafe(SafeTransferNote),
    RegisterAccount(VirtualAccountProfile),
}

impl AppCommand {
    pub fn code(&self) -> CommandCode {
        match self {
            AppCommand::RegisterApp { .. } => CommandCode::RegisterApp,
            AppCommand::GrantAuth { .. } => CommandCode::GrantAuth,
            AppCommand::RevokeAuth { .. } => CommandCode::RevokeAuth,
            AppCommand::Extend(_) => CommandCode::Extend,
            AppCommand::IssueAsset(_) => CommandCode::IssueAsset,
            AppCommand::AddIssue(_) => CommandCode::AddIssue,
            AppCommand::TransferAsset(_) => CommandCode::TransferAsset,
            AppCommand::DestroyAsset(_) => CommandCode::DestroyAsset,
            AppCommand::ChangeAsset(_) => CommandCode::ChangeAsset,
            AppCommand::PutCandy(_) => CommandCode::PutCandy,
            AppCommand::GetCandy(_) => CommandCode::GetCandy,
            AppCommand::TransferSafe(_) => CommandCode::TransferSafe,
            AppCommand::RegisterAccount(_) => CommandCode::RegisterAccount,
        }
    }

    fn encode_to(&self, w: &mut Writer) {
        match self {
            AppCommand::RegisterApp { admin, profile } => {
                w.address("admin address", admin);
                profile.encode_to(w);
            }
            AppCommand::GrantAuth { admin, grant } | AppCommand::RevokeAuth { admin, grant } => {
                w.address("admin address", admin);
                grant.encode_to(w);
            }
            AppCommand::Extend(p) => p.encode_to(w),
            AppCommand::IssueAsset(p) => p.encode_to(w),
            AppCommand::AddIssue(p)
            | AppCommand::TransferAsset(p)
            | AppCommand::DestroyAsset(p)
            | AppCommand::ChangeAsset(p) => p.encode_to(w),
            AppCommand::PutCandy(p) => p.encode_to(w),
            AppCommand::GetCandy(p) => p.encode_to(w),
            AppCommand::TransferSafe(p) => p.encode_to(w),
            AppCommand::RegisterAccount(p) => p.encode_to(w),
        }
    }

    fn decode_from(code: CommandCode, r: &mut Reader<'_>) -> SafeResult<Self> {
        Ok(match code {
            CommandCode::RegisterApp => AppCommand::RegisterApp {
                admin: r.address("admin address")?,
                profile: AppProfile::decode_from(r)?,
            },
            CommandCode::GrantAuth => AppCommand::GrantAuth {
                admin: r.address("admin address")?,
                grant: AuthGrant::decode_from(r)?,
            },
            CommandCode::RevokeAuth => AppCommand::RevokeAuth {
                admin: r.address("admin address")?,
                grant: AuthGrant::decode_from(r)?,
            },
            CommandCode::Extend => AppCommand::Extend(ExtendPayload::decode_from(r)?),
            CommandCode::IssueAsset => AppCommand::IssueAsset(AssetProfile::decode_from(r)?),
            CommandCode::AddIssue => AppCommand::AddIssue(TransferRecord::decode_from(r)?),
            CommandCode::TransferAsset => {
                AppCommand::TransferAsset(TransferRecord::decode_from(r)?)
            }
            CommandCode::DestroyAsset => AppCommand::DestroyAsset(TransferRecord::decode_from(r)?),
            CommandCode::ChangeAsset => AppCommand::ChangeAsset(TransferRecord::decode_from(r)?),
            CommandCode::PutCandy => AppCommand::PutCandy(CandyOffer::decode_from(r)?),
            CommandCode::GetCandy => AppCommand::GetCandy(CandyClaim::decode_from(r)?),
            CommandCode::TransferSafe => {
                AppCommand::TransferSafe(SafeTransferNote::decode_from(r)?)
            }
            CommandCode::RegisterAccount => {
                AppCommand::RegisterAccount(VirtualAccountProfile::decode_from(r)?)
            }
        })
    }

    /// Asset the command refers to, if any. Issue returns the new asset's id.
    pub fn asset_id(&self) -> Option<Hash256> {
        use safe_core::Hashable;
        match self {
            AppCommand::IssueAsset(p) => Some(p.id()),
            AppCommand::AddIssue(p)
            | AppCommand::TransferAsset(p)
            | AppCommand::DestroyAsset(p)
            | AppCommand::ChangeAsset(p) => Some(p.asset_id),
            AppCommand::PutCandy(p) => Some(p.asset_id),
            AppCommand::GetCandy(p) => Some(p.asset_id),
            _ => None,
        }
    }
}

/// Header plus the command it announces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMessage {
    pub header: AppHeader,
    pub command: AppCommand,
}

impl AppMessage {
    pub fn new(version: u16, app_id: AppId, command: AppCommand) -> Self {
        let header = AppHeader::new(version, app_id, command.code());
        Self { header, command }
    }

    /// Asset commands always carry the asset protocol's app id
    pub fn asset(version: u16, command: AppCommand) -> Self {
        Self::new(version, safe_asset_app_id(), command)
    }
}

/// Serialize a message, rejecting any string over its ceiling
pub fn encode(message: &AppMessage) -> SafeResult<Vec<u8>> {
    if message.header.code != message.command.code() {
        return Err(malformed(format!(
            "header code {} does not match {:?}",
            message.header.code.as_u32(),
            message.command.code()
        )));
    }
    let mut w = Writer::new();
    message.header.encode_to(&mut w);
    message.command.encode_to(&mut w);
    w.finish()
}

/// Parse a message; every byte must be consumed
pub fn decode(bytes: &[u8]) -> SafeResult<AppMessage> {
    let mut r = Reader::new(bytes);
    let header = AppHeader::decode_from(&mut r)?;
    let command = AppCommand::decode_from(header.code, &mut r)?;
    r.finish()?;
    Ok(AppMessage { header, command })
}

/// Prefix an encoded message with the reserve marker
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RESERVE_MAGIC.len() + payload.len());
    out.extend_from_slice(RESERVE_MAGIC);
    out.extend_from_slice(payload);
    out
}

/// Strip the reserve marker, rejecting consensus data and unmarked buffers
pub fn open(reserve: &[u8]) -> SafeResult<&[u8]> {
    match reserve.get(..RESERVE_MAGIC.len()) {
        Some(magic) if magic == RESERVE_MAGIC => Ok(&reserve[RESERVE_MAGIC.len()..]),
        Some(magic) if magic == CONSENSUS_MAGIC => {
            Err(malformed("reserve carries consensus data"))
        }
        _ => Err(malformed("reserve has no application marker")),
    }
}

/// Encode and seal in one step
pub fn encode_reserve(message: &AppMessage) -> SafeResult<Vec<u8>> {
    encode(message).map(|bytes| seal(&bytes))
}

/// Open and decode in one step
pub fn decode_reserve(reserve: &[u8]) -> SafeResult<AppMessage> {
    decode(open(reserve)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safe_core::Hashable;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn sample_asset() -> AssetProfile {
        AssetProfile {
            short_name: "TK".into(),
            name: "Token".into(),
            description: "test token".into(),
            unit: "tk".into(),
            total_amount: Amount(1000),
            first_issue_amount: Amount(500),
            first_actual_amount: Amount(500),
            decimals: 4,
            destroyable: true,
            pays_candy: false,
            candy_amount: Amount::ZERO,
            candy_expired_months: 0,
            remarks: "first".into(),
        }
    }

    fn sample_app() -> AppProfile {
        AppProfile {
            name: "Acme".into(),
            description: "Acme wallet".into(),
            developer_type: DeveloperType::Company,
            developer_name: "Acme Ltd".into(),
            web_url: "https://acme.example".into(),
            logo_url: "https://acme.example/l.png".into(),
            cover_url: "https://acme.example/c.png".into(),
        }
    }

    fn sample_account() -> VirtualAccountProfile {
        VirtualAccountProfile {
            safe_address: addr("Xsafe"),
            name: "alice".into(),
            owner: addr("Xowner"),
            active: addr("Xactive"),
        }
    }

    fn all_commands() -> Vec<AppMessage> {
        let asset_id = sample_asset().id();
        let profile = sample_app();
        let app_id = profile.id();
        let admin = addr("Xadmin");
        let grant = AuthGrant {
            set_type: AuthSetType::Grant,
            address: addr("Xuser"),
            auth: 1000,
        };
        let revoke = AuthGrant {
            set_type: AuthSetType::Revoke,
            ..grant.clone()
        };
        let record = TransferRecord {
            asset_id,
            amount: Amount(10),
            remarks: "r".into(),
        };
        let offer = CandyOffer {
            asset_id,
            amount: Amount(100),
            expired_months: 2,
            remarks: String::new(),
        };
        let claim = CandyClaim {
            asset_id,
            amount: Amount(40),
            remarks: String::new(),
        };
        let extend = ExtendPayload {
            required_auth: 1000,
            data: vec![1, 2, 3],
        };
        let note = SafeTransferNote {
            remarks: "thanks".into(),
        };
        vec![
            AppMessage::new(
                1,
                app_id,
                AppCommand::RegisterApp {
                    admin: admin.clone(),
                    profile,
                },
            ),
            AppMessage::new(
                1,
                app_id,
                AppCommand::GrantAuth {
                    admin: admin.clone(),
                    grant,
                },
            ),
            AppMessage::new(
                1,
                app_id,
                AppCommand::RevokeAuth {
                    admin,
                    grant: revoke,
                },
            ),
            AppMessage::new(1, app_id, AppCommand::Extend(extend)),
            AppMessage::asset(1, AppCommand::IssueAsset(sample_asset())),
            AppMessage::asset(1, AppCommand::AddIssue(record.clone())),
            AppMessage::asset(1, AppCommand::TransferAsset(record.clone())),
            AppMessage::asset(1, AppCommand::DestroyAsset(record.clone())),
            AppMessage::asset(1, AppCommand::ChangeAsset(record)),
            AppMessage::asset(1, AppCommand::PutCandy(offer)),
            AppMessage::asset(1, AppCommand::GetCandy(claim)),
            AppMessage::new(1, safe_pay_app_id(), AppCommand::TransferSafe(note)),
            AppMessage::new(
                1,
                Hash256::ZERO,
                AppCommand::RegisterAccount(sample_account()),
            ),
        ]
    }

    fn app_with(edit: impl FnOnce(&mut AppProfile)) -> AppMessage {
        let mut profile = sample_app();
        edit(&mut profile);
        let admin = addr("Xadmin");
        AppMessage::new(1, Hash256::ZERO, AppCommand::RegisterApp { admin, profile })
    }

    fn asset_with(edit: impl FnOnce(&mut AssetProfile)) -> AppMessage {
        let mut profile = sample_asset();
        edit(&mut profile);
        AppMessage::asset(1, AppCommand::IssueAsset(profile))
    }

    fn account_with(edit: impl FnOnce(&mut VirtualAccountProfile)) -> AppMessage {
        let mut profile = sample_account();
        edit(&mut profile);
        AppMessage::new(1, Hash256::ZERO, AppCommand::RegisterAccount(profile))
    }

    #[test]
    fn test_every_command_round_trips() {
        for message in all_commands() {
            let bytes = encode(&message).unwrap();
            assert_eq!(decode(&bytes).unwrap(), message, "{:?}", message.header.code);
        }
    }

    #[test]
    fn test_header_layout() {
        let message = AppMessage::asset(1, AppCommand::TransferSafe(SafeTransferNote::default()));
        let message = AppMessage {
            header: AppHeader::new(7, Hash256([0xab; 32]), CommandCode::TransferSafe),
            ..message
        };
        let bytes = encode(&message).unwrap();
        assert_eq!(&bytes[..2], &[7, 0]);
        assert_eq!(&bytes[2..34], &[0xab; 32]);
        assert_eq!(&bytes[34..38], &300u32.to_le_bytes());
        assert_eq!(bytes.len(), AppHeader::ENCODED_LEN + 2);
    }

    #[test]
    fn test_ceiling_boundary() {
        type Build = fn(String) -> AppMessage;
        let cases: [(&str, usize, Build); 13] = [
            ("app name", MAX_APP_NAME_SIZE, |v| app_with(|p| p.name = v)),
            ("app description", MAX_APP_DESC_SIZE, |v| app_with(|p| p.description = v)),
            ("developer name", MAX_DEV_NAME_SIZE, |v| app_with(|p| p.developer_name = v)),
            ("web url", MAX_URL_SIZE, |v| app_with(|p| p.web_url = v)),
            ("logo url", MAX_URL_SIZE, |v| app_with(|p| p.logo_url = v)),
            ("cover url", MAX_URL_SIZE, |v| app_with(|p| p.cover_url = v)),
            ("extend data", MAX_EXTEND_DATA_SIZE, |v| {
                let data = v.into_bytes();
                let payload = ExtendPayload {
                    required_auth: 1000,
                    data,
                };
                AppMessage::new(1, Hash256([1; 32]), AppCommand::Extend(payload))
            }),
            ("short name", MAX_SHORT_NAME_SIZE, |v| asset_with(|p| p.short_name = v)),
            ("asset name", MAX_ASSET_NAME_SIZE, |v| asset_with(|p| p.name = v)),
            ("asset description", MAX_ASSET_DESC_SIZE, |v| asset_with(|p| p.description = v)),
            ("asset unit", MAX_ASSET_UNIT_SIZE, |v| asset_with(|p| p.unit = v)),
            ("remarks", MAX_REMARKS_SIZE, |v| {
                let note = SafeTransferNote { remarks: v };
                AppMessage::new(1, safe_pay_app_id(), AppCommand::TransferSafe(note))
            }),
            ("account name", MAX_ACCOUNT_NAME_SIZE, |v| account_with(|p| p.name = v)),
        ];

        for (field, max, build) in cases {
            let at = build("x".repeat(max));
            let bytes = encode(&at).unwrap_or_else(|e| panic!("{} at ceiling: {}", field, e));
            assert_eq!(decode(&bytes).unwrap(), at, "{}", field);

            match encode(&build("x".repeat(max + 1))) {
                Err(SafeError::FieldTooLong { field: f, len, max: m }) => {
                    assert_eq!((f, len, m), (field, max + 1, max));
                }
                other => panic!("{} over ceiling: {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_address_ceiling() {
        let at = account_with(|p| p.safe_address = addr(&"X".repeat(MAX_ADDRESS_SIZE)));
        assert_eq!(decode(&encode(&at).unwrap()).unwrap(), at);
        assert!(Address::new("X".repeat(MAX_ADDRESS_SIZE + 1)).is_err());

        // An oversized address can only arrive from the wire
        let mut w = Writer::new();
        AppHeader::new(1, Hash256::ZERO, CommandCode::RegisterAccount).encode_to(&mut w);
        w.str("safe address", &"X".repeat(MAX_ADDRESS_SIZE + 1), usize::MAX);
        w.str("account name", "alice", MAX_ACCOUNT_NAME_SIZE);
        w.str("owner address", "Xowner", MAX_ADDRESS_SIZE);
        w.str("active address", "Xactive", MAX_ADDRESS_SIZE);
        assert!(matches!(decode(&w.into_bytes()), Err(SafeError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing_bytes() {
        let bytes = encode(&all_commands()[4]).unwrap();
        for cut in [0, 1, AppHeader::ENCODED_LEN, bytes.len() - 1] {
            assert!(matches!(decode(&bytes[..cut]), Err(SafeError::MalformedPayload(_))));
        }
        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(decode(&long), Err(SafeError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_length_over_ceiling() {
        let mut w = Writer::new();
        AppHeader::new(1, safe_pay_app_id(), CommandCode::TransferSafe).encode_to(&mut w);
        w.u16((MAX_REMARKS_SIZE + 1) as u16);
        let mut bytes = w.into_bytes();
        bytes.extend(std::iter::repeat(b'x').take(MAX_REMARKS_SIZE + 1));
        assert!(matches!(decode(&bytes), Err(SafeError::MalformedPayload(_))));
    }

    #[test]
    fn test_unknown_code_and_bad_bool() {
        let mut w = Writer::new();
        w.u16(1);
        w.hash(&Hash256::ZERO);
        w.u32(999);
        assert!(matches!(decode(&w.into_bytes()), Err(SafeError::UnknownCommandCode(999))));

        let mut bytes = encode(&all_commands()[4]).unwrap();
        // destroyable flag sits after four strings, three amounts and decimals
        let profile = sample_asset();
        let offset = AppHeader::ENCODED_LEN
            + [&profile.short_name, &profile.name, &profile.description, &profile.unit]
                .iter()
                .map(|s| 2 + s.len())
                .sum::<usize>()
            + 24
            + 1;
        assert_eq!(bytes[offset], 1);
        bytes[offset] = 2;
        assert!(matches!(decode(&bytes), Err(SafeError::MalformedPayload(_))));
    }

    #[test]
    fn test_reserve_envelope() {
        let message = &all_commands()[0];
        let reserve = encode_reserve(message).unwrap();
        assert_eq!(&reserve[..4], b"safe");
        assert_eq!(&decode_reserve(&reserve).unwrap(), message);

        let mut spos = reserve.clone();
        spos[..4].copy_from_slice(CONSENSUS_MAGIC);
        assert!(open(&spos).is_err());
        assert!(open(b"sa").is_err());
    }

    #[test]
    fn test_mismatched_header_code_is_rejected() {
        let mut message = all_commands()[5].clone();
        message.header.code = CommandCode::PutCandy;
        assert!(encode(&message).is_err());
    }
}
