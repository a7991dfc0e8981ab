//! Fixed-layout composite keys for every logical index
//!
//! Every key starts with one [`IndexTag`] byte. Ids are written as their raw
//! 32 bytes, addresses with a one-byte length prefix, and integers big-endian,
//! so that a shorter key prefix always covers a contiguous key range.

use safe_core::{Address, Hash256, Height, OutPoint, SafeError, SafeResult, MAX_ADDRESS_SIZE};
use std::fmt;

/// Partition byte leading every key in the index keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum IndexTag {
    AppInfo = 0x10,
    AppName = 0x11,
    AppTx = 0x12,
    Auth = 0x13,
    AssetInfo = 0x20,
    AssetShortName = 0x21,
    AssetName = 0x22,
    AssetTx = 0x23,
    CandyOffer = 0x24,
    CandyClaim = 0x25,
    CandyClaimTotal = 0x26,
    CandyHeight = 0x27,
    CandyHeightTotal = 0x28,
    AccountInfo = 0x30,
    AccountName = 0x31,
    AccountAddress = 0x32,
}

impl IndexTag {
    pub const ALL: [IndexTag; 16] = [
        IndexTag::AppInfo,
        IndexTag::AppName,
        IndexTag::AppTx,
        IndexTag::Auth,
        IndexTag::AssetInfo,
        IndexTag::AssetShortName,
        IndexTag::AssetName,
        IndexTag::AssetTx,
        IndexTag::CandyOffer,
        IndexTag::CandyClaim,
        IndexTag::CandyClaimTotal,
        IndexTag::CandyHeight,
        IndexTag::CandyHeightTotal,
        IndexTag::AccountInfo,
        IndexTag::AccountName,
        IndexTag::AccountAddress,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.byte() == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            IndexTag::AppInfo => "appid_appinfo",
            IndexTag::AppName => "appname_appid",
            IndexTag::AppTx => "app_tx",
            IndexTag::Auth => "auth",
            IndexTag::AssetInfo => "assetid_assetinfo",
            IndexTag::AssetShortName => "shortname_assetid",
            IndexTag::AssetName => "assetname_assetid",
            IndexTag::AssetTx => "asset_tx",
            IndexTag::CandyOffer => "putcandy",
            IndexTag::CandyClaim => "getcandy",
            IndexTag::CandyClaimTotal => "getcandy_total",
            IndexTag::CandyHeight => "candyheight",
            IndexTag::CandyHeightTotal => "candyheight_totalamount",
            IndexTag::AccountInfo => "accountid_accountinfo",
            IndexTag::AccountName => "accountname_accountid",
            IndexTag::AccountAddress => "address_accountid",
        }
    }

    /// Prefix covering the whole index
    pub fn prefix(self) -> Vec<u8> {
        vec![self.byte()]
    }
}

impl fmt::Display for IndexTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Appends key components in their fixed byte layout
#[derive(Debug, Clone)]
pub struct KeyWriter {
    buf: Vec<u8>,
}

impl KeyWriter {
    pub fn new(tag: IndexTag) -> Self {
        let mut buf = Vec::with_capacity(80);
        buf.push(tag.byte());
        Self { buf }
    }

    pub fn hash(mut self, hash: &Hash256) -> Self {
        self.buf.extend_from_slice(hash.as_bytes());
        self
    }

    pub fn address(mut self, address: &Address) -> Self {
        // Address::new caps the length at MAX_ADDRESS_SIZE, so it fits a u8
        self.buf.push(address.as_bytes().len() as u8);
        self.buf.extend_from_slice(address.as_bytes());
        self
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn height(self, height: Height) -> Self {
        self.u32(height.0)
    }

    pub fn outpoint(self, out: &OutPoint) -> Self {
        self.hash(&out.txid).u32(out.vout)
    }

    /// Raw trailing bytes; only valid as the last component
    pub fn tail(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads key components back in the order they were written
pub struct KeyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn corrupt(what: &str) -> SafeError {
    SafeError::Storage(format!("corrupt index key: {}", what))
}

impl<'a> KeyReader<'a> {
    pub fn new(buf: &'a [u8], tag: IndexTag) -> SafeResult<Self> {
        match buf.first() {
            Some(&b) if b == tag.byte() => Ok(Self { buf, pos: 1 }),
            _ => Err(corrupt(tag.name())),
        }
    }

    fn take(&mut self, n: usize) -> SafeResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(corrupt("truncated")),
        }
    }

    pub fn hash(&mut self) -> SafeResult<Hash256> {
        let bytes = self.take(Hash256::LEN)?;
        Hash256::from_slice(bytes).ok_or_else(|| corrupt("hash"))
    }

    pub fn address(&mut self) -> SafeResult<Address> {
        let len = self.u8()? as usize;
        if len > MAX_ADDRESS_SIZE {
            return Err(corrupt("address length"));
        }
        let bytes = self.take(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| corrupt("address utf-8"))?;
        Address::new(text)
    }

    pub fn u8(&mut self) -> SafeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> SafeResult<u32> {
        let bytes = self.take(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(arr))
    }

    pub fn height(&mut self) -> SafeResult<Height> {
        self.u32().map(Height)
    }

    pub fn outpoint(&mut self) -> SafeResult<OutPoint> {
        let txid = self.hash()?;
        let vout = self.u32()?;
        Ok(OutPoint::new(txid, vout))
    }

    pub fn tail(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn finish(self) -> SafeResult<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(corrupt("trailing bytes"))
        }
    }
}

/// `{tag, id}` for the id-to-info indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdKey {
    pub tag: IndexTag,
    pub id: Hash256,
}

impl IdKey {
    pub fn new(tag: IndexTag, id: Hash256) -> Self {
        Self { tag, id }
    }

    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(self.tag).hash(&self.id).finish()
    }

    pub fn decode(tag: IndexTag, bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, tag)?;
        let id = r.hash()?;
        r.finish()?;
        Ok(Self { tag, id })
    }
}

/// `{tag, folded name}` for the name-to-id indices
///
/// The caller folds the name; the key stores whatever it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKey {
    pub tag: IndexTag,
    pub name: String,
}

impl NameKey {
    pub fn new(tag: IndexTag, name: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(self.tag).tail(self.name.as_bytes()).finish()
    }

    pub fn decode(tag: IndexTag, bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, tag)?;
        let name = std::str::from_utf8(r.tail()).map_err(|_| corrupt("name utf-8"))?;
        Ok(Self::new(tag, name))
    }
}

/// `{tag, entity id, address, class, output}` for app-tx and asset-tx
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTxKey {
    pub tag: IndexTag,
    pub id: Hash256,
    pub address: Address,
    pub class: u8,
    pub out: OutPoint,
}

impl EntityTxKey {
    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(self.tag)
            .hash(&self.id)
            .address(&self.address)
            .u8(self.class)
            .outpoint(&self.out)
            .finish()
    }

    pub fn decode(tag: IndexTag, bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, tag)?;
        let key = Self {
            tag,
            id: r.hash()?,
            address: r.address()?,
            class: r.u8()?,
            out: r.outpoint()?,
        };
        r.finish()?;
        Ok(key)
    }

    /// Every entry for one entity
    pub fn prefix_id(tag: IndexTag, id: &Hash256) -> Vec<u8> {
        KeyWriter::new(tag).hash(id).finish()
    }

    /// Every entry for one entity and address
    pub fn prefix_id_address(tag: IndexTag, id: &Hash256, address: &Address) -> Vec<u8> {
        KeyWriter::new(tag).hash(id).address(address).finish()
    }
}

/// `{appId, address, mask, height, position}` for authorization actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthKey {
    pub app_id: Hash256,
    pub address: Address,
    pub auth: u32,
    pub height: Height,
    /// Order of the action within its block
    pub position: u32,
}

impl AuthKey {
    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(IndexTag::Auth)
            .hash(&self.app_id)
            .address(&self.address)
            .u32(self.auth)
            .height(self.height)
            .u32(self.position)
            .finish()
    }

    pub fn decode(bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, IndexTag::Auth)?;
        let key = Self {
            app_id: r.hash()?,
            address: r.address()?,
            auth: r.u32()?,
            height: r.height()?,
            position: r.u32()?,
        };
        r.finish()?;
        Ok(key)
    }

    pub fn prefix_app(app_id: &Hash256) -> Vec<u8> {
        KeyWriter::new(IndexTag::Auth).hash(app_id).finish()
    }

    pub fn prefix_address(app_id: &Hash256, address: &Address) -> Vec<u8> {
        KeyWriter::new(IndexTag::Auth)
            .hash(app_id)
            .address(address)
            .finish()
    }

    /// Every action on one mask, oldest first
    pub fn prefix_auth(app_id: &Hash256, address: &Address, auth: u32) -> Vec<u8> {
        KeyWriter::new(IndexTag::Auth)
            .hash(app_id)
            .address(address)
            .u32(auth)
            .finish()
    }
}

/// `{assetId, output}` for candy offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandyOfferKey {
    pub asset_id: Hash256,
    pub out: OutPoint,
}

impl CandyOfferKey {
    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyOffer)
            .hash(&self.asset_id)
            .outpoint(&self.out)
            .finish()
    }

    pub fn decode(bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, IndexTag::CandyOffer)?;
        let key = Self {
            asset_id: r.hash()?,
            out: r.outpoint()?,
        };
        r.finish()?;
        Ok(key)
    }

    pub fn prefix_asset(asset_id: &Hash256) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyOffer).hash(asset_id).finish()
    }
}

/// `{assetId, offer output, claimant}` for candy claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandyClaimKey {
    pub asset_id: Hash256,
    pub out: OutPoint,
    pub address: Address,
}

impl CandyClaimKey {
    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyClaim)
            .hash(&self.asset_id)
            .outpoint(&self.out)
            .address(&self.address)
            .finish()
    }

    pub fn decode(bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, IndexTag::CandyClaim)?;
        let key = Self {
            asset_id: r.hash()?,
            out: r.outpoint()?,
            address: r.address()?,
        };
        r.finish()?;
        Ok(key)
    }

    pub fn prefix_asset(asset_id: &Hash256) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyClaim).hash(asset_id).finish()
    }

    pub fn prefix_offer(asset_id: &Hash256, out: &OutPoint) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyClaim)
            .hash(asset_id)
            .outpoint(out)
            .finish()
    }
}

/// `{assetId, offer output, height}`: claims on one offer connected in one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimTotalKey {
    pub asset_id: Hash256,
    pub out: OutPoint,
    pub height: Height,
}

impl ClaimTotalKey {
    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyClaimTotal)
            .hash(&self.asset_id)
            .outpoint(&self.out)
            .height(self.height)
            .finish()
    }

    pub fn decode(bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, IndexTag::CandyClaimTotal)?;
        let key = Self {
            asset_id: r.hash()?,
            out: r.outpoint()?,
            height: r.height()?,
        };
        r.finish()?;
        Ok(key)
    }

    pub fn prefix_offer(asset_id: &Hash256, out: &OutPoint) -> Vec<u8> {
        KeyWriter::new(IndexTag::CandyClaimTotal)
            .hash(asset_id)
            .outpoint(out)
            .finish()
    }
}

/// `{tag, height}` for the per-height candy indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightKey {
    pub tag: IndexTag,
    pub height: Height,
}

impl HeightKey {
    pub fn new(tag: IndexTag, height: Height) -> Self {
        Self { tag, height }
    }

    pub fn encode(&self) -> Vec<u8> {
        KeyWriter::new(self.tag).height(self.height).finish()
    }

    pub fn decode(tag: IndexTag, bytes: &[u8]) -> SafeResult<Self> {
        let mut r = KeyReader::new(bytes, tag)?;
        let height = r.height()?;
        r.finish()?;
        Ok(Self { tag, height })
    }
}
