//! Core types for the Safe application index
//!
//! Defines the fixed-width identifiers, chain heights, amounts and output
//! references shared by the codec, the index store and the query layer.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{SafeError, SafeResult};

/// Maximum length of a base58 address string in bytes
pub const MAX_ADDRESS_SIZE: usize = 34;

/// 256-bit hash, used for application, asset, account and transaction ids
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash256(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

// Hex in JSON, raw bytes in bincode.
impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash256::from_hex(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Hash256)
        }
    }
}

/// Application id (hash of the registered profile)
pub type AppId = Hash256;

/// Asset id (hash of the issued asset profile)
pub type AssetId = Hash256;

/// Virtual account id (hash of the account profile)
pub type AccountId = Hash256;

/// Transaction id
pub type TxId = Hash256;

/// Base58 address string as carried in command payloads and index keys
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Address(String);

impl Address {
    /// Create an address, rejecting empty, oversized or whitespace-bearing input
    pub fn new(value: impl Into<String>) -> SafeResult<Self> {
        let value = value.into();
        if value.is_empty()
            || value.len() > MAX_ADDRESS_SIZE
            || value.chars().any(char::is_whitespace)
        {
            return Err(SafeError::InvalidAddress(value));
        }
        Ok(Address(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

/// Best-chain height. Index entries become visible once the chain reaches them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Height(pub u32);

impl Height {
    pub const GENESIS: Height = Height(0);

    pub fn new(value: u32) -> Self {
        Height(value)
    }

    pub fn next(&self) -> Height {
        Height(self.0.saturating_add(1))
    }

    pub fn prev(&self) -> Height {
        Height(self.0.saturating_sub(1))
    }

    /// An entry recorded at `self` is live for a reader at `current`
    pub fn visible_at(&self, current: Height) -> bool {
        current.0 >= self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Height({})", self.0)
    }
}

/// Asset amount in the asset's smallest unit
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u64::MAX);

    pub fn new(value: u64) -> Self {
        Amount(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

/// Reference to a transaction output
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub const ENCODED_LEN: usize = Hash256::LEN + 4;

    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({}:{})", self.txid.to_hex(), self.vout)
    }
}

/// Case-fold a name for uniqueness checks and name-keyed index lookups
pub fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex() {
        let hash = Hash256([7u8; 32]);
        let parsed = Hash256::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
        assert!(Hash256::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hash_json_is_hex() {
        let hash = Hash256([1u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_address_limits() {
        assert!(Address::new("Xq7LAnHYt2dr4rbHR4bo6GvnHGuM8fcEQd").is_ok());
        assert!(Address::new("").is_err());
        assert!(Address::new("a".repeat(MAX_ADDRESS_SIZE + 1)).is_err());
        assert!(Address::new("has space").is_err());
    }

    #[test]
    fn test_height_visibility() {
        let recorded = Height::new(10);
        assert!(!recorded.visible_at(Height::new(9)));
        assert!(recorded.visible_at(Height::new(10)));
        assert!(recorded.visible_at(Height::new(11)));
    }

    #[test]
    fn test_amount_operations() {
        let a = Amount::new(100);
        let b = Amount::new(40);
        assert_eq!(a.checked_sub(b), Some(Amount::new(60)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(vec![a, b].into_iter().sum::<Amount>(), Amount::new(140));
    }

    #[test]
    fn test_fold_name() {
        assert_eq!(fold_name("  Acme "), "acme");
        assert_eq!(fold_name("ACME"), fold_name("acme"));
    }
}
