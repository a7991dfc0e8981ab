//! Hashing functions built on SHA-256

use safe_core::Hash256;
use sha2::{Digest, Sha256};

/// Single SHA-256 of data
pub fn sha256_hash(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash256::from_bytes(hasher.finalize().into())
}

/// Double SHA-256, the chain's content hash
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256::from_bytes(Sha256::digest(first).into())
}

/// Default hash function for entity ids
pub fn hash(data: &[u8]) -> Hash256 {
    sha256d(data)
}

/// Hash multiple pieces of data as one stream
pub fn hash_multiple(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let first = hasher.finalize();
    Hash256::from_bytes(Sha256::digest(first).into())
}

/// Merkle tree root computation
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current_level: Vec<Hash256> = leaves.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for chunk in current_level.chunks(2) {
            // Odd number: hash with itself
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            next_level.push(hash_multiple(&[chunk[0].as_bytes(), right.as_bytes()]));
        }

        current_level = next_level;
    }

    current_level[0]
}
