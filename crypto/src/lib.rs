//! Safe Cryptography Module
//! 
//! Content-id hashing for application entities (double SHA-256, matching the
//! chain's serialize-hash) and Merkle digests over index snapshots.

pub mod hashing;

pub use hashing::*;
