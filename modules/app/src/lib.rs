//! Safe application and asset protocol
//!
//! Implements the application layer carried in transaction reserve fields:
//! - Application registration, authorization and extension commands
//! - Asset issuance, transfer, destruction and candy airdrops
//! - Virtual account registration
//! - Height-gated indices with case-insensitive name uniqueness

pub mod entity;
pub mod codec;
pub mod records;
pub mod indexer;
pub mod index;
pub mod query;
pub mod mempool;
pub mod validator;

pub use entity::*;
pub use codec::*;
pub use records::*;
pub use indexer::*;
pub use index::*;
pub use query::*;
pub use mempool::*;
pub use validator::*;
