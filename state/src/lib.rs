//! Safe Index Store
//! 
//! One physical ordered key-value engine partitioned into logical indices by
//! a leading tag byte. Provides point reads, prefix-scoped range scans and
//! atomic batched writes/erases. The store itself is height-agnostic.

pub mod keys;
pub mod store;
pub mod memory;
pub mod persistent;
pub mod snapshot;

pub use keys::*;
pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use snapshot::*;
