//! Safe Index Node
//!
//! Wires the application index together for operators:
//! - Index store opened from the node configuration
//! - Pending pool and admission validator
//! - Height provider used for visibility gating

mod runtime;

pub use runtime::*;
