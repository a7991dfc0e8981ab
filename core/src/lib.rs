//! Safe Core Library
//! 
//! Primitive types, errors, configuration and shared traits for the Safe
//! application/asset index. Every other crate in the workspace builds on these.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
