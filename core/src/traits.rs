//! Core traits shared across the index crates

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{Hash256, Height};

/// Types whose id is derived from their serialized content
pub trait Hashable {
    /// Compute the content id of this object
    fn id(&self) -> Hash256;
}

/// Supplies the current best-chain height used for visibility gating
pub trait ChainHeight: Send + Sync {
    fn best_height(&self) -> Height;
}

/// Fixed height, used by tests and one-shot queries
#[derive(Debug, Clone, Copy)]
pub struct FixedHeight(pub Height);

impl ChainHeight for FixedHeight {
    fn best_height(&self) -> Height {
        self.0
    }
}

/// Process-wide shutdown flag checked between steps of long index scans
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_is_shared() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_triggered());
        signal.trigger();
        assert!(clone.is_triggered());
    }

    #[test]
    fn test_fixed_height() {
        assert_eq!(FixedHeight(Height::new(42)).best_height(), Height::new(42));
    }
}
