//! Generation events and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::MapLayout;

/// Receives layout snapshots while a generation runs.
///
/// `on_perturbed` fires for every accepted perturbation; converting a
/// snapshot per perturbation is not free, so it is gated behind
/// `wants_perturbed`, which an interested observer overrides together
/// with the callback.
pub trait GenerationObserver {
    fn wants_perturbed(&self) -> bool {
        false
    }

    fn on_perturbed(&mut self, _layout: &MapLayout) {}

    /// A chain was completed with zero energy.
    fn on_partial_valid(&mut self, _layout: &MapLayout) {}

    /// The final full layout is valid.
    fn on_valid(&mut self, _layout: &MapLayout) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

/// Shared flag polled by the evolver at trial boundaries. Setting it
/// makes the running generation unwind with its best-so-far layout.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
