//! Region classification and code discovery.
//!
//! Stages run leaf first: [`entropy`] produces provisional regions,
//! [`detectors`] refines them, [`walker`] discovers code. [`partition`] holds
//! the region map all three write into.

pub mod detectors;
pub mod entropy;
pub mod partition;
pub mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AnalysisError;

pub use detectors::{
    default_detector_registry, DetectionInput, DetectorRegistry, Finding, PatternDetector, PatternOutput,
    PointerTableDetector, RegionDetector, StrideTableDetector, TextRunDetector,
};
pub use entropy::{shannon_entropy, EntropyClassifier, EntropyConfig, WindowStats};
pub use partition::RegionMap;
pub use walker::{ControlFlowWalker, VisitState, WalkOutput, WalkerConfig};

/// Cooperative stop signal shared between a caller and a running analysis.
///
/// Checked before each unit of work; a unit that has started always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self, stage: &'static str) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}
