//! Run identity for tagging pipeline executions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one run of the pipeline.
///
/// The generation increases on every `reset`; writes tagged with an older
/// generation belong to an abandoned run and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique id for log correlation.
    pub run_id: Uuid,
    /// Monotonic reset counter of the owning orchestrator.
    pub generation: u64,
}

impl RunIdentity {
    /// Creates a new identity for the given generation.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generation,
        }
    }

    /// Returns true if this identity belongs to `generation`.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}
