//! Spans shared by the orchestrator.

use crate::context::RunIdentity;
use tracing::Span;

/// Span covering one pipeline run.
#[must_use]
pub fn run_span(identity: &RunIdentity) -> Span {
    tracing::info_span!(
        "pipeline_run",
        run_id = %identity.run_id,
        generation = identity.generation,
    )
}

/// Span covering one stage execution.
#[must_use]
pub fn stage_span(stage_id: &str) -> Span {
    tracing::debug_span!("stage", stage = %stage_id)
}
