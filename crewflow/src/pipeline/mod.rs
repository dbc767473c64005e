//! Pipeline definition and execution.
//!
//! This module provides:
//! - Stage definitions with prompt builders
//! - Pipeline builder with validation
//! - The validated stage graph and wavefront planning
//! - The orchestrator that runs it

mod builder;
mod dag;
mod orchestrator;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use dag::StageGraph;
pub use orchestrator::{PipelineOrchestrator, RunReport};
pub use spec::{PromptBuilder, SeedFn, StageDefinition};
