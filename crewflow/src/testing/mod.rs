//! Testing utilities for crewflow pipelines.
//!
//! This module provides:
//! - A scripted transport with per-prompt outcomes, delays and barriers
//! - Random stage graph fixtures
//! - Assertions over recorded status events

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_dependencies_respected, assert_prefix_monotonic, assert_single_lifecycle,
};
pub use fixtures::{fixture_prompt, fixture_stage, random_dag};
pub use mocks::{CallLog, ScriptStep, ScriptedTransport};
