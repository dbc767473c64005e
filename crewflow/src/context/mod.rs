//! Run-scoped context.
//!
//! This module provides:
//! - The write-once store of finished stage outputs
//! - Run identity with the reset generation tag

mod identity;
mod outputs;

pub use identity::RunIdentity;
pub use outputs::{ContextEntry, PipelineContext};
