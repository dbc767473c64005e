//! Core domain model types for crewflow.
//!
//! - Stage and run status enums
//! - Status change events

mod event;
mod status;

pub use event::StatusEvent;
pub use status::{RunStatus, StageStatus};
