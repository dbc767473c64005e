//! Status change events delivered to tracker listeners.

use super::{RunStatus, StageStatus};
use serde::{Deserialize, Serialize};

/// A change observed by the status tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A stage moved to a new lifecycle state.
    StageStatusChanged {
        /// The stage id.
        stage_id: String,
        /// The new status.
        status: StageStatus,
    },

    /// A stage's preview or final text changed.
    StageOutputUpdated {
        /// The stage id.
        stage_id: String,
        /// The full text so far.
        output: String,
    },

    /// The run moved to a new state.
    RunStatusChanged {
        /// The new run status.
        status: RunStatus,
        /// The first fatal error, when `status` is `Error`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StatusEvent {
    /// Dotted event name, used as the log message.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStatusChanged { .. } => "stage.status",
            Self::StageOutputUpdated { .. } => "stage.output",
            Self::RunStatusChanged { .. } => "run.status",
        }
    }

    /// The stage this event is about, if any.
    #[must_use]
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            Self::StageStatusChanged { stage_id, .. } | Self::StageOutputUpdated { stage_id, .. } => {
                Some(stage_id)
            }
            Self::RunStatusChanged { .. } => None,
        }
    }

    /// Creates a stage status event.
    #[must_use]
    pub fn stage_status(stage_id: impl Into<String>, status: StageStatus) -> Self {
        Self::StageStatusChanged {
            stage_id: stage_id.into(),
            status,
        }
    }

    /// Creates a stage output event.
    #[must_use]
    pub fn stage_output(stage_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::StageOutputUpdated {
            stage_id: stage_id.into(),
            output: output.into(),
        }
    }

    /// Creates a run status event.
    #[must_use]
    pub fn run_status(status: RunStatus, error: Option<String>) -> Self {
        Self::RunStatusChanged { status, error }
    }
}
