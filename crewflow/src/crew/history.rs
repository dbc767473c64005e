//! Titles of previously generated ideas.

use std::sync::LazyLock;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::debug;

use super::IDEA_STAGE;
use crate::core::{StageStatus, StatusEvent};
use crate::events::StatusListener;

#[allow(clippy::expect_used)]
static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Title:\s*(.+?)\s*$").expect("title pattern is valid"));

/// Pulls the idea title out of an idea-stage output.
///
/// Uses the first `Title:` line, or the first non-empty line when there is
/// none.
#[must_use]
pub fn extract_title(output: &str) -> Option<String> {
    if let Some(caps) = TITLE_LINE.captures(output) {
        return Some(caps[1].to_string());
    }
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Append-only record of idea titles across runs.
///
/// Subscribe it to an orchestrator; it captures the idea stage's latest
/// output and records its title when the stage completes. A reset does not
/// clear it.
#[derive(Debug, Default)]
pub struct IdeaHistory {
    titles: RwLock<Vec<String>>,
    pending: Mutex<Option<String>>,
}

impl IdeaHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Titles in the order they were generated.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.titles.read().clone()
    }

    /// Number of recorded titles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.read().is_empty()
    }

    /// Records a title directly.
    pub fn record(&self, title: impl Into<String>) {
        let title = title.into();
        debug!(%title, "Idea recorded");
        self.titles.write().push(title);
    }
}

impl StatusListener for IdeaHistory {
    fn on_event(&self, event: &StatusEvent) {
        match event {
            StatusEvent::StageOutputUpdated { stage_id, output } if stage_id == IDEA_STAGE => {
                *self.pending.lock() = Some(output.clone());
            }
            StatusEvent::StageStatusChanged { stage_id, status } if stage_id == IDEA_STAGE => {
                let pending = self.pending.lock().take();
                if *status == StageStatus::Completed {
                    if let Some(title) = pending.as_deref().and_then(extract_title) {
                        self.record(title);
                    }
                }
            }
            _ => {}
        }
    }
}
