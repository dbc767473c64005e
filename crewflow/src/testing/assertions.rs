//! Assertions over recorded status events.

use std::collections::HashSet;

use crate::core::{StageStatus, StatusEvent};
use crate::pipeline::StageGraph;

/// Asserts that every snapshot is a prefix of the next.
pub fn assert_prefix_monotonic(snapshots: &[String]) {
    for pair in snapshots.windows(2) {
        assert!(
            pair[1].starts_with(&pair[0]),
            "Snapshot {:?} is not a prefix of {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// Asserts that no stage became `working` before all its dependencies were
/// `completed`.
pub fn assert_dependencies_respected(graph: &StageGraph, events: &[StatusEvent]) {
    let mut completed: HashSet<&str> = HashSet::new();
    for event in events {
        if let StatusEvent::StageStatusChanged { stage_id, status } = event {
            match status {
                StageStatus::Working => {
                    let stage = graph
                        .stage(stage_id)
                        .unwrap_or_else(|| panic!("Unknown stage '{stage_id}' in events"));
                    for dep in &stage.depends_on {
                        assert!(
                            completed.contains(dep.as_str()),
                            "Stage '{stage_id}' started before dependency '{dep}' completed"
                        );
                    }
                }
                StageStatus::Completed => {
                    completed.insert(stage_id);
                }
                StageStatus::Idle | StageStatus::Error => {}
            }
        }
    }
}

/// Asserts that a stage went through at most one `idle -> working ->
/// terminal` pass.
pub fn assert_single_lifecycle(events: &[StatusEvent], stage_id: &str) {
    let statuses: Vec<StageStatus> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::StageStatusChanged { stage_id: id, status } if id == stage_id => {
                Some(*status)
            }
            _ => None,
        })
        .collect();
    let valid = matches!(
        statuses.as_slice(),
        [] | [StageStatus::Working]
            | [StageStatus::Working, StageStatus::Completed]
            | [StageStatus::Working, StageStatus::Error]
    );
    assert!(valid, "Stage '{stage_id}' had an invalid lifecycle: {statuses:?}");
}
