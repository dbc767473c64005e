//! Status listener trait and implementations.

use crate::core::StatusEvent;
use tracing::{debug, info, Level};

/// Receives status changes from a [`StatusTracker`](super::StatusTracker).
///
/// Listeners are called synchronously, in mutation order, and must not block.
/// They observe the pipeline; they never mutate it.
pub trait StatusListener: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &StatusEvent);
}

impl<F> StatusListener for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_event(&self, event: &StatusEvent) {
        self(event);
    }
}

/// A listener that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusListener;

impl StatusListener for NoOpStatusListener {
    fn on_event(&self, _event: &StatusEvent) {}
}

/// A listener that logs events using the tracing framework.
///
/// Output previews are logged by length only; they change on every fragment.
#[derive(Debug, Clone)]
pub struct LoggingStatusListener {
    level: Level,
}

impl Default for LoggingStatusListener {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingStatusListener {
    /// Creates a new logging listener with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging listener.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &StatusEvent) {
        let event_type = event.event_type();
        match event {
            StatusEvent::StageOutputUpdated { stage_id, output } => {
                debug!(event_type = %event_type, stage = %stage_id, chars = output.len(), "Event: {}", event_type);
            }
            StatusEvent::StageStatusChanged { stage_id, status } => {
                if self.level == Level::DEBUG {
                    debug!(event_type = %event_type, stage = %stage_id, %status, "Event: {}", event_type);
                } else {
                    info!(event_type = %event_type, stage = %stage_id, %status, "Event: {}", event_type);
                }
            }
            StatusEvent::RunStatusChanged { status, error } => {
                if self.level == Level::DEBUG {
                    debug!(event_type = %event_type, %status, error = ?error, "Event: {}", event_type);
                } else {
                    info!(event_type = %event_type, %status, error = ?error, "Event: {}", event_type);
                }
            }
        }
    }
}

impl StatusListener for LoggingStatusListener {
    fn on_event(&self, event: &StatusEvent) {
        self.log_event(event);
    }
}

/// A collecting listener for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingStatusListener {
    events: parking_lot::RwLock<Vec<StatusEvent>>,
}

impl CollectingStatusListener {
    /// Creates a new collecting listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the events about one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage_id: &str) -> Vec<StatusEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage_id() == Some(stage_id))
            .cloned()
            .collect()
    }

    /// Returns the sequence of statuses one stage went through.
    #[must_use]
    pub fn stage_statuses(&self, stage_id: &str) -> Vec<crate::core::StageStatus> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::StageStatusChanged { stage_id: id, status } if id == stage_id => {
                    Some(*status)
                }
                _ => None,
            })
            .collect()
    }

    /// Returns every output preview published for one stage.
    #[must_use]
    pub fn stage_outputs(&self, stage_id: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::StageOutputUpdated { stage_id: id, output } if id == stage_id => {
                    Some(output.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the sequence of run statuses.
    #[must_use]
    pub fn run_statuses(&self) -> Vec<crate::core::RunStatus> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::RunStatusChanged { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl StatusListener for CollectingStatusListener {
    fn on_event(&self, event: &StatusEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunStatus, StageStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_noop_listener() {
        NoOpStatusListener.on_event(&StatusEvent::run_status(RunStatus::Running, None));
    }

    #[test]
    fn test_logging_listener() {
        let listener = LoggingStatusListener::default();
        listener.on_event(&StatusEvent::stage_status("a", StageStatus::Working));
        listener.on_event(&StatusEvent::stage_output("a", "partial"));
        LoggingStatusListener::debug().on_event(&StatusEvent::run_status(
            RunStatus::Error,
            Some("boom".to_string()),
        ));
    }

    #[test]
    fn test_closure_listener() {
        let count = AtomicUsize::new(0);
        let listener = |_: &StatusEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        };
        listener.on_event(&StatusEvent::stage_status("a", StageStatus::Idle));
        listener.on_event(&StatusEvent::stage_status("a", StageStatus::Working));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_collecting_listener_filters() {
        let listener = CollectingStatusListener::new();
        assert!(listener.is_empty());

        listener.on_event(&StatusEvent::run_status(RunStatus::Running, None));
        listener.on_event(&StatusEvent::stage_status("a", StageStatus::Working));
        listener.on_event(&StatusEvent::stage_output("a", "he"));
        listener.on_event(&StatusEvent::stage_output("a", "hello"));
        listener.on_event(&StatusEvent::stage_status("b", StageStatus::Working));
        listener.on_event(&StatusEvent::stage_status("a", StageStatus::Completed));

        assert_eq!(listener.len(), 6);
        assert_eq!(listener.events_for_stage("a").len(), 4);
        assert_eq!(
            listener.stage_statuses("a"),
            vec![StageStatus::Working, StageStatus::Completed]
        );
        assert_eq!(listener.stage_outputs("a"), vec!["he".to_string(), "hello".to_string()]);
        assert_eq!(listener.run_statuses(), vec![RunStatus::Running]);

        listener.clear();
        assert!(listener.is_empty());
    }
}
