//! Per-run status tracker with change notifications.

use super::StatusListener;
use crate::core::{RunStatus, StageStatus, StatusEvent};
use crate::utils::Timestamp;
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle returned by [`StatusTracker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Everything the tracker knows about one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Current lifecycle state.
    pub status: StageStatus,
    /// Latest preview or final text.
    pub output: String,
    /// Failure message, once the stage errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the stage entered `working`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When the stage reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

/// A point-in-time copy of the tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Generation the snapshot belongs to.
    pub generation: u64,
    /// Run status.
    pub run_status: RunStatus,
    /// First fatal error of the run.
    pub run_error: Option<String>,
    /// Stages in registration order.
    pub stages: Vec<(String, StageRecord)>,
}

#[derive(Debug, Default)]
struct TrackerState {
    generation: u64,
    run_status: RunStatus,
    run_error: Option<String>,
    stages: HashMap<String, StageRecord>,
    order: Vec<String>,
}

/// Records stage and run status for the current run and notifies listeners.
///
/// Every mutation can be tagged with the run generation it was issued under
/// (see [`StatusTracker::scoped`]). Writes tagged with an older generation are
/// discarded, so a stage task abandoned by `reset` cannot touch a newer run.
///
/// Listeners are notified after the state lock is released, so they may
/// query or update the tracker. Mutations are serialized together with their
/// notifications, so listeners observe events in the order they were applied.
pub struct StatusTracker {
    delivery: ReentrantMutex<()>,
    state: RwLock<TrackerState>,
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn StatusListener>)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("StatusTracker")
            .field("generation", &state.generation)
            .field("run_status", &state.run_status)
            .field("stages", &state.order)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl StatusTracker {
    /// Creates a tracker with every stage `idle`.
    pub fn new(stage_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut state = TrackerState::default();
        for id in stage_ids {
            let id = id.into();
            if !state.stages.contains_key(&id) {
                state.order.push(id.clone());
                state.stages.insert(id, StageRecord::default());
            }
        }
        Self {
            delivery: ReentrantMutex::new(()),
            state: RwLock::new(state),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Registers a listener for all future changes.
    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Returns a view whose writes only apply while `generation` is current.
    #[must_use]
    pub fn scoped(&self, generation: u64) -> ScopedTracker<'_> {
        ScopedTracker {
            tracker: self,
            generation,
        }
    }

    /// Sets a stage's status in the current generation.
    ///
    /// Returns false if the transition is illegal or the stage is unknown.
    pub fn set_stage_status(&self, stage_id: &str, status: StageStatus) -> bool {
        self.apply(None, |state| transition(state, stage_id, status, None))
    }

    /// Marks a stage as failed with a message.
    pub fn set_stage_error(&self, stage_id: &str, message: &str) -> bool {
        self.apply(None, |state| {
            transition(state, stage_id, StageStatus::Error, Some(message))
        })
    }

    /// Publishes a stage's preview or final text.
    ///
    /// Only a `working` stage accepts output.
    pub fn set_stage_output(&self, stage_id: &str, output: &str) -> bool {
        self.apply(None, |state| update_output(state, stage_id, output))
    }

    /// Sets the run status and optional error message.
    pub fn set_run_status(&self, status: RunStatus, error: Option<&str>) -> bool {
        self.apply(None, |state| update_run(state, status, error))
    }

    /// Moves an `idle` run to `running` and returns the generation it runs
    /// under.
    ///
    /// # Errors
    ///
    /// Returns the current run status if the run is not `idle`.
    pub fn begin_run(&self) -> Result<u64, RunStatus> {
        let _delivery = self.delivery.lock();
        let (generation, event) = {
            let mut state = self.state.write();
            if state.run_status != RunStatus::Idle {
                return Err(state.run_status);
            }
            state.run_status = RunStatus::Running;
            state.run_error = None;
            (state.generation, StatusEvent::run_status(RunStatus::Running, None))
        };
        self.notify(std::slice::from_ref(&event));
        Ok(generation)
    }

    /// Starts a new generation: every stage back to `idle`, run `idle`.
    ///
    /// Returns the new generation.
    pub fn reset(&self) -> u64 {
        let _delivery = self.delivery.lock();
        let mut events = Vec::new();
        let generation = {
            let mut state = self.state.write();
            state.generation += 1;
            state.run_error = None;
            if state.run_status != RunStatus::Idle {
                state.run_status = RunStatus::Idle;
                events.push(StatusEvent::run_status(RunStatus::Idle, None));
            }
            let TrackerState { stages, order, .. } = &mut *state;
            for id in order.iter() {
                if let Some(record) = stages.get_mut(id) {
                    if record.status != StageStatus::Idle {
                        events.push(StatusEvent::stage_status(id.clone(), StageStatus::Idle));
                    }
                    *record = StageRecord::default();
                }
            }
            state.generation
        };
        debug!(generation, "Status tracker reset");
        self.notify(&events);
        generation
    }

    /// Returns a stage's status.
    #[must_use]
    pub fn stage_status(&self, stage_id: &str) -> Option<StageStatus> {
        self.state.read().stages.get(stage_id).map(|r| r.status)
    }

    /// Returns a stage's latest text.
    #[must_use]
    pub fn stage_output(&self, stage_id: &str) -> Option<String> {
        self.state.read().stages.get(stage_id).map(|r| r.output.clone())
    }

    /// Returns a stage's full record.
    #[must_use]
    pub fn stage_record(&self, stage_id: &str) -> Option<StageRecord> {
        self.state.read().stages.get(stage_id).cloned()
    }

    /// Returns the run status.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        self.state.read().run_status
    }

    /// Returns the first fatal error of the run.
    #[must_use]
    pub fn run_error(&self) -> Option<String> {
        self.state.read().run_error.clone()
    }

    /// Returns a copy of the full state.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.read();
        TrackerSnapshot {
            generation: state.generation,
            run_status: state.run_status,
            run_error: state.run_error.clone(),
            stages: state
                .order
                .iter()
                .filter_map(|id| state.stages.get(id).map(|r| (id.clone(), r.clone())))
                .collect(),
        }
    }

    fn apply<F>(&self, generation: Option<u64>, mutate: F) -> bool
    where
        F: FnOnce(&mut TrackerState) -> Option<StatusEvent>,
    {
        // Held through notify; always taken before the state lock.
        let _delivery = self.delivery.lock();
        let event = {
            let mut state = self.state.write();
            if let Some(generation) = generation {
                if generation != state.generation {
                    debug!(
                        stale = generation,
                        current = state.generation,
                        "Discarding status write from a previous run"
                    );
                    return false;
                }
            }
            mutate(&mut state)
        };
        match event {
            Some(event) => {
                self.notify(std::slice::from_ref(&event));
                true
            }
            None => false,
        }
    }

    fn notify(&self, events: &[StatusEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn StatusListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
    }
}

/// Generation-checked writer returned by [`StatusTracker::scoped`].
#[derive(Debug, Clone, Copy)]
pub struct ScopedTracker<'a> {
    tracker: &'a StatusTracker,
    generation: u64,
}

impl ScopedTracker<'_> {
    /// The generation this view writes for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true while this view's generation is current.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.tracker.generation() == self.generation
    }

    /// See [`StatusTracker::set_stage_status`].
    pub fn set_stage_status(&self, stage_id: &str, status: StageStatus) -> bool {
        self.tracker
            .apply(Some(self.generation), |state| transition(state, stage_id, status, None))
    }

    /// See [`StatusTracker::set_stage_error`].
    pub fn set_stage_error(&self, stage_id: &str, message: &str) -> bool {
        self.tracker.apply(Some(self.generation), |state| {
            transition(state, stage_id, StageStatus::Error, Some(message))
        })
    }

    /// See [`StatusTracker::set_stage_output`].
    pub fn set_stage_output(&self, stage_id: &str, output: &str) -> bool {
        self.tracker
            .apply(Some(self.generation), |state| update_output(state, stage_id, output))
    }

    /// See [`StatusTracker::set_run_status`].
    pub fn set_run_status(&self, status: RunStatus, error: Option<&str>) -> bool {
        self.tracker
            .apply(Some(self.generation), |state| update_run(state, status, error))
    }
}

fn transition(
    state: &mut TrackerState,
    stage_id: &str,
    status: StageStatus,
    error: Option<&str>,
) -> Option<StatusEvent> {
    let Some(record) = state.stages.get_mut(stage_id) else {
        warn!(stage = %stage_id, "Status change for unknown stage ignored");
        return None;
    };
    if !record.status.can_transition_to(status) {
        warn!(
            stage = %stage_id,
            from = %record.status,
            to = %status,
            "Illegal stage transition rejected"
        );
        return None;
    }
    record.status = status;
    match status {
        StageStatus::Working => record.started_at = Some(crate::utils::now_utc()),
        StageStatus::Completed | StageStatus::Error => {
            record.finished_at = Some(crate::utils::now_utc());
        }
        StageStatus::Idle => {}
    }
    if let Some(message) = error {
        record.error = Some(message.to_string());
    }
    Some(StatusEvent::stage_status(stage_id, status))
}

fn update_output(state: &mut TrackerState, stage_id: &str, output: &str) -> Option<StatusEvent> {
    let Some(record) = state.stages.get_mut(stage_id) else {
        warn!(stage = %stage_id, "Output for unknown stage ignored");
        return None;
    };
    if record.status != StageStatus::Working {
        warn!(stage = %stage_id, status = %record.status, "Output for a stage that is not working ignored");
        return None;
    }
    record.output.clear();
    record.output.push_str(output);
    Some(StatusEvent::stage_output(stage_id, output))
}

fn update_run(state: &mut TrackerState, status: RunStatus, error: Option<&str>) -> Option<StatusEvent> {
    if state.run_status == status {
        return None;
    }
    state.run_status = status;
    // First fatal error wins.
    if status == RunStatus::Error && state.run_error.is_none() {
        state.run_error = error.map(str::to_string);
    }
    Some(StatusEvent::run_status(status, state.run_error.clone().filter(|_| status == RunStatus::Error)))
}
