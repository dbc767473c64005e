//! Pipeline orchestrator.
//!
//! Runs a [`StageGraph`] in wavefronts: every stage whose dependencies are
//! finished launches at once, and the next wavefront is computed only after
//! all members of the current one reach a terminal state. Stage futures are
//! multiplexed on the calling task; nothing is spawned.

use super::{StageDefinition, StageGraph};
use crate::client::{Invocation, PromptTransport, RetryingApiClient};
use crate::config::{ApiCredential, CrewflowConfig};
use crate::context::{ContextEntry, PipelineContext, RunIdentity};
use crate::core::{RunStatus, StageStatus};
use crate::errors::{ApiError, ConfigurationError, CrewflowError, OutputConflictError};
use crate::events::{ScopedTracker, StatusListener, StatusTracker, SubscriptionId};
use crate::observability::{run_span, stage_span};
use crate::streaming::StreamAggregator;
use crate::utils::{duration_ms, format_iso8601, now_utc, Timestamp};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Summary of one call to [`PipelineOrchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Generation the run executed under.
    pub generation: u64,
    /// Final run status. A superseded run reports `idle`, the state the
    /// reset left the pipeline in.
    pub status: RunStatus,
    /// First fatal stage error.
    pub error: Option<ApiError>,
    /// Finished outputs by stage id.
    pub outputs: HashMap<String, String>,
    /// Attempt that produced each output (0 for a seeded stage).
    pub attempts: HashMap<String, u32>,
    /// When the run started.
    pub started_at: Timestamp,
    /// Wall-clock duration.
    pub duration: Duration,
    /// True if `reset` abandoned the run before it finished.
    pub superseded: bool,
}

impl RunReport {
    /// Returns true if every stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Output of one stage.
    #[must_use]
    pub fn output(&self, stage_id: &str) -> Option<&str> {
        self.outputs.get(stage_id).map(String::as_str)
    }
}

/// Context visible outside the run, tagged with the generation that owns it.
#[derive(Debug, Default)]
struct SharedContext {
    generation: u64,
    context: PipelineContext,
}

#[derive(Debug)]
enum CredentialCheck {
    Skip,
    Require(Option<ApiCredential>),
}

struct StageOutcome {
    stage_id: String,
    result: Result<ContextEntry, ApiError>,
}

enum WaveEnd {
    Finished,
    Superseded,
}

/// Drives a stage graph against the model API.
///
/// Lifecycle: `idle -> running -> {completed | error}`. Only
/// [`reset`](Self::reset) leaves a terminal state.
pub struct PipelineOrchestrator {
    graph: StageGraph,
    client: RetryingApiClient,
    tracker: Arc<StatusTracker>,
    context: RwLock<SharedContext>,
    generation: watch::Sender<u64>,
    credential: CredentialCheck,
    stage_delay: Duration,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("stages", &self.graph.stage_ids())
            .field("tracker", &self.tracker)
            .field("stage_delay", &self.stage_delay)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator that performs no credential check.
    pub fn new(graph: StageGraph, client: RetryingApiClient) -> Self {
        let tracker = Arc::new(StatusTracker::new(graph.stage_ids()));
        let (generation, _) = watch::channel(tracker.generation());
        Self {
            graph,
            client,
            tracker,
            context: RwLock::new(SharedContext::default()),
            generation,
            credential: CredentialCheck::Skip,
            stage_delay: Duration::ZERO,
        }
    }

    /// Creates an orchestrator from configuration.
    ///
    /// The configured credential is checked at the start of every run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Invalid` if the configuration fails
    /// validation.
    pub fn from_config(
        graph: StageGraph,
        transport: Arc<dyn PromptTransport>,
        config: &CrewflowConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let client = RetryingApiClient::with_config(transport, config.retry.clone());
        Ok(Self::new(graph, client)
            .with_credential(config.api_key.clone())
            .with_stage_delay(config.stage_delay()))
    }

    /// Requires a usable credential before each run.
    #[must_use]
    pub fn with_credential(mut self, credential: Option<ApiCredential>) -> Self {
        self.credential = CredentialCheck::Require(credential);
        self
    }

    /// Sets the pause between wavefronts.
    #[must_use]
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// The stage graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// The retrying client.
    #[must_use]
    pub fn client(&self) -> &RetryingApiClient {
        &self.client
    }

    /// The status tracker observers read from.
    #[must_use]
    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    /// Registers a status listener.
    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) -> SubscriptionId {
        self.tracker.subscribe(listener)
    }

    /// Removes a status listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    /// Current run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.tracker.run_status()
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// A copy of the outputs finished in the current generation.
    #[must_use]
    pub fn context(&self) -> PipelineContext {
        self.context.read().context.clone()
    }

    /// Abandons any run in flight and returns every structure to `idle`.
    ///
    /// Returns the new generation. Writes from the abandoned run are
    /// discarded from now on.
    pub fn reset(&self) -> u64 {
        let generation = self.tracker.reset();
        {
            let mut shared = self.context.write();
            shared.generation = generation;
            shared.context.clear();
        }
        self.generation.send_replace(generation);
        info!(generation, "Pipeline reset");
        generation
    }

    /// Runs the pipeline once.
    ///
    /// A non-empty `initial_input` bypasses the first stage: its output is
    /// seeded from the input and the API is not called for it.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` or `NotReset` if the pipeline is not idle,
    /// `Configuration` if the credential is missing, and `OutputConflict` if
    /// a stage output is recorded twice. Stage failures are not errors here;
    /// they are reported in the returned [`RunReport`].
    pub async fn run(&self, initial_input: Option<&str>) -> Result<RunReport, CrewflowError> {
        match self.tracker.run_status() {
            RunStatus::Idle => {}
            RunStatus::Running => return Err(CrewflowError::AlreadyRunning),
            status => return Err(CrewflowError::NotReset(status)),
        }
        self.check_credential()?;

        let mut rx = self.generation.subscribe();
        let generation = self.tracker.begin_run().map_err(|status| match status {
            RunStatus::Idle | RunStatus::Running => CrewflowError::AlreadyRunning,
            other => CrewflowError::NotReset(other),
        })?;
        rx.borrow_and_update();

        let identity = RunIdentity::new(generation);
        self.execute(identity, initial_input, rx)
            .instrument(run_span(&identity))
            .await
    }

    fn check_credential(&self) -> Result<(), ConfigurationError> {
        match &self.credential {
            CredentialCheck::Skip => Ok(()),
            CredentialCheck::Require(Some(key)) if !key.is_placeholder() => Ok(()),
            CredentialCheck::Require(_) => {
                warn!("Run refused: no usable API credential configured");
                Err(ConfigurationError::MissingCredential)
            }
        }
    }

    async fn execute(
        &self,
        identity: RunIdentity,
        initial_input: Option<&str>,
        mut rx: watch::Receiver<u64>,
    ) -> Result<RunReport, CrewflowError> {
        let started_at = now_utc();
        let start = Instant::now();
        let generation = identity.generation;
        let scope = self.tracker.scoped(generation);
        let mut local = PipelineContext::new();
        {
            let mut shared = self.context.write();
            if shared.generation == generation {
                shared.context.clear();
            }
        }
        info!(
            stages = self.graph.len(),
            started_at = %format_iso8601(&started_at),
            "Pipeline run started"
        );

        if let Some(input) = initial_input.map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(first) = self.graph.first() {
                let seeded = first.seed(input);
                scope.set_stage_status(&first.id, StageStatus::Working);
                scope.set_stage_output(&first.id, &seeded);
                let entry = ContextEntry {
                    output: seeded,
                    attempts: 0,
                    seeded: true,
                };
                self.complete_stage(scope, &mut local, &first.id, entry)
                    .map_err(|conflict| self.abort_on_conflict(scope, conflict))?;
                debug!(stage = %first.id, "Stage seeded from initial input");
            }
        }

        let mut launched: HashSet<String> = local.completion_order().iter().cloned().collect();
        let mut first_error: Option<ApiError> = None;
        let mut wavefront = 0usize;

        loop {
            let wave = self.graph.next_wavefront(&local, &launched);
            if wave.is_empty() {
                break;
            }
            if wavefront > 0 && !self.stage_delay.is_zero() {
                tokio::select! {
                    biased;
                    () = superseded(&mut rx, generation) => {
                        return Ok(self.report(identity, started_at, start, &local, first_error, true));
                    }
                    () = tokio::time::sleep(self.stage_delay) => {}
                }
            }
            wavefront += 1;
            debug!(
                wavefront,
                stages = ?wave.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "Launching wavefront"
            );
            launched.extend(wave.iter().map(|s| s.id.clone()));

            let snapshot = local.clone();
            let end = self
                .run_wavefront(wave, scope, &snapshot, &mut local, &mut first_error, &mut rx)
                .await?;
            if matches!(end, WaveEnd::Superseded) {
                info!("Run superseded by reset");
                return Ok(self.report(identity, started_at, start, &local, first_error, true));
            }
            if first_error.is_some() {
                break;
            }
        }

        let report = if first_error.is_some() {
            self.report(identity, started_at, start, &local, first_error, false)
        } else {
            scope.set_run_status(RunStatus::Completed, None);
            self.report(identity, started_at, start, &local, None, false)
        };
        info!(
            status = %report.status,
            completed = report.outputs.len(),
            duration_ms = duration_ms(report.duration),
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Runs one wavefront to its fan-in barrier.
    async fn run_wavefront(
        &self,
        wave: Vec<&StageDefinition>,
        scope: ScopedTracker<'_>,
        snapshot: &PipelineContext,
        local: &mut PipelineContext,
        first_error: &mut Option<ApiError>,
        rx: &mut watch::Receiver<u64>,
    ) -> Result<WaveEnd, CrewflowError> {
        let generation = scope.generation();
        let mut in_flight: FuturesUnordered<_> = wave
            .into_iter()
            .map(|stage| self.run_stage(stage, scope, snapshot))
            .collect();

        loop {
            let next = tokio::select! {
                biased;
                () = superseded(rx, generation) => return Ok(WaveEnd::Superseded),
                next = in_flight.next() => next,
            };
            let Some(StageOutcome { stage_id, result }) = next else {
                return Ok(WaveEnd::Finished);
            };
            match result {
                Ok(entry) => {
                    self.complete_stage(scope, local, &stage_id, entry)
                        .map_err(|conflict| self.abort_on_conflict(scope, conflict))?;
                }
                Err(error) => {
                    warn!(stage = %stage_id, kind = %error.kind, error = %error, "Stage failed");
                    scope.set_stage_error(&stage_id, &error.message);
                    if first_error.is_none() {
                        scope.set_run_status(RunStatus::Error, Some(&error.message));
                        *first_error = Some(error);
                    }
                }
            }
        }
    }

    async fn run_stage(
        &self,
        stage: &StageDefinition,
        scope: ScopedTracker<'_>,
        context: &PipelineContext,
    ) -> StageOutcome {
        let result = self
            .invoke_stage(stage, scope, context)
            .instrument(stage_span(&stage.id))
            .await;
        StageOutcome {
            stage_id: stage.id.clone(),
            result,
        }
    }

    async fn invoke_stage(
        &self,
        stage: &StageDefinition,
        scope: ScopedTracker<'_>,
        context: &PipelineContext,
    ) -> Result<ContextEntry, ApiError> {
        scope.set_stage_status(&stage.id, StageStatus::Working);
        let prompt = stage.build_prompt(context);
        debug!(prompt_chars = prompt.len(), "Invoking model");

        let Invocation {
            mut fragments,
            attempts,
            ..
        } = self.client.invoke(&prompt).await?;

        let mut aggregator = StreamAggregator::new();
        while let Some(item) = fragments.next().await {
            let fragment = item.map_err(|e| self.client.classify_stream_error(&e))?;
            aggregator.push(&fragment);
            scope.set_stage_output(&stage.id, aggregator.snapshot());
        }
        aggregator.finish();
        debug!(
            attempts,
            fragments = aggregator.fragment_count(),
            "Stage response complete"
        );
        Ok(ContextEntry {
            output: aggregator.into_output(),
            attempts,
            seeded: false,
        })
    }

    /// Records a finished output and marks the stage completed.
    fn complete_stage(
        &self,
        scope: ScopedTracker<'_>,
        local: &mut PipelineContext,
        stage_id: &str,
        entry: ContextEntry,
    ) -> Result<(), OutputConflictError> {
        local.insert(stage_id, entry.clone())?;
        {
            let mut shared = self.context.write();
            if shared.generation == scope.generation() {
                shared.context.insert(stage_id, entry)?;
            }
        }
        scope.set_stage_status(stage_id, StageStatus::Completed);
        Ok(())
    }

    fn abort_on_conflict(&self, scope: ScopedTracker<'_>, conflict: OutputConflictError) -> CrewflowError {
        let message = conflict.to_string();
        warn!(stage = %conflict.stage, error = %message, "Output recorded twice; aborting run");
        scope.set_stage_error(&conflict.stage, &message);
        scope.set_run_status(RunStatus::Error, Some(&message));
        conflict.into()
    }

    fn report(
        &self,
        identity: RunIdentity,
        started_at: Timestamp,
        start: Instant,
        local: &PipelineContext,
        error: Option<ApiError>,
        superseded: bool,
    ) -> RunReport {
        let status = if superseded {
            RunStatus::Idle
        } else if error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };
        RunReport {
            run_id: identity.run_id,
            generation: identity.generation,
            status,
            error,
            outputs: local.outputs(),
            attempts: local.attempts(),
            started_at,
            duration: start.elapsed(),
            superseded,
        }
    }
}

/// Resolves once the generation moves past `generation`.
async fn superseded(rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if rx.changed().await.is_err() {
            return;
        }
        if *rx.borrow_and_update() != generation {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryConfig;
    use crate::events::CollectingStatusListener;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::{ScriptStep, ScriptedTransport};

    fn two_stage_graph() -> StageGraph {
        PipelineBuilder::new()
            .stage(StageDefinition::new("a", |_| "prompt:a".to_string()))
            .stage(
                StageDefinition::new("b", |ctx| format!("prompt:b <{}>", ctx.get_or_empty("a")))
                    .with_dependency("a"),
            )
            .build()
            .unwrap()
    }

    fn orchestrator(transport: ScriptedTransport) -> PipelineOrchestrator {
        let client = RetryingApiClient::with_config(Arc::new(transport), RetryConfig::default());
        PipelineOrchestrator::new(two_stage_graph(), client)
    }

    #[tokio::test]
    async fn test_run_completes_and_feeds_dependents() {
        let transport = ScriptedTransport::new()
            .on("prompt:a", [ScriptStep::respond(["Hel", "lo"])])
            .on("prompt:b", [ScriptStep::respond(["World"])]);
        let calls = transport.call_log();
        let orch = orchestrator(transport);

        let report = orch.run(None).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.output("a"), Some("Hello"));
        assert_eq!(report.output("b"), Some("World"));
        assert!(calls.prompts().contains(&"prompt:b <Hello>".to_string()));
        assert_eq!(orch.status(), RunStatus::Completed);
        assert_eq!(orch.context().get("b"), Some("World"));
    }

    #[tokio::test]
    async fn test_run_requires_idle() {
        let orch = orchestrator(ScriptedTransport::new());
        orch.run(None).await.unwrap();

        let err = orch.run(None).await.unwrap_err();
        assert!(matches!(err, CrewflowError::NotReset(RunStatus::Completed)));

        orch.reset();
        assert!(orch.run(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_seeded_first_stage_skips_api() {
        let transport = ScriptedTransport::new();
        let calls = transport.call_log();
        let orch = orchestrator(transport);
        let listener = Arc::new(CollectingStatusListener::new());
        orch.subscribe(listener.clone());

        let report = orch.run(Some("  my idea  ")).await.unwrap();
        assert_eq!(report.output("a"), Some("my idea"));
        assert_eq!(report.attempts.get("a"), Some(&0));
        assert_eq!(calls.prompts(), vec!["prompt:b <my idea>".to_string()]);
        assert_eq!(
            listener.stage_statuses("a"),
            vec![StageStatus::Working, StageStatus::Completed]
        );
        assert!(orch.context().entry("a").unwrap().seeded);
    }

    #[tokio::test]
    async fn test_blank_initial_input_is_ignored() {
        let transport = ScriptedTransport::new();
        let calls = transport.call_log();
        let orch = orchestrator(transport);
        orch.run(Some("   ")).await.unwrap();
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_refuses_run() {
        let orch = orchestrator(ScriptedTransport::new()).with_credential(None);
        let err = orch.run(None).await.unwrap_err();
        assert!(matches!(
            err,
            CrewflowError::Configuration(ConfigurationError::MissingCredential)
        ));
        assert_eq!(orch.status(), RunStatus::Idle);

        let orch = orchestrator(ScriptedTransport::new())
            .with_credential(Some(ApiCredential::new("your_gemini_api_key_here")));
        assert!(orch.run(None).await.is_err());

        let orch = orchestrator(ScriptedTransport::new())
            .with_credential(Some(ApiCredential::new("k")));
        assert!(orch.run(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = CrewflowConfig::default().with_api_key("k").with_stage_delay_ms(0);
        let orch = PipelineOrchestrator::from_config(
            two_stage_graph(),
            Arc::new(ScriptedTransport::new()),
            &config,
        )
        .unwrap();
        assert_eq!(orch.client().policy().max_attempts(), 3);
        assert!(orch.run(None).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unauthorized_fails_run() {
        let transport = ScriptedTransport::new().on(
            "prompt:a",
            [ScriptStep::fail(crate::client::TransportError::http(401, "bad key"))],
        );
        let calls = transport.call_log();
        let orch = orchestrator(transport);

        let report = orch.run(None).await.unwrap();
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(
            report.error.unwrap().message,
            "Invalid API key. Please check your API key configuration."
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(orch.tracker().stage_status("b"), Some(StageStatus::Idle));
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let orch = orchestrator(ScriptedTransport::new());
        orch.run(None).await.unwrap();

        let generation = orch.reset();
        assert_eq!(generation, 1);
        assert_eq!(orch.generation(), 1);
        assert_eq!(orch.status(), RunStatus::Idle);
        assert!(orch.context().is_empty());
        assert_eq!(orch.tracker().stage_status("a"), Some(StageStatus::Idle));
    }
}
