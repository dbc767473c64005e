//! End-to-end runs of the orchestrator against scripted transports.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::client::{RetryConfig, RetryingApiClient, TransportError};
use crate::core::{RunStatus, StageStatus, StatusEvent};
use crate::errors::{ApiErrorKind, NETWORK_UNAVAILABLE_MESSAGE};
use crate::events::CollectingStatusListener;
use crate::pipeline::{PipelineBuilder, PipelineOrchestrator, StageDefinition, StageGraph};
use crate::testing::{
    assert_dependencies_respected, assert_prefix_monotonic, assert_single_lifecycle,
    fixture_prompt, fixture_stage, random_dag, ScriptStep, ScriptedTransport,
};

fn chain(ids: &[&str]) -> StageGraph {
    let mut builder = PipelineBuilder::new();
    for (i, id) in ids.iter().enumerate() {
        let mut stage = fixture_stage(id);
        if i > 0 {
            stage = stage.with_dependency(ids[i - 1]);
        }
        builder.add_stage(stage);
    }
    builder.build().unwrap()
}

fn orchestrator(graph: StageGraph, transport: ScriptedTransport) -> PipelineOrchestrator {
    let client = RetryingApiClient::with_config(Arc::new(transport), RetryConfig::default());
    PipelineOrchestrator::new(graph, client)
}

fn observe(orch: &PipelineOrchestrator) -> Arc<CollectingStatusListener> {
    let listener = Arc::new(CollectingStatusListener::new());
    orch.subscribe(listener.clone());
    listener
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_success() {
    let transport = ScriptedTransport::new().on(
        "prompt:a",
        [
            ScriptStep::fail(TransportError::network("connection reset")),
            ScriptStep::respond(["Hello"]),
        ],
    );
    let calls = transport.call_log();
    let orch = orchestrator(chain(&["a", "b"]), transport);
    let listener = observe(&orch);

    let report = orch.run(None).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempts.get("a"), Some(&2));
    assert_eq!(report.attempts.get("b"), Some(&1));
    assert_eq!(calls.count_matching("prompt:a"), 2);
    // The retry stays inside one working phase.
    assert_eq!(
        listener.stage_statuses("a"),
        vec![StageStatus::Working, StageStatus::Completed]
    );
    assert_eq!(orch.status(), RunStatus::Completed);
}

#[tokio::test]
async fn test_independent_stages_run_concurrently() {
    let graph = PipelineBuilder::new()
        .stage(fixture_stage("x"))
        .stage(fixture_stage("y"))
        .stage(fixture_stage("z"))
        .build()
        .unwrap();
    // Each call waits until all three are in flight.
    let transport = ScriptedTransport::new().with_barrier(3);
    let orch = orchestrator(graph, transport);
    let listener = observe(&orch);

    let report = tokio::time::timeout(Duration::from_secs(5), orch.run(None))
        .await
        .expect("independent stages should not wait on each other")
        .unwrap();
    assert!(report.is_success());

    let events = listener.events();
    let first_terminal = events
        .iter()
        .position(|e| {
            matches!(
                e,
                StatusEvent::StageStatusChanged { status, .. } if status.is_terminal()
            )
        })
        .unwrap();
    let working_before = events[..first_terminal]
        .iter()
        .filter(|e| {
            matches!(
                e,
                StatusEvent::StageStatusChanged {
                    status: StageStatus::Working,
                    ..
                }
            )
        })
        .count();
    assert_eq!(working_before, 3);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_network_failure_stops_run() {
    let transport = ScriptedTransport::new().on(
        "prompt:a",
        [
            ScriptStep::fail(TransportError::network("unreachable")),
            ScriptStep::fail(TransportError::network("unreachable")),
            ScriptStep::fail(TransportError::network("unreachable")),
        ],
    );
    let calls = transport.call_log();
    let orch = orchestrator(chain(&["a", "b", "c"]), transport);
    let start = tokio::time::Instant::now();

    let report = orch.run(None).await.unwrap();

    assert_eq!(report.status, RunStatus::Error);
    let error = report.error.unwrap();
    assert_eq!(error.kind, ApiErrorKind::NetworkUnavailable);
    assert_eq!(error.message, NETWORK_UNAVAILABLE_MESSAGE);
    assert_eq!(calls.len(), 3);
    // Linear backoff: 1s then 2s.
    assert!(start.elapsed() >= Duration::from_secs(3));

    let tracker = orch.tracker();
    assert_eq!(tracker.stage_status("a"), Some(StageStatus::Error));
    assert_eq!(tracker.stage_status("b"), Some(StageStatus::Idle));
    assert_eq!(tracker.stage_status("c"), Some(StageStatus::Idle));
    assert_eq!(tracker.run_error().as_deref(), Some(NETWORK_UNAVAILABLE_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_retry_supersedes_run() {
    let transport = ScriptedTransport::new().on(
        "prompt:a",
        [ScriptStep::fail(TransportError::http(429, "slow down"))],
    );
    let calls = transport.call_log();
    let orch = orchestrator(chain(&["a", "b"]), transport);
    let listener = observe(&orch);

    let (report, generation) = tokio::join!(orch.run(None), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        orch.reset()
    });
    let report = report.unwrap();

    assert!(report.superseded);
    assert_eq!(report.status, RunStatus::Idle);
    assert_eq!(report.generation + 1, generation);
    assert_eq!(calls.len(), 1);
    assert_eq!(orch.status(), RunStatus::Idle);
    assert_eq!(orch.tracker().stage_status("a"), Some(StageStatus::Idle));
    assert_eq!(orch.tracker().stage_output("a").as_deref(), Some(""));

    // Nothing from the abandoned run lands after the reset.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orch.tracker().stage_status("a"), Some(StageStatus::Idle));
    listener.clear();

    let report = orch.run(None).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.generation, generation);
    assert_eq!(
        listener.stage_statuses("a"),
        vec![StageStatus::Working, StageStatus::Completed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_stream_discards_partial_output() {
    let transport = ScriptedTransport::new()
        .with_fragment_delay(Duration::from_millis(100))
        .with_default_response(["one ", "two ", "three ", "four"]);
    let orch = orchestrator(chain(&["a"]), transport);

    let (report, _) = tokio::join!(orch.run(None), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        orch.reset()
    });

    assert!(report.unwrap().superseded);
    assert_eq!(orch.tracker().stage_output("a").as_deref(), Some(""));
    assert!(orch.context().is_empty());
}

#[tokio::test]
async fn test_streaming_snapshots_grow_monotonically() {
    let transport =
        ScriptedTransport::new().with_default_response(["Hel", "lo ", "wor", "ld"]);
    let orch = orchestrator(chain(&["a"]), transport);
    let listener = observe(&orch);

    let report = orch.run(None).await.unwrap();

    let snapshots = listener.stage_outputs("a");
    assert_eq!(
        snapshots,
        vec![
            "Hel".to_string(),
            "Hello ".to_string(),
            "Hello wor".to_string(),
            "Hello world".to_string(),
        ]
    );
    assert_prefix_monotonic(&snapshots);
    assert_eq!(report.output("a"), Some("Hello world"));
    assert_eq!(orch.tracker().stage_output("a").as_deref(), Some("Hello world"));
}

#[tokio::test]
async fn test_mid_stream_failure_is_not_retried() {
    let transport = ScriptedTransport::new().on(
        "prompt:a",
        [ScriptStep::fail_mid_stream(
            ["partial"],
            TransportError::network("stream cut"),
        )],
    );
    let calls = transport.call_log();
    let orch = orchestrator(chain(&["a", "b"]), transport);

    let report = orch.run(None).await.unwrap();

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(
        report.error.as_ref().map(|e| e.message.as_str()),
        Some(NETWORK_UNAVAILABLE_MESSAGE)
    );
    assert_eq!(calls.len(), 1);
    assert!(report.output("a").is_none());
    assert_eq!(orch.tracker().stage_status("a"), Some(StageStatus::Error));
}

#[tokio::test(start_paused = true)]
async fn test_stage_delay_between_wavefronts() {
    let orch = orchestrator(chain(&["a", "b", "c"]), ScriptedTransport::new())
        .with_stage_delay(Duration::from_secs(2));
    let start = tokio::time::Instant::now();

    assert!(orch.run(None).await.unwrap().is_success());

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(6));
}

#[tokio::test]
async fn test_first_error_wins_within_wavefront() {
    let graph = PipelineBuilder::new()
        .stage(fixture_stage("root"))
        .stage(fixture_stage("left").with_dependency("root"))
        .stage(fixture_stage("right").with_dependency("root"))
        .stage(fixture_stage("join").with_dependencies(["left", "right"]))
        .build()
        .unwrap();
    let transport = ScriptedTransport::new()
        .on("prompt:left", [ScriptStep::fail(TransportError::http(401, "no"))])
        .on("prompt:right", [ScriptStep::respond(["fine"])]);
    let calls = transport.call_log();
    let orch = orchestrator(graph, transport);

    let report = orch.run(None).await.unwrap();

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ApiErrorKind::Unauthorized)
    );
    // The sibling finished; the fan-in stage never launched.
    assert_eq!(report.output("right"), Some("fine"));
    assert_eq!(calls.count_matching("prompt:join"), 0);
    assert_eq!(orch.tracker().stage_status("join"), Some(StageStatus::Idle));
}

#[tokio::test]
async fn test_random_dags_respect_dependencies() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..25 {
        let size = rng.gen_range(1..=10);
        let defs = random_dag(&mut rng, size, 0.35);
        let graph = PipelineBuilder::new().stage_all(defs).build().unwrap();
        let transport = ScriptedTransport::new();
        let calls = transport.call_log();
        let orch = orchestrator(graph, transport);
        let listener = observe(&orch);

        let report = orch.run(None).await.unwrap();

        assert!(report.is_success(), "round {round} failed: {:?}", report.error);
        assert_eq!(calls.len(), size);
        let events = listener.events();
        assert_dependencies_respected(orch.graph(), &events);
        for id in orch.graph().stage_ids() {
            assert_single_lifecycle(&events, id);
            assert_eq!(report.output(id), Some("ok"));
        }
    }
}

#[tokio::test]
async fn test_random_dags_stop_descendants_of_failure() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..25 {
        let size = rng.gen_range(2..=10);
        let defs = random_dag(&mut rng, size, 0.4);
        let failing = format!("s{}", rng.gen_range(0..size));
        let graph = PipelineBuilder::new().stage_all(defs).build().unwrap();
        let transport = ScriptedTransport::new().on(
            fixture_prompt(&failing),
            [ScriptStep::fail(TransportError::http(403, "forbidden"))],
        );
        let orch = orchestrator(graph, transport);
        let listener = observe(&orch);

        let report = orch.run(None).await.unwrap();

        assert_eq!(report.status, RunStatus::Error);
        let events = listener.events();
        assert_dependencies_respected(orch.graph(), &events);
        for id in orch.graph().stage_ids() {
            assert_single_lifecycle(&events, id);
        }
        for dependent in orch.graph().dependents(&failing) {
            assert_eq!(
                orch.tracker().stage_status(&dependent.id),
                Some(StageStatus::Idle),
                "dependent '{}' of failed '{failing}' ran",
                dependent.id
            );
        }
    }
}

#[tokio::test]
async fn test_context_feeds_prompts_in_dependency_order() {
    let graph = PipelineBuilder::new()
        .stage(StageDefinition::new("a", |_| "prompt:a".to_string()))
        .stage(
            StageDefinition::new("b", |ctx| format!("prompt:b {}", ctx.get_or_empty("a")))
                .with_dependency("a"),
        )
        .stage(
            StageDefinition::new("c", |ctx| {
                format!("prompt:c {} {}", ctx.get_or_empty("a"), ctx.get_or_empty("b"))
            })
            .with_dependencies(["a", "b"]),
        )
        .build()
        .unwrap();
    let transport = ScriptedTransport::new()
        .on("prompt:a", [ScriptStep::respond(["A"])])
        .on("prompt:b", [ScriptStep::respond(["B"])]);
    let calls = transport.call_log();
    let orch = orchestrator(graph, transport);

    orch.run(None).await.unwrap();

    assert_eq!(
        calls.prompts(),
        vec![
            "prompt:a".to_string(),
            "prompt:b A".to_string(),
            "prompt:c A B".to_string(),
        ]
    );
    assert_eq!(
        orch.context().completion_order(),
        &["a".to_string(), "b".to_string(), "c".to_string()]
    );
}
