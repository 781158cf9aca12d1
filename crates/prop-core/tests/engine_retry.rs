mod common;

use std::sync::{Arc, Mutex};

use common::{calls, CountingStep};
use prop_core::constants::SEARCH_ATTRIBUTES_SIGNAL;
use prop_core::{build_flow_definition_auto, CoreEngineError, EventStore, FlowEngine, FlowEvent, FlowEventKind,
                InMemoryEventStore, InMemoryFlowRepository, RetryPolicy, RunObserver, RunStatus, StepDefinition,
                StepStatus};
use serde_json::json;
use uuid::Uuid;

fn upstream_down(n: usize) -> Vec<CoreEngineError> {
    vec![CoreEngineError::UpstreamUnavailable("503".into()); n]
}

#[test]
fn transient_failure_is_retried_then_succeeds() {
    let flaky = CountingStep::new("fetch").failing_with(upstream_down(2));
    let counter = flaky.counter();
    let def = build_flow_definition_auto(vec![Box::new(flaky)]);
    let engine = FlowEngine::builder(InMemoryEventStore::new(), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(3))
                                                                                             .build();
    let run = Uuid::new_v4();
    engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();
    let inst = engine.run_to_completion(run, &def).unwrap();

    assert_eq!(calls(&counter), 3);
    assert_eq!(inst.status, RunStatus::Completed);
    assert_eq!(inst.steps[0].attempts, 3);
    let retries = engine.events_for(run)
                        .unwrap()
                        .iter()
                        .filter(|e| matches!(e.kind, FlowEventKind::RetryScheduled { .. }))
                        .count();
    assert_eq!(retries, 2);
}

#[test]
fn retries_exhausted_fail_the_run_with_last_error() {
    let flaky = CountingStep::new("fetch").failing_with(upstream_down(5));
    let counter = flaky.counter();
    let after = CountingStep::new("after");
    let after_calls = after.counter();
    let def = build_flow_definition_auto(vec![Box::new(flaky), Box::new(after)]);
    let engine = FlowEngine::builder(InMemoryEventStore::new(), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(3))
                                                                                             .build();
    let run = Uuid::new_v4();
    engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();
    let err = engine.run_to_completion(run, &def).unwrap_err();

    assert_eq!(err, CoreEngineError::UpstreamUnavailable("503".into()));
    assert_eq!(calls(&counter), 3);
    assert_eq!(calls(&after_calls), 0);
    let inst = engine.instance(run, &def).unwrap();
    assert_eq!(inst.status, RunStatus::Failed);
    assert_eq!(inst.steps[0].status, StepStatus::Failed);
    assert_eq!(inst.last_error, Some(CoreEngineError::UpstreamUnavailable("503".into())));
    assert_eq!(engine.next_with(run, &def), Err(CoreEngineError::FlowHasFailed));
}

#[test]
fn not_found_and_compute_errors_fail_immediately() {
    for error in [CoreEngineError::NotFound("no sale".into()), CoreEngineError::Compute("empty comparables".into())] {
        let step = CountingStep::new("s").failing_with(vec![error.clone()]);
        let counter = step.counter();
        let def = build_flow_definition_auto(vec![Box::new(step)]);
        let engine = FlowEngine::builder(InMemoryEventStore::new(), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(5))
                                                                                                 .build();
        let run = Uuid::new_v4();
        engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();
        assert_eq!(engine.run_to_completion(run, &def).unwrap_err(), error);
        assert_eq!(calls(&counter), 1);
        let failed = engine.events_for(run)
                           .unwrap()
                           .into_iter()
                           .find_map(|e| match e.kind {
                               FlowEventKind::StepFailed { retryable, .. } => Some(retryable),
                               _ => None,
                           });
        assert_eq!(failed, Some(false));
    }
}

#[test]
fn attempt_budget_counts_attempts_from_before_a_restart() {
    let store = Arc::new(InMemoryEventStore::new());
    let step = CountingStep::new("fetch");
    let counter = step.counter();
    let def = build_flow_definition_auto(vec![Box::new(step)]);
    let engine = FlowEngine::builder(store.clone(), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(2))
                                                                                 .build();
    let run = Uuid::new_v4();
    engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();
    // Dos intentos iniciados que nunca terminaron (proceso caído).
    for attempt in 1..=2 {
        store.append_kind(run,
                          FlowEventKind::StepStarted { step_index: 0,
                                                       step_id: "fetch".into(),
                                                       attempt })
             .unwrap();
    }
    assert!(engine.resume(run, &def).is_err());
    assert_eq!(calls(&counter), 0);
    assert_eq!(engine.instance(run, &def).unwrap().status, RunStatus::Failed);
}

#[test]
fn cancel_keeps_succeeded_steps_and_abandons_the_rest() {
    let a = CountingStep::new("a");
    let b = CountingStep::new("b");
    let b_calls = b.counter();
    let def = build_flow_definition_auto(vec![Box::new(a) as Box<dyn StepDefinition>, Box::new(b)]);
    let engine = FlowEngine::new_with_stores(InMemoryEventStore::new(), InMemoryFlowRepository::new());
    let run = Uuid::new_v4();
    engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();
    engine.next_with(run, &def).unwrap();
    engine.cancel(run, "user request", &def).unwrap();

    assert_eq!(engine.run_to_completion(run, &def).unwrap_err(), CoreEngineError::Cancelled);
    assert_eq!(calls(&b_calls), 0);
    let inst = engine.instance(run, &def).unwrap();
    assert_eq!(inst.status, RunStatus::Cancelled);
    assert_eq!(inst.steps[0].status, StepStatus::Succeeded);
    assert_eq!(inst.steps[1].status, StepStatus::Pending);
    assert!(matches!(engine.cancel(run, "again", &def), Err(CoreEngineError::InvalidState(_))));
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(String, usize)>>);

impl RunObserver for Recorder {
    fn on_event(&self, event: &FlowEvent, artifacts: &[prop_core::Artifact]) {
        self.0
            .lock()
            .unwrap()
            .push((event.kind.label().to_string(), artifacts.len()));
    }
}

#[test]
fn signals_upsert_search_attributes_and_observers_see_every_append() {
    let step = CountingStep::new("fetch").with_signal(SEARCH_ATTRIBUTES_SIGNAL, json!({"municipality": "Uppsala"}));
    let def = build_flow_definition_auto(vec![Box::new(step)]);
    let recorder = Arc::new(Recorder::default());
    let engine = FlowEngine::builder(InMemoryEventStore::new(), InMemoryFlowRepository::new()).observer(recorder.clone())
                                                                                             .build();
    let run = Uuid::new_v4();
    engine.start(run, "P9", "k".into(), json!({}), &def).unwrap();
    let inst = engine.run_to_completion(run, &def).unwrap();

    assert_eq!(inst.search_attributes.get("municipality").map(String::as_str), Some("Uppsala"));
    assert_eq!(inst.search_attributes.get("propertyId").map(String::as_str), Some("P9"));

    let seen = recorder.0.lock().unwrap().clone();
    let labels: Vec<&str> = seen.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels,
               vec!["run_initialized",
                    "step_started",
                    "search_attributes_upserted",
                    "step_finished",
                    "run_completed"]);
    assert_eq!(seen[3].1, 1, "artifacts travel with StepFinished");
    assert_eq!(engine.event_store().list(run).unwrap().len(), 5);
}

/// Journal en el que el run se cierra justo antes de que llegue la
/// cancelación, como si el driver hubiera escrito `RunCompleted` entre la
/// comprobación y el append.
struct CompletesBeforeCancel {
    inner: InMemoryEventStore,
}

impl EventStore for CompletesBeforeCancel {
    fn append_with_artifacts(&self,
                             run_id: Uuid,
                             kind: FlowEventKind,
                             artifacts: &[prop_core::Artifact])
                             -> Result<FlowEvent, CoreEngineError> {
        if matches!(kind, FlowEventKind::RunCancelled { .. }) {
            self.inner
                .append_kind(run_id, FlowEventKind::RunCompleted { flow_fingerprint: "fp".into() })?;
        }
        self.inner.append_with_artifacts(run_id, kind, artifacts)
    }
    fn list(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError> {
        self.inner.list(run_id)
    }
    fn list_run_ids(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        self.inner.list_run_ids()
    }
    fn load_artifact(&self, hash: &str) -> Result<Option<prop_core::Artifact>, CoreEngineError> {
        self.inner.load_artifact(hash)
    }
}

#[test]
fn cancel_that_loses_to_completion_reports_the_real_status() {
    let def = build_flow_definition_auto(vec![Box::new(CountingStep::new("only"))]);
    let engine = FlowEngine::new_with_stores(CompletesBeforeCancel { inner: InMemoryEventStore::new() },
                                             InMemoryFlowRepository::new());
    let run = Uuid::new_v4();
    engine.start(run, "P1", "k".into(), json!({}), &def).unwrap();

    let err = engine.cancel(run, "late", &def).unwrap_err();
    assert!(matches!(err, CoreEngineError::InvalidState(ref m) if m.contains("Completed")), "{err:?}");
    assert_eq!(engine.instance(run, &def).unwrap().status, RunStatus::Completed);
}
