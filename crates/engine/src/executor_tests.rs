//! Engine tests: the run loop, error policies, branching, persistence and
//! dispatch.
//!
//! Everything runs against `InMemoryStore`, scripted `MockHandler`s and the
//! `DryRunBackend` collaborators, so no Postgres connection is required.
//! Waits and retry delays run on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use steps::builtin::{ConditionStep, WaitStep};
use steps::collaborators::EntityKind;
use steps::dry_run::DryRunBackend;
use steps::mock::MockHandler;
use steps::{StepError, StepKind, StepRegistry};

use crate::conditions::{Condition, ConditionOperator};
use crate::dispatcher::TriggerDispatcher;
use crate::error::{EngineError, StepFailure};
use crate::executor::{BranchTargetPolicy, ExecutorConfig, WorkflowExecutor};
use crate::models::{ErrorAction, ErrorPolicy, StepDefinition, TriggerEvent, WorkflowDefinition};
use crate::record::{ExecutionRecord, RunMetrics, RunStatus, StepStatus};
use crate::store::{ExecutionStore, InMemoryStore};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn kind(tag: &str) -> StepKind {
    StepKind::Custom(tag.into())
}

fn mock_step(id: &str) -> StepDefinition {
    StepDefinition::new(id, kind(id), json!({}))
}

fn ok_mock(id: &str) -> Arc<MockHandler> {
    Arc::new(MockHandler::returning(kind(id), json!({ "from": id })))
}

fn registry_with(mocks: &[&Arc<MockHandler>]) -> StepRegistry {
    let mut registry = StepRegistry::new();
    for mock in mocks {
        registry.register_arc(Arc::clone(*mock) as Arc<dyn steps::StepHandler>);
    }
    registry.register(ConditionStep);
    registry.register(WaitStep::new(Duration::from_secs(3600)));
    registry
}

struct Harness {
    executor: Arc<WorkflowExecutor>,
    store: Arc<InMemoryStore>,
}

fn harness(registry: StepRegistry, config: ExecutorConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let executor = Arc::new(WorkflowExecutor::new(registry, store.clone(), store.clone(), config));
    Harness { executor, store }
}

fn workflow(steps: Vec<StepDefinition>) -> WorkflowDefinition {
    WorkflowDefinition::new("test", "ws-1", "lead_created", steps)
}

fn event(data: Value) -> TriggerEvent {
    TriggerEvent::new("lead_created", data)
}

fn statuses(record: &ExecutionRecord) -> Vec<StepStatus> {
    record.steps.iter().map(|s| s.status).collect()
}

fn assert_metrics_settled(record: &ExecutionRecord) {
    assert_eq!(record.metrics.settled(), record.metrics.total_steps, "{:?}", record.metrics);
}

fn aborted(err: EngineError) -> (String, StepFailure, ExecutionRecord) {
    match err {
        EngineError::RunAborted { step_id, source, record } => (step_id, source, *record),
        other => panic!("expected RunAborted, got {other:?}"),
    }
}

// ============================================================
// Sequential execution
// ============================================================

#[tokio::test]
async fn linear_workflow_completes_every_step_in_order() {
    let (a, b, c) = (ok_mock("a"), ok_mock("b"), ok_mock("c"));
    let h = harness(registry_with(&[&a, &b, &c]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("a"), mock_step("b"), mock_step("c")]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(statuses(&record), vec![StepStatus::Completed; 3]);
    assert_eq!(record.step("b").unwrap().output, Some(json!({ "from": "b" })));
    assert_eq!((a.call_count(), b.call_count(), c.call_count()), (1, 1, 1));
    assert_metrics_settled(&record);
    assert!(record.finished_at.is_some());
}

#[tokio::test]
async fn disabled_steps_are_never_invoked() {
    let (a, b, c) = (ok_mock("a"), ok_mock("b"), ok_mock("c"));
    let h = harness(registry_with(&[&a, &b, &c]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("a"), mock_step("b").disabled(), mock_step("c")]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(b.call_count(), 0);
    assert_eq!(
        statuses(&record),
        vec![StepStatus::Completed, StepStatus::Skipped, StepStatus::Completed]
    );
    assert_eq!(record.step("b").unwrap().input, None);
    assert_eq!(
        record.metrics,
        RunMetrics { total_steps: 3, completed_steps: 2, skipped_steps: 1, failed_steps: 0 }
    );
}

#[tokio::test]
async fn outputs_feed_later_step_templates() {
    let lead = Arc::new(MockHandler::returning(kind("lead"), json!({ "leadId": "L-42" })));
    let email = ok_mock("email");
    let h = harness(registry_with(&[&lead, &email]), ExecutorConfig::default());
    let wf = workflow(vec![
        StepDefinition::new("lead", kind("lead"), json!({ "email": "${trigger.email}" })),
        StepDefinition::new(
            "email",
            kind("email"),
            json!({ "lead": "${steps.lead.leadId}", "subject": "Hi ${trigger.name}", "by": "${userId}" }),
        ),
    ]);

    let record = h
        .executor
        .execute(&wf, event(json!({ "email": "ana@example.com", "name": "Ana" })), "u1")
        .await
        .unwrap();

    assert_eq!(lead.calls.lock().unwrap()[0], json!({ "email": "ana@example.com" }));
    assert_eq!(
        email.calls.lock().unwrap()[0],
        json!({ "lead": "L-42", "subject": "Hi Ana", "by": "u1" })
    );
    assert_eq!(record.step("email").unwrap().input, Some(email.calls.lock().unwrap()[0].clone()));
}

// ============================================================
// Error policies
// ============================================================

#[tokio::test(start_paused = true)]
async fn retry_recovers_after_transient_failures() {
    let flaky = Arc::new(MockHandler::flaky(kind("flaky"), 2, json!({ "ok": true })));
    let h = harness(registry_with(&[&flaky]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("flaky").with_on_error(ErrorPolicy {
        action: ErrorAction::Retry,
        retries: 2,
        retry_delay: 500,
    })]);

    let started = Instant::now();
    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    let step = record.step("flaky").unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.retries, 2);
    assert_eq!(step.error, None);
    assert_eq!(step.output, Some(json!({ "ok": true })));
    assert_eq!(record.metrics.failed_steps, 0);
    assert_eq!(record.metrics.completed_steps, 1);
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(flaky.call_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_abort_with_the_original_failure() {
    let flaky = Arc::new(MockHandler::flaky(kind("flaky"), 5, json!({})));
    let after = ok_mock("after");
    let h = harness(registry_with(&[&flaky, &after]), ExecutorConfig::default());
    let wf = workflow(vec![
        mock_step("flaky").with_on_error(ErrorPolicy {
            action: ErrorAction::Retry,
            retries: 2,
            retry_delay: 10,
        }),
        mock_step("after"),
    ]);

    let err = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err();
    let (step_id, source, record) = aborted(err);

    assert_eq!(step_id, "flaky");
    assert_eq!(source, StepFailure::Step(StepError::Handler("transient failure #1".into())));
    let step = record.step("flaky").unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.retries, 2);
    assert_eq!(step.error.as_deref(), Some("handler error: transient failure #1"));
    assert_eq!(flaky.call_count(), 3);
    assert_eq!(after.call_count(), 0);
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.step("after").unwrap().status, StepStatus::Pending);
}

#[tokio::test]
async fn skip_policy_records_the_failure_and_moves_on() {
    let broken = Arc::new(MockHandler::failing(kind("broken"), "crm down"));
    let after = ok_mock("after");
    let h = harness(registry_with(&[&broken, &after]), ExecutorConfig::default());
    let wf = workflow(vec![
        mock_step("broken").with_on_error(ErrorPolicy { action: ErrorAction::Skip, ..Default::default() }),
        mock_step("after"),
    ]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(statuses(&record), vec![StepStatus::Failed, StepStatus::Completed]);
    assert_eq!(record.metrics.failed_steps, 1);
    assert_eq!(after.call_count(), 1);
    assert_metrics_settled(&record);
}

#[tokio::test]
async fn failure_without_policy_aborts_the_run() {
    let broken = Arc::new(MockHandler::failing(kind("broken"), "crm down"));
    let after = ok_mock("after");
    let h = harness(registry_with(&[&broken, &after]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("broken"), mock_step("after")]);

    let (step_id, _, record) = aborted(h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err());

    assert_eq!(step_id, "broken");
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("crm down"));
    assert_eq!(after.call_count(), 0);
    assert!(record.steps.iter().any(|s| s.status == StepStatus::Failed));
}

#[tokio::test]
async fn continue_on_error_completes_past_failed_steps() {
    let broken = Arc::new(MockHandler::failing(kind("broken"), "crm down"));
    let after = ok_mock("after");
    let h = harness(registry_with(&[&broken, &after]), ExecutorConfig::default());
    let mut wf = workflow(vec![mock_step("broken"), mock_step("after")]);
    wf.config.continue_on_error = true;

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(statuses(&record), vec![StepStatus::Failed, StepStatus::Completed]);
    assert_metrics_settled(&record);
}

#[tokio::test]
async fn unknown_step_type_aborts_without_retrying() {
    let h = harness(registry_with(&[]), ExecutorConfig::default());
    let wf = workflow(vec![StepDefinition::new("ghost", kind("nonexistent"), json!({}))
        .with_on_error(ErrorPolicy { action: ErrorAction::Retry, retries: 3, retry_delay: 0 })]);

    let (step_id, source, record) = aborted(h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err());

    assert_eq!(step_id, "ghost");
    assert_eq!(source, StepFailure::UnknownStepType("nonexistent".into()));
    let step = record.step("ghost").unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.retries, 0);
    assert_eq!(step.error.as_deref(), Some("unknown step type 'nonexistent'"));
    assert_eq!(record.status, RunStatus::Failed);
}

// ============================================================
// Branching
// ============================================================

fn condition_step(id: &str, condition: &str, then: Value, otherwise: Value) -> StepDefinition {
    StepDefinition::new(
        id,
        StepKind::Condition,
        json!({ "condition": condition, "then": then, "else": otherwise }),
    )
}

#[tokio::test]
async fn condition_branch_skips_steps_up_to_the_target() {
    let (a, c, d) = (ok_mock("a"), ok_mock("c"), ok_mock("d"));
    let h = harness(registry_with(&[&a, &c, &d]), ExecutorConfig::default());
    let wf = workflow(vec![
        mock_step("a"),
        condition_step("b", "trigger.vip == true", json!("d"), Value::Null),
        mock_step("c"),
        mock_step("d"),
    ]);

    let record = h.executor.execute(&wf, event(json!({ "vip": true })), "u1").await.unwrap();

    assert_eq!(
        statuses(&record),
        vec![StepStatus::Completed, StepStatus::Completed, StepStatus::Skipped, StepStatus::Completed]
    );
    assert_eq!(c.call_count(), 0);
    assert_eq!(d.call_count(), 1);
    assert_eq!(
        record.step("b").unwrap().output,
        Some(json!({ "condition": true, "nextStepId": "d" }))
    );
    assert_eq!(record.metrics.skipped_steps, 1);
    assert_metrics_settled(&record);
}

#[tokio::test]
async fn condition_without_a_branch_target_falls_through() {
    let (c, d) = (ok_mock("c"), ok_mock("d"));
    let h = harness(registry_with(&[&c, &d]), ExecutorConfig::default());
    let wf = workflow(vec![
        condition_step("b", "trigger.score > 50", json!("d"), Value::Null),
        mock_step("c"),
        mock_step("d"),
    ]);

    let record = h.executor.execute(&wf, event(json!({ "score": 10 })), "u1").await.unwrap();

    assert_eq!(record.step("b").unwrap().output, Some(json!({ "condition": false, "nextStepId": null })));
    assert_eq!((c.call_count(), d.call_count()), (1, 1));
    assert_eq!(record.metrics.skipped_steps, 0);
}

#[tokio::test]
async fn branch_over_a_disabled_step_counts_it_once() {
    let (c, d) = (ok_mock("c"), ok_mock("d"));
    let h = harness(registry_with(&[&c, &d]), ExecutorConfig::default());
    let wf = workflow(vec![
        condition_step("b", "true", json!("d"), Value::Null),
        mock_step("c").disabled(),
        mock_step("x"),
        mock_step("d"),
    ]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.metrics.skipped_steps, 2);
    assert_eq!(record.metrics.completed_steps, 2);
    assert_metrics_settled(&record);
}

#[tokio::test]
async fn unknown_branch_target_fails_the_condition_step_by_default() {
    let c = ok_mock("c");
    let h = harness(registry_with(&[&c]), ExecutorConfig::default());
    let wf = workflow(vec![
        condition_step("b", "true", json!("nowhere"), Value::Null),
        mock_step("c"),
    ]);

    let (step_id, source, record) = aborted(h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err());

    assert_eq!(step_id, "b");
    assert!(matches!(source, StepFailure::InvalidBranchTarget { ref target, .. } if target == "nowhere"));
    assert!(!source.is_retryable());
    assert_eq!(record.step("b").unwrap().status, StepStatus::Failed);
    assert_eq!(c.call_count(), 0);
}

#[tokio::test]
async fn backward_branch_target_is_invalid() {
    let a = ok_mock("a");
    let h = harness(registry_with(&[&a]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("a"), condition_step("b", "true", json!("a"), Value::Null)]);

    let (_, source, _) = aborted(h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err());

    assert!(matches!(source, StepFailure::InvalidBranchTarget { ref target, .. } if target == "a"));
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn continue_policy_ignores_unknown_branch_targets() {
    let c = ok_mock("c");
    let config = ExecutorConfig { branch_target_policy: BranchTargetPolicy::Continue, ..Default::default() };
    let h = harness(registry_with(&[&c]), config);
    let wf = workflow(vec![
        condition_step("b", "true", json!("nowhere"), Value::Null),
        mock_step("c"),
    ]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(statuses(&record), vec![StepStatus::Completed, StepStatus::Completed]);
    assert_eq!(c.call_count(), 1);
}

// ============================================================
// Panicking handlers
// ============================================================

struct PanickingStep;

#[async_trait::async_trait]
impl steps::StepHandler for PanickingStep {
    fn kind(&self) -> StepKind {
        kind("explodes")
    }

    async fn execute(
        &self,
        _input: Value,
        _ctx: &steps::ExecutionContext,
        _results: &mut steps::RunResults,
    ) -> Result<Value, StepError> {
        panic!("collaborator blew up");
    }
}

fn registry_with_panicking(mocks: &[&Arc<MockHandler>]) -> StepRegistry {
    let mut registry = registry_with(mocks);
    registry.register(PanickingStep);
    registry
}

#[tokio::test]
async fn handler_panic_fails_the_step_and_finalizes_the_run() {
    let after = ok_mock("after");
    let h = harness(registry_with_panicking(&[&after]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("explodes"), mock_step("after")]);

    let (step_id, failure, record) = aborted(h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err());

    assert_eq!(step_id, "explodes");
    assert!(matches!(failure, StepFailure::Step(StepError::Handler(ref msg)) if msg.contains("collaborator blew up")));
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(after.call_count(), 0);
    assert_eq!(h.store.get(record.id).await.unwrap().map(|r| r.status), Some(RunStatus::Failed));
    let stats = h.store.stats(wf.id).await.unwrap();
    assert_eq!((stats.success_count, stats.failure_count), (0, 1));
    assert!(h.executor.in_flight().is_empty());
}

#[tokio::test]
async fn handler_panic_honours_the_skip_policy() {
    let after = ok_mock("after");
    let h = harness(registry_with_panicking(&[&after]), ExecutorConfig::default());
    let wf = workflow(vec![
        mock_step("explodes").with_on_error(ErrorPolicy { action: ErrorAction::Skip, ..Default::default() }),
        mock_step("after"),
    ]);

    let record = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(statuses(&record), vec![StepStatus::Failed, StepStatus::Completed]);
    assert!(record.step("explodes").unwrap().error.as_deref().unwrap().contains("handler panicked"));
    assert_metrics_settled(&record);
}

// ============================================================
// Persistence, statistics and in-flight tracking
// ============================================================

#[tokio::test]
async fn finalized_record_and_stats_are_persisted() {
    let (a, broken) = (ok_mock("a"), Arc::new(MockHandler::failing(kind("broken"), "boom")));
    let h = harness(registry_with(&[&a, &broken]), ExecutorConfig::default());
    let good = workflow(vec![mock_step("a")]);
    let bad = workflow(vec![mock_step("broken")]);

    let ok = h.executor.execute(&good, event(json!({})), "u1").await.unwrap();
    let failed = aborted(h.executor.execute(&bad, event(json!({})), "u1").await.unwrap_err()).2;

    assert_eq!(h.store.get(ok.id).await.unwrap(), Some(ok.clone()));
    assert_eq!(h.store.get(failed.id).await.unwrap(), Some(failed.clone()));

    let good_stats = h.store.stats(good.id).await.unwrap();
    assert_eq!((good_stats.success_count, good_stats.failure_count), (1, 0));
    let bad_stats = h.store.stats(bad.id).await.unwrap();
    assert_eq!((bad_stats.success_count, bad_stats.failure_count), (0, 1));

    assert!(h.executor.in_flight().is_empty());
}

#[tokio::test]
async fn invalid_definition_is_rejected_before_any_record_exists() {
    let a = ok_mock("a");
    let h = harness(registry_with(&[&a]), ExecutorConfig::default());
    let wf = workflow(vec![mock_step("a"), mock_step("a")]);

    let err = h.executor.execute(&wf, event(json!({})), "u1").await.unwrap_err();

    assert!(matches!(err, EngineError::DuplicateStepId(id) if id == "a"));
    assert_eq!(h.store.record_count().await, 0);
    assert_eq!(a.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiting_run_is_visible_in_flight() {
    let h = harness(registry_with(&[]), ExecutorConfig::default());
    let wf = workflow(vec![StepDefinition::new(
        "pause",
        StepKind::Wait,
        json!({ "duration": 10, "unit": "seconds" }),
    )]);

    let executor = Arc::clone(&h.executor);
    let run = tokio::spawn(async move { executor.execute(&wf, event(json!({})), "u1").await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshots = h.executor.in_flight().list();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].current_step.as_deref(), Some("pause"));
    let stored = h.store.get(snapshots[0].run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);

    let record = run.await.unwrap().unwrap();
    assert_eq!(record.step("pause").unwrap().output, Some(json!({ "waited": true, "duration": 10_000 })));
    assert!(h.executor.in_flight().is_empty());
}

// ============================================================
// Dispatch
// ============================================================

fn dispatcher(registry: StepRegistry, definitions: Vec<WorkflowDefinition>) -> (TriggerDispatcher, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::with_definitions(definitions));
    let executor = Arc::new(WorkflowExecutor::new(
        registry,
        store.clone(),
        store.clone(),
        ExecutorConfig::default(),
    ));
    (TriggerDispatcher::new(executor, store.clone()), store)
}

#[tokio::test]
async fn booking_confirmed_creates_a_project() {
    let backend = Arc::new(DryRunBackend::new().with_id(EntityKind::Project, "P1"));
    let registry = StepRegistry::with_builtins(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Duration::from_secs(60),
    );
    let wf = WorkflowDefinition::new(
        "Booking follow-up",
        "ws-1",
        "booking_confirmed",
        vec![StepDefinition::new(
            "project",
            StepKind::CreateProject,
            json!({ "bookingId": "${trigger.bookingId}" }),
        )],
    );
    let (dispatcher, _) = dispatcher(registry, vec![wf]);

    let records = dispatcher
        .dispatch("booking_confirmed", json!({ "bookingId": "BK1" }), "ws-1", "u1")
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.steps[0].status, StepStatus::Completed);
    assert_eq!(record.steps[0].output, Some(json!({ "projectId": "P1" })));
    assert_eq!(
        record.metrics,
        RunMetrics { total_steps: 1, completed_steps: 1, skipped_steps: 0, failed_steps: 0 }
    );
    assert_eq!(record.results.entities_created, 1);
    assert_eq!(backend.intents().len(), 1);
}

#[tokio::test]
async fn one_failing_workflow_does_not_stop_its_siblings() {
    let (a, broken) = (ok_mock("a"), Arc::new(MockHandler::failing(kind("broken"), "boom")));
    let first = workflow(vec![mock_step("broken")]);
    let second = workflow(vec![mock_step("a")]);
    let (dispatcher, _) = dispatcher(registry_with(&[&a, &broken]), vec![first.clone(), second.clone()]);

    let records = dispatcher.dispatch("lead_created", json!({}), "ws-1", "u1").await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].workflow_id, first.id);
    assert_eq!(records[0].status, RunStatus::Failed);
    assert_eq!(records[1].workflow_id, second.id);
    assert_eq!(records[1].status, RunStatus::Completed);
}

#[tokio::test]
async fn panicking_workflow_is_returned_as_failed() {
    let a = ok_mock("a");
    let first = workflow(vec![mock_step("explodes")]);
    let second = workflow(vec![mock_step("a")]);
    let (dispatcher, store) = dispatcher(registry_with_panicking(&[&a]), vec![first.clone(), second.clone()]);

    let records = dispatcher.dispatch("lead_created", json!({}), "ws-1", "u1").await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].workflow_id, first.id);
    assert_eq!(records[0].status, RunStatus::Failed);
    assert_eq!(records[1].status, RunStatus::Completed);
    let stored = store.get(records[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(store.stats(first.id).await.unwrap().failure_count, 1);
}

#[tokio::test]
async fn dispatch_filters_by_workspace_and_conditions() {
    let a = ok_mock("a");
    let mut vip_only = workflow(vec![mock_step("a")]);
    vip_only.conditions = vec![Condition::new("tier", ConditionOperator::Equals, json!("vip"))];
    let mut elsewhere = workflow(vec![mock_step("a")]);
    elsewhere.workspace_id = "ws-2".into();
    let mut wrong_trigger = workflow(vec![mock_step("a")]);
    wrong_trigger.trigger.trigger_type = "deal_won".into();

    let (dispatcher, store) = dispatcher(registry_with(&[&a]), vec![vip_only.clone(), elsewhere, wrong_trigger]);

    let none = dispatcher.dispatch("lead_created", json!({ "tier": "basic" }), "ws-1", "u1").await.unwrap();
    assert!(none.is_empty());
    assert_eq!(store.record_count().await, 0);

    let some = dispatcher.dispatch("lead_created", json!({ "tier": "vip" }), "ws-1", "u1").await.unwrap();
    assert_eq!(some.len(), 1);
    assert_eq!(some[0].workflow_id, vip_only.id);
    assert_eq!(a.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_wait_independently() {
    let pause = |secs: u64| {
        workflow(vec![StepDefinition::new(
            "pause",
            StepKind::Wait,
            json!({ "duration": secs, "unit": "s" }),
        )])
    };
    let (dispatcher, _) = dispatcher(registry_with(&[]), vec![pause(10), pause(10), pause(5)]);

    let started = Instant::now();
    let records = dispatcher.dispatch("lead_created", json!({}), "ws-1", "u1").await.unwrap();

    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == RunStatus::Completed));
    assert!(started.elapsed() < Duration::from_secs(11));
}
