//! Suspensión, reanudación, cancelación y completado idempotente.

use apro_core::{EngineError, ExecutePayload, HistoryAction, InMemoryWorkflowStore, InstanceStatus, StartPayload, StepStatus, WorkflowEngine, WorkflowStore, WorkflowTemplate};
use serde_json::json;
use uuid::Uuid;

fn sequential_template() -> WorkflowTemplate {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {}},
            {"id": "A", "type": "approval", "data": {}},
            {"id": "end", "type": "end", "data": {}}
        ],
        "edges": [
            {"source": "start", "target": "A", "data": {}},
            {"source": "A", "target": "end", "data": {}}
        ]
    });
    WorkflowTemplate::new(Uuid::new_v4(), "Simple", definition)
}

fn parallel_template() -> WorkflowTemplate {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {}},
            {"id": "B", "type": "approval", "data": {}},
            {"id": "C", "type": "approval", "data": {}},
            {"id": "end", "type": "end", "data": {}}
        ],
        "edges": [
            {"source": "start", "target": "B", "data": {}},
            {"source": "start", "target": "C", "data": {}},
            {"source": "B", "target": "end", "data": {}},
            {"source": "C", "target": "end", "data": {}}
        ]
    });
    WorkflowTemplate::new(Uuid::new_v4(), "Paralelo", definition)
}

fn engine_with(template: &WorkflowTemplate) -> WorkflowEngine<InMemoryWorkflowStore> {
    let mut engine = WorkflowEngine::new(InMemoryWorkflowStore::new());
    engine.store_mut()
          .transaction(|tx| tx.insert_template(template))
          .expect("seed template");
    engine
}

#[test]
fn rejection_halts_execution() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();

    engine.execute_step(instance.id,
                        step_id,
                        ExecutePayload::new(StepStatus::Rejected).with_reason("falta documentación"),
                        "bob")
          .unwrap();

    let refreshed = engine.store_mut()
                          .transaction(|tx| tx.get_instance(instance.id))
                          .unwrap();
    assert_eq!(refreshed.status, InstanceStatus::Suspended);
    assert!(refreshed.active_steps.is_empty());

    // No se activó ningún step posterior: el grafo no avanzó.
    let steps = engine.store_mut()
                      .transaction(|tx| tx.steps_for_instance(instance.id))
                      .unwrap();
    assert_eq!(steps.len(), 1);

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, HistoryAction::WorkflowSuspended);
    assert_eq!(last.data["reason"], json!("falta documentación"));
}

#[test]
fn suspend_is_idempotent_and_leaves_steps_untouched() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();

    let suspended = engine.suspend_workflow(instance.id, "alice", Some("pausa administrativa"), None)
                          .unwrap();
    assert_eq!(suspended.status, InstanceStatus::Suspended);
    // El step sigue pendiente: suspender no cancela.
    let step = engine.store_mut()
                     .transaction(|tx| tx.get_step(instance.id, step_id))
                     .unwrap();
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(suspended.active_steps.len(), 1);

    // Segunda suspensión: no-op sin historial duplicado.
    engine.suspend_workflow(instance.id, "alice", Some("otra vez"), None).unwrap();
    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    let suspended_entries = history.iter()
                                   .filter(|h| h.action == HistoryAction::WorkflowSuspended)
                                   .count();
    assert_eq!(suspended_entries, 1);
}

#[test]
fn resume_restores_running_and_pending_work() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    engine.suspend_workflow(instance.id, "alice", None, None).unwrap();

    let resumed = engine.resume_workflow(instance.id, "alice", Some("retomamos")).unwrap();
    assert_eq!(resumed.status, InstanceStatus::Running);
    assert_eq!(resumed.active_steps.len(), 1);

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    assert_eq!(history.last().unwrap().action, HistoryAction::WorkflowResumed);
}

#[test]
fn resume_after_final_rejection_completes_the_instance() {
    // La suspensión vino del rechazo del último step y no quedó nada
    // pendiente; al reanudar se intenta completar.
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();
    engine.execute_step(instance.id, step_id, ExecutePayload::new(StepStatus::Rejected), "bob")
          .unwrap();

    let resumed = engine.resume_workflow(instance.id, "alice", None).unwrap();
    assert_eq!(resumed.status, InstanceStatus::Completed);
    assert!(resumed.completed_at.is_some());
}

#[test]
fn resume_on_terminal_instance_is_a_noop() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();
    engine.execute_step(instance.id, step_id, ExecutePayload::new(StepStatus::Approved), "bob")
          .unwrap();

    let resumed = engine.resume_workflow(instance.id, "alice", None).unwrap();
    assert_eq!(resumed.status, InstanceStatus::Completed);

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    assert!(history.iter().all(|h| h.action != HistoryAction::WorkflowResumed));
}

#[test]
fn completion_is_idempotent() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();
    engine.execute_step(instance.id, step_id, ExecutePayload::new(StepStatus::Approved), "bob")
          .unwrap();

    let first = engine.store_mut()
                      .transaction(|tx| tx.get_instance(instance.id))
                      .unwrap();
    let completed_at = first.completed_at;

    let again = engine.complete_workflow(instance.id, "alice").unwrap();
    assert_eq!(again.completed_at, completed_at);

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    let completed_entries = history.iter()
                                   .filter(|h| h.action == HistoryAction::WorkflowCompleted)
                                   .count();
    assert_eq!(completed_entries, 1);
}

#[test]
fn completion_waits_for_every_parallel_branch() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    // Con ramas pendientes, el completado explícito es no-op.
    let attempt = engine.complete_workflow(instance.id, "alice").unwrap();
    assert_eq!(attempt.status, InstanceStatus::Running);
    assert!(attempt.completed_at.is_none());
}

#[test]
fn cancellation_skips_pending_steps_with_one_history_entry() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    assert_eq!(instance.active_steps.len(), 2);

    let cancelled = engine.cancel_workflow(instance.id, "alice", Some("proyecto dado de baja"), None)
                          .unwrap();
    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    assert!(cancelled.active_steps.is_empty());
    assert!(!cancelled.parallel_mode);
    assert!(cancelled.completed_at.is_some());

    let steps = engine.store_mut()
                      .transaction(|tx| tx.steps_for_instance(instance.id))
                      .unwrap();
    assert_eq!(steps.len(), 2);
    for s in &steps {
        assert_eq!(s.status, StepStatus::Skipped);
    }
    // Mismo timestamp para todos los steps salteados
    assert_eq!(steps[0].completed_at, steps[1].completed_at);

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    let cancelled_entries = history.iter()
                                   .filter(|h| h.action == HistoryAction::WorkflowCancelled)
                                   .count();
    assert_eq!(cancelled_entries, 1);

    // Cancelar de nuevo: idempotente, sin nueva entrada.
    engine.cancel_workflow(instance.id, "alice", None, None).unwrap();
    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    assert_eq!(history.iter().filter(|h| h.action == HistoryAction::WorkflowCancelled).count(), 1);
}

#[test]
fn cancelling_a_completed_instance_is_rejected() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let step_id = *instance.active_steps.first().unwrap();
    engine.execute_step(instance.id, step_id, ExecutePayload::new(StepStatus::Approved), "bob")
          .unwrap();

    let err = engine.cancel_workflow(instance.id, "alice", None, None).unwrap_err();
    assert_eq!(err, EngineError::AlreadyCompleted);
}

#[test]
fn cancelling_a_suspended_instance_succeeds() {
    let template = sequential_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    engine.suspend_workflow(instance.id, "alice", None, None).unwrap();

    let cancelled = engine.cancel_workflow(instance.id, "alice", Some("sin respuesta"), None).unwrap();
    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
}
