//! Fan-out paralelo y su punto de join.

use apro_core::{ExecutePayload, HistoryAction, InMemoryWorkflowStore, InstanceStatus, StartPayload, StepStatus, WorkflowEngine, WorkflowStore, WorkflowTemplate};
use serde_json::json;
use uuid::Uuid;

// start abre dos ramas (B y C); ambas convergen en end.
fn parallel_template() -> WorkflowTemplate {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {}},
            {"id": "B", "type": "approval", "data": {"label": "Legal"}},
            {"id": "C", "type": "approval", "data": {"label": "Finanzas"}},
            {"id": "end", "type": "end", "data": {}}
        ],
        "edges": [
            {"source": "start", "target": "B", "data": {}},
            {"source": "start", "target": "C", "data": {}},
            {"source": "B", "target": "end", "data": {}},
            {"source": "C", "target": "end", "data": {}}
        ]
    });
    WorkflowTemplate::new(Uuid::new_v4(), "Doble revisión", definition)
}

fn engine_with(template: &WorkflowTemplate) -> WorkflowEngine<InMemoryWorkflowStore> {
    let mut engine = WorkflowEngine::new(InMemoryWorkflowStore::new());
    engine.store_mut()
          .transaction(|tx| tx.insert_template(template))
          .expect("seed template");
    engine
}

#[test]
fn start_fans_out_to_two_active_steps() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();

    assert_eq!(instance.active_steps.len(), 2);
    assert!(instance.parallel_mode);

    let steps = engine.store_mut()
                      .transaction(|tx| tx.steps_for_instance(instance.id))
                      .unwrap();
    let keys: Vec<&str> = steps.iter().map(|s| s.step_key.as_str()).collect();
    assert_eq!(keys, vec!["B", "C"]);
    // Ids monótonos desde 1
    assert_eq!(steps[0].step_id, 1);
    assert_eq!(steps[1].step_id, 2);
}

#[test]
fn last_branch_to_finish_completes_the_instance() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let ids: Vec<i64> = instance.active_steps.iter().copied().collect();
    let (b_id, c_id) = (ids[0], ids[1]);

    // Completar B: C sigue pendiente, la instancia no se completa todavía.
    engine.execute_step(instance.id, b_id, ExecutePayload::new(StepStatus::Approved), "bob")
          .unwrap();
    let mid = engine.store_mut()
                    .transaction(|tx| tx.get_instance(instance.id))
                    .unwrap();
    assert_eq!(mid.status, InstanceStatus::Running);
    assert_eq!(mid.active_steps.iter().copied().collect::<Vec<_>>(), vec![c_id]);
    assert!(!mid.parallel_mode);

    // Completar C: la última rama en terminar es la que cierra.
    engine.execute_step(instance.id, c_id, ExecutePayload::new(StepStatus::Approved), "carol")
          .unwrap();
    let done = engine.store_mut()
                     .transaction(|tx| tx.get_instance(instance.id))
                     .unwrap();
    assert_eq!(done.status, InstanceStatus::Completed);
    assert!(done.active_steps.is_empty());

    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance.id))
                        .unwrap();
    let completed_entries = history.iter()
                                   .filter(|h| h.action == HistoryAction::WorkflowCompleted)
                                   .count();
    assert_eq!(completed_entries, 1);
}

#[test]
fn context_merges_across_branches() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default().with_form_data(json!({"customer": {"tier": "gold"}})), "alice")
                         .unwrap();
    let ids: Vec<i64> = instance.active_steps.iter().copied().collect();

    engine.execute_step(instance.id,
                        ids[0],
                        ExecutePayload::new(StepStatus::Approved).with_data(json!({"region": "west"})),
                        "bob")
          .unwrap();
    engine.execute_step(instance.id,
                        ids[1],
                        ExecutePayload::new(StepStatus::Approved).with_data(json!({"amount": 10, "customer": {"verified": true}})),
                        "carol")
          .unwrap();

    let done = engine.store_mut()
                     .transaction(|tx| tx.get_instance(instance.id))
                     .unwrap();
    // Merge profundo: ninguna clave pisa a la otra y los objetos anidados se
    // combinan.
    assert_eq!(done.form_data,
               json!({
                   "customer": {"tier": "gold", "verified": true},
                   "region": "west",
                   "amount": 10
               }));
}

#[test]
fn rejecting_one_branch_suspends_the_whole_instance() {
    let template = parallel_template();
    let mut engine = engine_with(&template);

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").unwrap();
    let ids: Vec<i64> = instance.active_steps.iter().copied().collect();

    engine.execute_step(instance.id,
                        ids[0],
                        ExecutePayload::new(StepStatus::Rejected).with_reason("presupuesto insuficiente"),
                        "bob")
          .unwrap();

    let suspended = engine.store_mut()
                          .transaction(|tx| tx.get_instance(instance.id))
                          .unwrap();
    assert_eq!(suspended.status, InstanceStatus::Suspended);
    // El step rechazado sale del conjunto activo; la otra rama queda tal cual.
    assert_eq!(suspended.active_steps.iter().copied().collect::<Vec<_>>(), vec![ids[1]]);

    let other = engine.store_mut()
                      .transaction(|tx| tx.get_step(instance.id, ids[1]))
                      .unwrap();
    assert_eq!(other.status, StepStatus::Pending);
}
