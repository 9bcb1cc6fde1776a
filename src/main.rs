//! Binario de demostración del motor de workflows de aprobación.
//!
//! Corre tres flujos representativos (secuencial, paralelo y condicional)
//! sobre el backend en memoria e imprime el historial de auditoría de cada
//! uno. Con `--features pg_demo` ejecuta además el flujo secuencial contra
//! Postgres usando la configuración de `.env`.

use apro_core::{ExecutePayload, InMemoryWorkflowStore, StartPayload, StepStatus, WorkflowEngine, WorkflowStore, WorkflowTemplate};
use serde_json::json;
use uuid::Uuid;

fn main() {
    println!("== Demo secuencial ==");
    run_sequential_demo();
    println!("\n== Demo paralelo ==");
    run_parallel_demo();
    println!("\n== Demo condicional ==");
    run_conditional_demo();

    #[cfg(feature = "pg_demo")]
    {
        println!("\n== Demo Postgres ==");
        run_pg_demo();
    }
}

fn sequential_template() -> WorkflowTemplate {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {"label": "Inicio"}},
            {"id": "review", "type": "approval", "data": {"label": "Revisión de gastos", "config": {"department": "finance"}}},
            {"id": "end", "type": "end", "data": {"label": "Fin"}}
        ],
        "edges": [
            {"source": "start", "target": "review", "data": {}},
            {"source": "review", "target": "end", "data": {}}
        ]
    });
    WorkflowTemplate::new(Uuid::new_v4(), "Aprobación de gastos", definition)
}

fn print_history<S: WorkflowStore>(engine: &mut WorkflowEngine<S>, instance_id: Uuid) {
    let history = engine.store_mut()
                        .transaction(|tx| tx.history_for_instance(instance_id))
                        .expect("history");
    for h in history {
        println!("  [{}] {} por {} {}", h.seq, h.action.as_str(), h.performed_by, h.data);
    }
}

fn run_sequential_demo() {
    let template = sequential_template();
    let mut engine = WorkflowEngine::new(InMemoryWorkflowStore::new());
    engine.store_mut()
          .transaction(|tx| tx.insert_template(&template))
          .expect("seed template");

    let instance = engine.start_workflow(&template,
                                         StartPayload::default().with_title("Notebook para onboarding")
                                                                .with_form_data(json!({"amount": 1200})),
                                         "alice")
                         .expect("start");
    println!("instancia {} arrancó con {} step(s) activo(s)", instance.id, instance.active_steps.len());

    let step_id = *instance.active_steps.first().expect("un step activo");
    engine.execute_step(instance.id,
                        step_id,
                        ExecutePayload::new(StepStatus::Approved).with_data(json!({"cost_center": "IT-204"}))
                                                                 .with_comments("ok, dentro de presupuesto"),
                        "bob")
          .expect("execute");

    let done = engine.store_mut()
                     .transaction(|tx| tx.get_instance(instance.id))
                     .expect("instance");
    println!("estado final: {}", done.status.as_str());
    print_history(&mut engine, instance.id);
}

fn run_parallel_demo() {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {}},
            {"id": "legal", "type": "approval", "data": {"label": "Legal"}},
            {"id": "finance", "type": "approval", "data": {"label": "Finanzas"}},
            {"id": "end", "type": "end", "data": {}}
        ],
        "edges": [
            {"source": "start", "target": "legal", "data": {}},
            {"source": "start", "target": "finance", "data": {}},
            {"source": "legal", "target": "end", "data": {}},
            {"source": "finance", "target": "end", "data": {}}
        ]
    });
    let template = WorkflowTemplate::new(Uuid::new_v4(), "Contrato con doble revisión", definition);
    let mut engine = WorkflowEngine::new(InMemoryWorkflowStore::new());
    engine.store_mut()
          .transaction(|tx| tx.insert_template(&template))
          .expect("seed template");

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").expect("start");
    println!("fan-out: {} ramas activas (parallel_mode={})",
             instance.active_steps.len(),
             instance.parallel_mode);

    let ids: Vec<i64> = instance.active_steps.iter().copied().collect();
    for (id, user) in ids.iter().zip(["legal-team", "finance-team"]) {
        engine.execute_step(instance.id, *id, ExecutePayload::new(StepStatus::Approved), user)
              .expect("execute");
    }

    let done = engine.store_mut()
                     .transaction(|tx| tx.get_instance(instance.id))
                     .expect("instance");
    println!("estado final: {}", done.status.as_str());
    print_history(&mut engine, instance.id);
}

fn run_conditional_demo() {
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start", "data": {}},
            {"id": "route", "type": "condition", "data": {"label": "¿Monto alto?"}},
            {"id": "cfo", "type": "approval", "data": {"label": "CFO"}},
            {"id": "director", "type": "approval", "data": {"label": "Director"}},
            {"id": "end", "type": "end", "data": {}}
        ],
        "edges": [
            {"source": "start", "target": "route", "data": {}},
            {"source": "route", "target": "cfo", "data": {"condition": "amount >= 100000"}},
            {"source": "route", "target": "director", "data": {"isDefault": true}},
            {"source": "cfo", "target": "end", "data": {}},
            {"source": "director", "target": "end", "data": {}}
        ]
    });
    let template = WorkflowTemplate::new(Uuid::new_v4(), "Ruteo por monto", definition);
    let mut engine = WorkflowEngine::new(InMemoryWorkflowStore::new());
    engine.store_mut()
          .transaction(|tx| tx.insert_template(&template))
          .expect("seed template");

    for amount in [150000, 500] {
        let instance = engine.start_workflow(&template,
                                             StartPayload::default().with_form_data(json!({"amount": amount})),
                                             "alice")
                             .expect("start");
        let step_id = *instance.active_steps.first().expect("un step activo");
        let step = engine.store_mut()
                         .transaction(|tx| tx.get_step(instance.id, step_id))
                         .expect("step");
        println!("monto {} -> aprueba '{}'", amount, step.step_key);
    }
}

#[cfg(feature = "pg_demo")]
fn run_pg_demo() {
    use apro_persistence::pg::{PgWorkflowStore, PoolProvider};

    let pool = apro_persistence::build_dev_pool_from_env().expect("pool Postgres (ver DATABASE_URL en .env)");
    let mut engine = WorkflowEngine::new(PgWorkflowStore::new(PoolProvider { pool }));

    let template = sequential_template();
    engine.store_mut()
          .transaction(|tx| tx.insert_template(&template))
          .expect("seed template");

    let instance = engine.start_workflow(&template, StartPayload::default(), "alice").expect("start");
    let step_id = *instance.active_steps.first().expect("un step activo");
    engine.execute_step(instance.id, step_id, ExecutePayload::new(StepStatus::Approved), "bob")
          .expect("execute");

    let done = engine.store_mut()
                     .transaction(|tx| tx.get_instance(instance.id))
                     .expect("instance");
    println!("instancia {} persistida con estado {}", done.id, done.status.as_str());
    print_history(&mut engine, instance.id);
}
