//! Core WorkflowEngine implementation
//!
//! Orquesta start/execute/suspend/resume/cancel/complete contra el grafo de
//! la plantilla y el estado persistente. Cada operación pública corre dentro
//! de UNA transacción del store: o se observa todo su efecto (steps creados,
//! historial, instancia actualizada) o nada.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::condition;
use crate::engine::{ExecutePayload, StartPayload};
use crate::errors::EngineError;
use crate::graph::{NodeKind, WorkflowGraph};
use crate::merge;
use crate::model::{HistoryAction, InstanceStatus, NewHistoryEntry, StepStatus, WorkflowInstance, WorkflowStepInstance, WorkflowTemplate};
use crate::store::{WorkflowStore, WorkflowTx};

/// Motor de ejecución de instancias de workflow.
///
/// Genérico sobre el almacenamiento: en memoria para tests/demos, Postgres en
/// producción. El motor no programa timers ni ejecuta código arbitrario; sólo
/// interpreta el grafo y registra cada transición en el historial.
pub struct WorkflowEngine<S: WorkflowStore> {
    store: S,
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Arranca una instancia de la plantilla y avanza desde el nodo start.
    ///
    /// Atómico: si el avance inicial falla, ni la instancia ni su historial
    /// quedan persistidos.
    pub fn start_workflow(&mut self, template: &WorkflowTemplate, payload: StartPayload, user: &str) -> Result<WorkflowInstance, EngineError> {
        if !template.is_active {
            return Err(EngineError::TemplateInactive);
        }
        let graph = WorkflowGraph::parse(&template.definition)?;
        let start_id = graph.start_node()
                            .map(|n| n.id.clone())
                            .ok_or_else(|| EngineError::InvalidDefinition("definition has no start node".into()))?;

        let template_id = template.id;
        let template_version = template.version;
        self.store.transaction(move |tx| {
            let mut instance = WorkflowInstance::start(template, payload.title, payload.form_data, user);
            tx.insert_instance(&instance)?;
            tx.append_history(NewHistoryEntry::new(instance.id,
                                                   HistoryAction::WorkflowStarted,
                                                   user,
                                                   json!({
                                                       "template_id": template_id,
                                                       "template_version": template_version,
                                                   })))?;

            let context = instance.form_data.clone();
            advance_from_node(tx, &mut instance, &graph, &start_id, &context, user)?;
            tx.update_instance(&instance)?;
            tx.get_instance(instance.id)
        })
    }

    /// Ejecuta un step: actualiza su estado/payload, fusiona el contexto de la
    /// instancia, registra historial y, si el resultado es terminal, retira el
    /// step del conjunto activo y avanza (o suspende, si fue rechazado).
    pub fn execute_step(&mut self, instance_id: Uuid, step_id: i64, payload: ExecutePayload, user: &str) -> Result<WorkflowStepInstance, EngineError> {
        self.store.transaction(move |tx| {
            // Recarga fresca (con lock de fila en Postgres) para acotar la
            // ventana de lost updates entre ramas paralelas.
            let mut instance = tx.get_instance(instance_id)?;
            let mut step = tx.get_step(instance_id, step_id)?;
            let template = tx.get_template(instance.template_id)?;
            let graph = WorkflowGraph::parse(&template.definition)?;
            // La plantilla pudo haber sido editada bajo una instancia en
            // curso: eso es un error duro, no se ignora.
            let node_id = graph.node(&step.step_key)
                               .map(|n| n.id.clone())
                               .ok_or_else(|| EngineError::UnresolvableNode(step.step_key.clone()))?;

            if step.status.is_terminal() {
                return Err(EngineError::StepAlreadyTerminal);
            }
            if !step.status.can_transition(payload.status) {
                return Err(EngineError::InvalidStepTransition(step.status.as_str().into(), payload.status.as_str().into()));
            }

            let submitted = payload.data.clone().unwrap_or(Value::Null);
            let has_data = !merge::is_empty_object(&submitted);
            if has_data {
                // Payload del step: merge shallow, claves posteriores ganan.
                step.data = merge::merge_json(&step.data, &submitted);
            }

            let now = chrono::Utc::now();
            let terminal = payload.status.is_terminal();
            step.status = payload.status;
            if terminal {
                step.completed_at = Some(now);
            }
            if let Some(c) = payload.comments.clone() {
                step.comments = Some(c);
            }
            if step.assigned_at.is_none() {
                if let Some(at) = payload.assigned_at {
                    step.assigned_at = Some(at);
                }
            }
            // La reasignación siempre está permitida.
            if let Some(to) = payload.assigned_to.clone() {
                step.assigned_to = Some(to);
            }
            tx.update_step(&step)?;

            if has_data {
                // Contexto de la instancia: merge profundo, los objetos
                // anidados se combinan en lugar de reemplazarse.
                instance.form_data = merge::deep_merge(&instance.form_data, &submitted);
            }

            let action = if terminal { HistoryAction::StepCompleted } else { HistoryAction::StepUpdated };
            tx.append_history(NewHistoryEntry::new(instance.id,
                                                   action,
                                                   user,
                                                   json!({
                                                       "step_id": step.step_id,
                                                       "step_key": step.step_key,
                                                       "status": step.status.as_str(),
                                                   })).with_comments(payload.comments.clone()))?;

            if terminal {
                instance.remove_active_step(step.step_id);
                if step.status == StepStatus::Rejected {
                    // Un rechazo detiene la rama y la instancia completa: no
                    // se avanza el grafo.
                    suspend_inner(tx, &mut instance, user, payload.reason.as_deref(), payload.comments.as_deref())?;
                } else {
                    let context = instance.form_data.clone();
                    advance_from_node(tx, &mut instance, &graph, &node_id, &context, user)?;
                }
            }

            tx.update_instance(&instance)?;
            tx.get_step(instance_id, step_id)
        })
    }

    /// Pausa la instancia. Idempotente; los steps activos quedan intactos
    /// (suspender es una pausa, no una cancelación).
    pub fn suspend_workflow(&mut self, instance_id: Uuid, user: &str, reason: Option<&str>, comments: Option<&str>) -> Result<WorkflowInstance, EngineError> {
        self.store.transaction(move |tx| {
            let mut instance = tx.get_instance(instance_id)?;
            if instance.status == InstanceStatus::Suspended || instance.status.is_terminal() {
                return Ok(instance);
            }
            suspend_inner(tx, &mut instance, user, reason, comments)?;
            tx.update_instance(&instance)?;
            tx.get_instance(instance_id)
        })
    }

    /// Reanuda una instancia suspendida. No-op sobre terminales. Si tras
    /// reanudar no queda ningún step activo (p.ej. la suspensión vino del
    /// rechazo del último step), intenta completar.
    pub fn resume_workflow(&mut self, instance_id: Uuid, user: &str, comments: Option<&str>) -> Result<WorkflowInstance, EngineError> {
        self.store.transaction(move |tx| {
            let mut instance = tx.get_instance(instance_id)?;
            if instance.status.is_terminal() {
                return Ok(instance);
            }
            if instance.status != InstanceStatus::Running {
                instance.status = InstanceStatus::Running;
                tx.append_history(NewHistoryEntry::new(instance.id, HistoryAction::WorkflowResumed, user, json!({}))
                                      .with_comments(comments.map(|c| c.to_string())))?;
            }
            if instance.active_steps.is_empty() {
                try_complete(tx, &mut instance, user)?;
            }
            tx.update_instance(&instance)?;
            tx.get_instance(instance_id)
        })
    }

    /// Cancela la instancia: todo step sin `completed_at` pasa a `skipped`
    /// con el mismo timestamp, el conjunto activo se vacía y se registra una
    /// única entrada de historial. Cancelar una instancia ya cancelada es
    /// no-op; cancelar una completada se rechaza.
    pub fn cancel_workflow(&mut self, instance_id: Uuid, user: &str, reason: Option<&str>, comments: Option<&str>) -> Result<WorkflowInstance, EngineError> {
        self.store.transaction(move |tx| {
            let mut instance = tx.get_instance(instance_id)?;
            if instance.status == InstanceStatus::Cancelled {
                return Ok(instance);
            }
            if instance.status == InstanceStatus::Completed {
                return Err(EngineError::AlreadyCompleted);
            }

            let now = chrono::Utc::now();
            let mut skipped: Vec<i64> = Vec::new();
            for mut step in tx.steps_for_instance(instance_id)? {
                if step.completed_at.is_none() {
                    step.status = StepStatus::Skipped;
                    step.completed_at = Some(now);
                    tx.update_step(&step)?;
                    skipped.push(step.step_id);
                }
            }

            instance.status = InstanceStatus::Cancelled;
            instance.completed_at = Some(now);
            instance.active_steps.clear();
            instance.parallel_mode = false;
            tx.append_history(NewHistoryEntry::new(instance.id,
                                                   HistoryAction::WorkflowCancelled,
                                                   user,
                                                   json!({
                                                       "reason": reason,
                                                       "skipped_steps": skipped,
                                                   })).with_comments(comments.map(|c| c.to_string())))?;
            tx.update_instance(&instance)?;
            tx.get_instance(instance_id)
        })
    }

    /// Intento de completado idempotente (punto de join del fan-out paralelo:
    /// la última rama en terminar es la que efectivamente completa).
    pub fn complete_workflow(&mut self, instance_id: Uuid, user: &str) -> Result<WorkflowInstance, EngineError> {
        self.store.transaction(move |tx| {
            let mut instance = tx.get_instance(instance_id)?;
            try_complete(tx, &mut instance, user)?;
            tx.update_instance(&instance)?;
            tx.get_instance(instance_id)
        })
    }
}

/// Avance desde un nodo: sin aristas salientes no hay nada que hacer (salvo
/// completar si es `end`); un nodo `condition` enruta por exactamente UNA
/// arista; cualquier otro nodo con varias aristas hace fan-out (así nacen las
/// ramas paralelas). Los step_ids creados se incorporan al conjunto activo.
fn advance_from_node(tx: &mut dyn WorkflowTx,
                     instance: &mut WorkflowInstance,
                     graph: &WorkflowGraph,
                     node_id: &str,
                     context: &Value,
                     user: &str)
                     -> Result<Vec<i64>, EngineError> {
    let node = match graph.node(node_id) {
        Some(n) => n,
        None => return Ok(Vec::new()),
    };
    let edges = graph.outgoing(node_id);
    if edges.is_empty() {
        if node.kind == NodeKind::End {
            try_complete(tx, instance, user)?;
        }
        // Dead-end de autoría en nodos no-end: tolerado en silencio.
        return Ok(Vec::new());
    }

    let mut created: Vec<i64> = Vec::new();
    if node.kind == NodeKind::Condition {
        // Router, no fork.
        if let Some(edge) = condition::select_edge(edges, context) {
            created.extend(activate_node(tx, instance, graph, &edge.target, context, user)?);
        }
    } else {
        for edge in edges {
            created.extend(activate_node(tx, instance, graph, &edge.target, context, user)?);
        }
    }

    instance.merge_active_steps(&created);
    Ok(created)
}

/// Activación de un nodo destino. Un nodo desconocido es no-op defensivo; un
/// `end` intenta completar; un `condition` deja traza y delega en el avance;
/// un `approval` crea el step pendiente con id monótono.
fn activate_node(tx: &mut dyn WorkflowTx,
                 instance: &mut WorkflowInstance,
                 graph: &WorkflowGraph,
                 node_id: &str,
                 context: &Value,
                 user: &str)
                 -> Result<Vec<i64>, EngineError> {
    let node = match graph.node(node_id) {
        Some(n) => n.clone(),
        None => return Ok(Vec::new()),
    };
    match node.kind {
        NodeKind::End => {
            try_complete(tx, instance, user)?;
            Ok(Vec::new())
        }
        NodeKind::Condition => {
            tx.append_history(NewHistoryEntry::new(instance.id,
                                                   HistoryAction::ConditionEvaluated,
                                                   user,
                                                   json!({"node_id": node.id, "label": node.label})))?;
            advance_from_node(tx, instance, graph, &node.id, context, user)
        }
        NodeKind::Approval => {
            let step_id = tx.max_step_id(instance.id)? + 1;
            let step = WorkflowStepInstance::activate(instance.id, step_id, &node.id, node.config.clone());
            tx.insert_step(&step)?;
            tx.append_history(NewHistoryEntry::new(instance.id,
                                                   HistoryAction::StepActivated,
                                                   user,
                                                   json!({
                                                       "step_id": step_id,
                                                       "step_key": node.id,
                                                       "label": node.label,
                                                   })))?;
            Ok(vec![step_id])
        }
        // Un `start` alcanzado como destino de arista es un error de autoría
        // tolerado: no se activa nada.
        NodeKind::Start => Ok(Vec::new()),
    }
}

/// Completa la instancia sólo si está `running` y no quedan steps activos.
/// Idempotente: sobre una instancia ya completada no toca nada ni duplica la
/// entrada de historial.
fn try_complete(tx: &mut dyn WorkflowTx, instance: &mut WorkflowInstance, user: &str) -> Result<(), EngineError> {
    if instance.status == InstanceStatus::Completed {
        return Ok(());
    }
    if !instance.active_steps.is_empty() {
        return Ok(());
    }
    if instance.status != InstanceStatus::Running {
        // Suspendida o cancelada: el completado ocurre (si corresponde) al
        // reanudar, nunca desde aquí.
        return Ok(());
    }
    instance.status = InstanceStatus::Completed;
    instance.completed_at = Some(chrono::Utc::now());
    instance.active_steps.clear();
    instance.parallel_mode = false;
    tx.append_history(NewHistoryEntry::new(instance.id, HistoryAction::WorkflowCompleted, user, json!({})))?;
    Ok(())
}

/// Suspensión compartida por la operación pública y el camino de rechazo.
fn suspend_inner(tx: &mut dyn WorkflowTx,
                 instance: &mut WorkflowInstance,
                 user: &str,
                 reason: Option<&str>,
                 comments: Option<&str>)
                 -> Result<(), EngineError> {
    if instance.status == InstanceStatus::Suspended || instance.status.is_terminal() {
        return Ok(());
    }
    instance.status = InstanceStatus::Suspended;
    tx.append_history(NewHistoryEntry::new(instance.id,
                                           HistoryAction::WorkflowSuspended,
                                           user,
                                           json!({"reason": reason})).with_comments(comments.map(|c| c.to_string())))?;
    Ok(())
}
