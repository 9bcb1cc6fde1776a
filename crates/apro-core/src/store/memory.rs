//! Backend en memoria con paridad 1:1 respecto a Postgres.
//!
//! La atomicidad se implementa por snapshot: la transacción clona el estado,
//! aplica los cambios sobre el vivo y, ante `Err`, restaura el snapshot. Es el
//! backend de los tests del core y del binario de demostración.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::model::{HistoryEntry, NewHistoryEntry, WorkflowInstance, WorkflowStepInstance, WorkflowTemplate};
use crate::store::{WorkflowStore, WorkflowTx};

#[derive(Debug, Clone, Default)]
struct MemState {
    templates: HashMap<Uuid, WorkflowTemplate>,
    instances: HashMap<Uuid, WorkflowInstance>,
    // BTreeMap para que el listado por instancia salga ordenado por step_id.
    steps: BTreeMap<(Uuid, i64), WorkflowStepInstance>,
    history: HashMap<Uuid, Vec<HistoryEntry>>,
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    state: MemState,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn transaction<T, F>(&mut self, f: F) -> Result<T, EngineError>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T, EngineError>
    {
        let snapshot = self.state.clone();
        let mut tx = MemTx { state: &mut self.state };
        match f(&mut tx) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.state = snapshot;
                Err(e)
            }
        }
    }
}

struct MemTx<'a> {
    state: &'a mut MemState,
}

impl WorkflowTx for MemTx<'_> {
    fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<(), EngineError> {
        self.state.templates.insert(template.id, template.clone());
        Ok(())
    }

    fn get_template(&mut self, id: Uuid) -> Result<WorkflowTemplate, EngineError> {
        self.state.templates.get(&id).cloned().ok_or(EngineError::NotFound)
    }

    fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        self.state.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    fn get_instance(&mut self, id: Uuid) -> Result<WorkflowInstance, EngineError> {
        self.state.instances.get(&id).cloned().ok_or(EngineError::NotFound)
    }

    fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        if !self.state.instances.contains_key(&instance.id) {
            return Err(EngineError::NotFound);
        }
        self.state.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    fn insert_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError> {
        self.state.steps.insert((step.instance_id, step.step_id), step.clone());
        Ok(())
    }

    fn get_step(&mut self, instance_id: Uuid, step_id: i64) -> Result<WorkflowStepInstance, EngineError> {
        self.state.steps.get(&(instance_id, step_id)).cloned().ok_or(EngineError::NotFound)
    }

    fn update_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError> {
        let key = (step.instance_id, step.step_id);
        if !self.state.steps.contains_key(&key) {
            return Err(EngineError::NotFound);
        }
        self.state.steps.insert(key, step.clone());
        Ok(())
    }

    fn max_step_id(&mut self, instance_id: Uuid) -> Result<i64, EngineError> {
        let max = self.state
                      .steps
                      .range((instance_id, i64::MIN)..=(instance_id, i64::MAX))
                      .map(|((_, step_id), _)| *step_id)
                      .max()
                      .unwrap_or(0);
        Ok(max)
    }

    fn steps_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<WorkflowStepInstance>, EngineError> {
        Ok(self.state
               .steps
               .range((instance_id, i64::MIN)..=(instance_id, i64::MAX))
               .map(|(_, s)| s.clone())
               .collect())
    }

    fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, EngineError> {
        let vec = self.state.history.entry(entry.instance_id).or_default();
        let seq = vec.len() as i64;
        let full = HistoryEntry { seq,
                                  instance_id: entry.instance_id,
                                  action: entry.action,
                                  performed_by: entry.performed_by,
                                  performed_at: Utc::now(),
                                  data: entry.data,
                                  comments: entry.comments };
        vec.push(full.clone());
        Ok(full)
    }

    fn history_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.state.history.get(&instance_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HistoryAction, WorkflowTemplate};
    use serde_json::json;

    #[test]
    fn failed_transaction_rolls_back_every_write() {
        let mut store = InMemoryWorkflowStore::new();
        let template = WorkflowTemplate::new(Uuid::new_v4(), "T", json!({"nodes": [], "edges": []}));
        let tpl_id = template.id;
        let inst_id = Uuid::new_v4();

        let result: Result<(), EngineError> = store.transaction(|tx| {
            tx.insert_template(&template)?;
            tx.append_history(NewHistoryEntry::new(inst_id, HistoryAction::WorkflowStarted, "u", json!({})))?;
            Err(EngineError::Internal("boom".into()))
        });
        assert!(result.is_err());

        // Nada de lo escrito dentro de la transacción fallida es observable.
        let template_after = store.transaction(|tx| tx.get_template(tpl_id));
        assert_eq!(template_after.unwrap_err(), EngineError::NotFound);
        let history = store.transaction(|tx| tx.history_for_instance(inst_id)).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn max_step_id_is_scoped_per_instance() {
        let mut store = InMemoryWorkflowStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.transaction(|tx| {
                 let step = crate::model::WorkflowStepInstance::activate(a, 7, "X", None);
                 tx.insert_step(&step)?;
                 assert_eq!(tx.max_step_id(a)?, 7);
                 assert_eq!(tx.max_step_id(b)?, 0);
                 Ok(())
             })
             .unwrap();
    }
}
