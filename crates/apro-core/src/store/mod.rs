//! Abstracción de almacenamiento del motor.
//!
//! El motor es genérico sobre un `WorkflowStore`; cada operación pública corre
//! dentro de exactamente UNA transacción (`transaction`), de modo que "todo se
//! persiste o nada" vale tanto para el backend en memoria (snapshot/rollback)
//! como para Postgres (transacción Diesel).
//!
//! `get_instance` es el ancla read-then-write: la implementación Postgres toma
//! `FOR UPDATE` sobre la fila de la instancia, serializando ejecuciones
//! concurrentes de ramas paralelas de la misma instancia.

pub mod memory;

use uuid::Uuid;

use crate::errors::EngineError;
use crate::model::{HistoryEntry, NewHistoryEntry, WorkflowInstance, WorkflowStepInstance, WorkflowTemplate};

/// Operaciones de entidad dentro de una unidad de trabajo.
pub trait WorkflowTx {
    // Plantillas
    fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<(), EngineError>;
    fn get_template(&mut self, id: Uuid) -> Result<WorkflowTemplate, EngineError>;

    // Instancias
    fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError>;
    /// Lectura fresca de la instancia (con lock pesimista en Postgres).
    fn get_instance(&mut self, id: Uuid) -> Result<WorkflowInstance, EngineError>;
    fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError>;

    // Steps
    fn insert_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError>;
    fn get_step(&mut self, instance_id: Uuid, step_id: i64) -> Result<WorkflowStepInstance, EngineError>;
    fn update_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError>;
    /// Máximo `step_id` asignado en la instancia (0 si no hay steps).
    fn max_step_id(&mut self, instance_id: Uuid) -> Result<i64, EngineError>;
    fn steps_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<WorkflowStepInstance>, EngineError>;

    // Historial (append-only)
    fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, EngineError>;
    fn history_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<HistoryEntry>, EngineError>;
}

/// Fábrica de unidades de trabajo atómicas.
pub trait WorkflowStore {
    /// Ejecuta `f` dentro de una transacción. Si `f` devuelve `Err`, ningún
    /// cambio hecho a través del `WorkflowTx` debe ser observable después.
    fn transaction<T, F>(&mut self, f: F) -> Result<T, EngineError>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T, EngineError>;
}

pub use memory::InMemoryWorkflowStore;
