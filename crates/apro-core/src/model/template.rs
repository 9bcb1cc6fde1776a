//! Plantilla de workflow: definición inmutable una vez publicada.
//!
//! El motor sólo la consume; la autoría (editor gráfico, versionado,
//! supersede) ocurre fuera de este core. Invariante de linaje: dentro de una
//! misma línea de versiones (raíz + hijas) a lo sumo una plantilla tiene
//! `is_current = true` (reforzado por índice parcial en el esquema SQL).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// Grafo crudo (`{nodes, edges}`) tal como lo produjo el editor.
    pub definition: Value,
    pub version: i32,
    pub is_active: bool,
    pub is_current: bool,
    /// Enlaza la línea de versiones; `None` en la raíz.
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Plantilla raíz recién publicada (versión 1, activa y vigente).
    pub fn new(organization_id: Uuid, name: impl Into<String>, definition: Value) -> Self {
        Self { id: Uuid::new_v4(),
               organization_id,
               name: name.into(),
               definition,
               version: 1,
               is_active: true,
               is_current: true,
               parent_id: None,
               created_at: Utc::now() }
    }
}
