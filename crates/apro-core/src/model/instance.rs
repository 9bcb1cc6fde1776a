//! Instancia de workflow: una ejecución de una plantilla.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::template::WorkflowTemplate;

/// Estado de una instancia.
///
/// Transiciones válidas:
/// - `Running` -> {`Suspended`, `Cancelled`, `Completed`}
/// - `Suspended` -> {`Running`, `Cancelled`}
/// - `Completed` / `Cancelled` son terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Suspended,
    Cancelled,
    Completed,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "suspended" => Some(Self::Suspended),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    /// Contexto mutable: acumula los merges profundos de cada step ejecutado.
    pub form_data: Value,
    pub status: InstanceStatus,
    /// Conjunto ordenado (orden de inserción, sin duplicados) de step_ids que
    /// esperan acción.
    pub active_steps: IndexSet<i64>,
    pub parallel_mode: bool,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn start(template: &WorkflowTemplate, title: Option<String>, form_data: Option<Value>, started_by: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               template_id: template.id,
               organization_id: template.organization_id,
               title: title.unwrap_or_else(|| template.name.clone()),
               form_data: form_data.unwrap_or_else(|| Value::Object(Default::default())),
               status: InstanceStatus::Running,
               active_steps: IndexSet::new(),
               parallel_mode: false,
               started_by: started_by.into(),
               started_at: Utc::now(),
               completed_at: None }
    }

    /// Incorpora step_ids recién activados preservando orden y sin duplicar;
    /// recalcula `parallel_mode`.
    pub fn merge_active_steps(&mut self, ids: &[i64]) {
        for id in ids {
            self.active_steps.insert(*id);
        }
        self.parallel_mode = self.active_steps.len() > 1;
    }

    pub fn remove_active_step(&mut self, id: i64) {
        self.active_steps.shift_remove(&id);
        self.parallel_mode = self.active_steps.len() > 1;
    }
}
