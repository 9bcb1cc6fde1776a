//! Historial de auditoría append-only de una instancia.
//!
//! Cada operación del motor que cambia estado agrega una entrada; ninguna se
//! modifica ni borra. El `seq` lo asigna el store (contador por instancia en
//! memoria, BIGSERIAL en Postgres).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Acciones simbólicas registradas por el motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    WorkflowStarted,
    StepActivated,
    ConditionEvaluated,
    StepUpdated,
    StepCompleted,
    WorkflowSuspended,
    WorkflowResumed,
    WorkflowCancelled,
    WorkflowCompleted,
}

impl HistoryAction {
    /// Nombre estable del evento, tal como se persiste.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow_started",
            Self::StepActivated => "step_activated",
            Self::ConditionEvaluated => "condition_evaluated",
            Self::StepUpdated => "step_updated",
            Self::StepCompleted => "step_completed",
            Self::WorkflowSuspended => "workflow_suspended",
            Self::WorkflowResumed => "workflow_resumed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::WorkflowCompleted => "workflow_completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workflow_started" => Some(Self::WorkflowStarted),
            "step_activated" => Some(Self::StepActivated),
            "condition_evaluated" => Some(Self::ConditionEvaluated),
            "step_updated" => Some(Self::StepUpdated),
            "step_completed" => Some(Self::StepCompleted),
            "workflow_suspended" => Some(Self::WorkflowSuspended),
            "workflow_resumed" => Some(Self::WorkflowResumed),
            "workflow_cancelled" => Some(Self::WorkflowCancelled),
            "workflow_completed" => Some(Self::WorkflowCompleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: i64,
    pub instance_id: Uuid,
    pub action: HistoryAction,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub data: Value,
    pub comments: Option<String>,
}

/// Entrada por insertar (el store completa `seq` y `performed_at`).
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub instance_id: Uuid,
    pub action: HistoryAction,
    pub performed_by: String,
    pub data: Value,
    pub comments: Option<String>,
}

impl NewHistoryEntry {
    pub fn new(instance_id: Uuid, action: HistoryAction, performed_by: impl Into<String>, data: Value) -> Self {
        Self { instance_id,
               action,
               performed_by: performed_by.into(),
               data,
               comments: None }
    }

    pub fn with_comments(mut self, comments: Option<String>) -> Self {
        self.comments = comments;
        self
    }
}
