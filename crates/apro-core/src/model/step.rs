//! Activación de un nodo `approval`: el step que un usuario debe resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Estado de un step.
///
/// Las transiciones avanzan de forma monótona hacia un estado terminal:
/// - `Pending` -> `InProgress` -> {`Approved`, `Rejected`, `Skipped`}
/// - `Pending` -> {`Approved`, `Rejected`, `Skipped`}
///
/// No se permiten reversiones; un step terminal no vuelve a ejecutarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Skipped)
    }

    /// Forma textual estable para almacenamiento y logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// `true` si pasar de `self` a `to` respeta la monotonía.
    pub fn can_transition(&self, to: StepStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (Self::InProgress, Self::Pending) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepInstance {
    pub instance_id: Uuid,
    /// Entero monótono creciente por instancia; nunca se reutiliza.
    pub step_id: i64,
    /// Id del nodo que lo originó. No es único: un mismo nodo puede activarse
    /// varias veces (ciclos de revisión).
    pub step_key: String,
    pub status: StepStatus,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    /// Payload: arranca con el `config` del nodo y acumula merges de cada
    /// ejecución.
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowStepInstance {
    pub fn activate(instance_id: Uuid, step_id: i64, step_key: impl Into<String>, config: Option<Value>) -> Self {
        Self { instance_id,
               step_id,
               step_key: step_key.into(),
               status: StepStatus::Pending,
               assigned_to: None,
               assigned_at: None,
               completed_at: None,
               comments: None,
               data: config.unwrap_or_else(|| Value::Object(Default::default())),
               created_at: Utc::now() }
    }
}
