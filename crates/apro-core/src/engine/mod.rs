//! Motor de ejecución de workflows.

mod core;

pub use self::core::WorkflowEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::StepStatus;

/// Payload de arranque de una instancia.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartPayload {
    pub title: Option<String>,
    pub form_data: Option<Value>,
}

impl StartPayload {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_form_data(mut self, form_data: Value) -> Self {
        self.form_data = Some(form_data);
        self
    }
}

/// Payload de ejecución de un step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePayload {
    pub status: StepStatus,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl ExecutePayload {
    pub fn new(status: StepStatus) -> Self {
        Self { status,
               data: None,
               comments: None,
               reason: None,
               assigned_to: None,
               assigned_at: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_assignee(mut self, assigned_to: impl Into<String>, assigned_at: Option<DateTime<Utc>>) -> Self {
        self.assigned_to = Some(assigned_to.into());
        self.assigned_at = assigned_at;
        self
    }
}
