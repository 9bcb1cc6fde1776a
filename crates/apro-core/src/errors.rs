//! Errores específicos del motor (simples por ahora).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum EngineError {
    #[error("invalid definition: {0}")] InvalidDefinition(String),
    #[error("node '{0}' no longer present in definition")] UnresolvableNode(String),
    #[error("not found")] NotFound,
    #[error("step already terminal")] StepAlreadyTerminal,
    #[error("invalid step transition: {0} -> {1}")] InvalidStepTransition(String, String),
    #[error("workflow already completed")] AlreadyCompleted,
    #[error("template is not active")] TemplateInactive,
    #[error("storage: {0}")] Storage(String),
    #[error("internal: {0}")] Internal(String),
}
