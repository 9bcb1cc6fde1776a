//! Entidades persistentes del motor (plantilla, instancia, step, historial).

pub mod history;
pub mod instance;
pub mod step;
pub mod template;

pub use history::{HistoryAction, HistoryEntry, NewHistoryEntry};
pub use instance::{InstanceStatus, WorkflowInstance};
pub use step::{StepStatus, WorkflowStepInstance};
pub use template::WorkflowTemplate;
