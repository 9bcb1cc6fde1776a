//! apro-core: Motor de ejecución de workflows de aprobación
pub mod condition;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod merge;
pub mod model;
pub mod store;


pub use engine::{ExecutePayload, StartPayload, WorkflowEngine};
pub use errors::EngineError;
pub use graph::{GraphEdge, GraphNode, NodeKind, WorkflowGraph};
pub use merge::{deep_merge, merge_json};
pub use model::{HistoryAction, HistoryEntry, InstanceStatus, NewHistoryEntry, StepStatus, WorkflowInstance, WorkflowStepInstance, WorkflowTemplate};
pub use store::{InMemoryWorkflowStore, WorkflowStore, WorkflowTx};
