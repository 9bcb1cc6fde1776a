//! Modelo de grafo de una plantilla de workflow.
//!
//! Rol en el flujo:
//! - El motor parsea el JSON `definition` almacenado en la plantilla a una
//!   estructura tipada en CADA operación (nunca se retiene entre requests,
//!   para evitar divergencia entre el JSON persistido y supuestos en memoria).
//! - Las búsquedas de nodos/aristas que no encuentran nada devuelven
//!   ausencia (Option / slice vacío), nunca panic: para el recorrido, "sin
//!   aristas salientes" y "nodo desconocido" son señales de terminación.
//! - Tipos de nodo desconocidos se rechazan al parsear, no al recorrer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;

/// Tipos de nodo soportados por el editor y el motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Approval,
    Condition,
    End,
}

/// Nodo ya tipado del grafo.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    /// Payload inicial configurado en el editor para el step que active este
    /// nodo (sólo relevante en nodos `approval`).
    pub config: Option<Value>,
}

/// Arista dirigida, ya tipada. Se indexa por `source` para el recorrido.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub condition: Option<String>,
    pub is_default: bool,
}

// Shape crudo del JSON producido por el editor. Campos extra (p.ej.
// `position`) se ignoran.
#[derive(Deserialize)]
struct RawDefinition {
    nodes: Vec<RawNode>,
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    data: RawNodeData,
}

#[derive(Deserialize, Default)]
struct RawNodeData {
    #[serde(default)]
    label: String,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Deserialize)]
struct RawEdge {
    source: String,
    target: String,
    #[serde(default)]
    data: RawEdgeData,
}

#[derive(Deserialize, Default)]
struct RawEdgeData {
    #[serde(default)]
    condition: Option<String>,
    #[serde(rename = "isDefault", default)]
    is_default: bool,
}

/// Grafo construido desde una `definition`. Dos estructuras de búsqueda:
/// `nodes` (id -> nodo) y `edges` (source -> aristas en orden de definición).
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<String, Vec<GraphEdge>>,
    start_id: Option<String>,
}

impl WorkflowGraph {
    /// Construye el grafo tipado. Falla con `InvalidDefinition` si el JSON no
    /// trae las colecciones `nodes`/`edges` o contiene un tipo de nodo
    /// desconocido.
    pub fn parse(definition: &Value) -> Result<Self, EngineError> {
        let raw: RawDefinition = serde_json::from_value(definition.clone())
            .map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;

        // El primer nodo `start` en orden de definición es el canónico;
        // múltiples nodos start es un error de autoría tolerado en silencio.
        let start_id = raw.nodes
                          .iter()
                          .find(|n| n.kind == NodeKind::Start)
                          .map(|n| n.id.clone());

        let mut nodes: HashMap<String, GraphNode> = HashMap::with_capacity(raw.nodes.len());
        for n in raw.nodes {
            nodes.insert(n.id.clone(),
                         GraphNode { id: n.id,
                                     kind: n.kind,
                                     label: n.data.label,
                                     config: n.data.config });
        }

        let mut edges: HashMap<String, Vec<GraphEdge>> = HashMap::new();
        for e in raw.edges {
            edges.entry(e.source.clone())
                 .or_default()
                 .push(GraphEdge { source: e.source,
                                   target: e.target,
                                   condition: e.data.condition,
                                   is_default: e.data.is_default });
        }

        Ok(Self { nodes, edges, start_id })
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Aristas salientes en orden de definición. Slice vacío si no hay.
    pub fn outgoing(&self, id: &str) -> &[GraphEdge] {
        self.edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Nodo `start` canónico de la definición.
    pub fn start_node(&self) -> Option<&GraphNode> {
        self.start_id.as_deref().and_then(|id| self.nodes.get(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
