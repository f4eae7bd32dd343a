//! The DAG data model (§3 "DAG", §4.F DAG Router).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Source,
    Transformer,
    Destination,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DagNode {
    pub id: Uuid,
    pub name: String,
    pub node_type: NodeType,
}

/// A typed edge: entities of `entity_type` flowing out of `from` are routed
/// to `to` (§3 "Edges are typed").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub entity_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dag {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
}

impl Dag {
    pub fn source_node(&self) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.node_type == NodeType::Source)
    }

    pub fn destination_nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter().filter(|n| n.node_type == NodeType::Destination)
    }

    pub fn node(&self, id: Uuid) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of `from` whose declared type matches `entity_type`.
    pub fn matching_edges<'a>(
        &'a self,
        from: Uuid,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a DagEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.from == from && e.entity_type == entity_type)
    }
}

/// Resolved name→callable map built once at context-build time (§4.F
/// "Transformer cache"). `HashMap` keyed by the transformer node's `name`.
pub type TransformerRegistry = HashMap<String, std::sync::Arc<dyn crate::traits::Transformer>>;
