use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tensor::{DType, TensorDesc};

use super::{OpAttrs, OpKind};

/// Index of a node in its graph; also the insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of an edge in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Operator invocation owned by a [`super::Graph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub uuid: Uuid,
    pub name: String,
    pub kind: OpKind,
    pub inputs: Vec<EdgeId>,
    pub outputs: Vec<EdgeId>,
    pub attrs: OpAttrs,
    /// Output element type requested by the model, if any.
    pub forced_dtype: Option<DType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRole {
    Internal,
    Input,
    Constant,
}

/// Tensor flowing between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub name: String,
    pub producer: Option<NodeId>,
    pub consumers: Vec<NodeId>,
    pub role: EdgeRole,
    pub is_output: bool,
    pub desc: Option<TensorDesc>,
    /// Constant payload; stored apart from the JSON form of the graph.
    #[serde(skip)]
    pub data: Option<Arc<Vec<u8>>>,
}

impl Edge {
    /// Inputs, outputs and constants never share arena space.
    pub fn is_pinned(&self) -> bool {
        self.is_output || matches!(self.role, EdgeRole::Input | EdgeRole::Constant)
    }
}

pub fn describe_node(node: &Node, edge_name: impl Fn(EdgeId) -> String) -> String {
    let inputs: Vec<String> = node.inputs.iter().map(|e| edge_name(*e)).collect();
    let outputs: Vec<String> = node.outputs.iter().map(|e| edge_name(*e)).collect();
    format!(
        "{} {}({}) >> {}",
        node.kind,
        node.name,
        inputs.join(","),
        outputs.join(",")
    )
}
