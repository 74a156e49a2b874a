//! Id-indexed graph of operator nodes and tensor edges.
//!
//! Nodes and edges live in `Vec<Option<_>>` arenas; a removed entry leaves a
//! hole so ids stay stable across rewrites. Every mutating call validates
//! first and only then touches the arenas, so a failed rewrite leaves the
//! graph as it was.
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{rt_error, RetCode};
use crate::tensor::{DType, DataLayout, TensorDesc};

use super::node::describe_node;
use super::{Edge, EdgeId, EdgeRole, Node, NodeId, OpAttrs, OpKind};

fn invalid(message: impl Into<String>) -> anyhow::Error {
    rt_error(RetCode::InvalidGraph, message)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    inputs: Vec<EdgeId>,
    outputs: Vec<EdgeId>,
}

impl Graph {
    /// Create an empty graph.
    ///
    /// # Example
    /// ```no_run
    /// # use openrt::{Graph, OpAttrs, OpKind, TensorDesc, DType};
    /// # fn main() -> anyhow::Result<()> {
    /// let mut g = Graph::new();
    /// let x = g.add_input("x", TensorDesc::new(&[2, 4], DType::F32));
    /// let y = g.add_edge("y");
    /// g.add_node(OpKind::Relu, "relu", &[x], &[y], OpAttrs::none())?;
    /// g.mark_output(y)?;
    /// # Ok(()) }
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    fn push_edge(&mut self, name: String, role: EdgeRole, desc: Option<TensorDesc>) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(Edge {
            id,
            name,
            producer: None,
            consumers: Vec::new(),
            role,
            is_output: false,
            desc,
            data: None,
        }));
        id
    }

    pub fn add_input(&mut self, name: impl Into<String>, desc: TensorDesc) -> EdgeId {
        let id = self.push_edge(name.into(), EdgeRole::Input, Some(desc));
        self.inputs.push(id);
        id
    }

    /// Add a constant holding little-endian `bytes` in `NdArray` layout.
    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        desc: TensorDesc,
        bytes: Vec<u8>,
    ) -> Result<EdgeId> {
        let name = name.into();
        if desc.layout != DataLayout::NdArray {
            return Err(invalid(format!("constant {} must be ndarray", name)));
        }
        let expected = desc
            .bytes()
            .map_err(|err| invalid(format!("constant {}: {}", name, err)))?;
        if expected != bytes.len() {
            return Err(invalid(format!(
                "constant {} expects {} bytes, got {}",
                name,
                expected,
                bytes.len()
            )));
        }
        let id = self.push_edge(name, EdgeRole::Constant, Some(desc));
        if let Some(edge) = self.edges[id.0].as_mut() {
            edge.data = Some(Arc::new(bytes));
        }
        Ok(id)
    }

    /// Add an internal edge with no producer yet; a later `add_node` binds it.
    pub fn add_edge(&mut self, name: impl Into<String>) -> EdgeId {
        self.push_edge(name.into(), EdgeRole::Internal, None)
    }

    pub fn add_node(
        &mut self,
        kind: OpKind,
        name: impl Into<String>,
        inputs: &[EdgeId],
        outputs: &[EdgeId],
        attrs: OpAttrs,
    ) -> Result<NodeId> {
        let name = name.into();
        for edge in inputs {
            self.edge(*edge)?;
        }
        let mut seen = HashSet::new();
        for edge in outputs {
            let e = self.edge(*edge)?;
            if e.role != EdgeRole::Internal {
                return Err(invalid(format!(
                    "node {} cannot write {} edge {}",
                    name,
                    role_name(e.role),
                    e.name
                )));
            }
            if let Some(producer) = e.producer {
                return Err(invalid(format!(
                    "edge {} already produced by {}",
                    e.name, producer
                )));
            }
            if !seen.insert(*edge) || inputs.contains(edge) {
                return Err(invalid(format!(
                    "node {} would form a cycle through {}",
                    name, e.name
                )));
            }
        }
        // Outputs may already be consumed by earlier nodes; none of them may
        // feed this node's inputs.
        let downstream = self.downstream_of(
            outputs
                .iter()
                .filter_map(|e| self.edges[e.0].as_ref())
                .flat_map(|e| e.consumers.iter().copied()),
        );
        for edge in inputs {
            if let Some(producer) = self.edge(*edge)?.producer {
                if downstream.contains(&producer) {
                    return Err(invalid(format!("node {} would form a cycle", name)));
                }
            }
        }

        let id = NodeId(self.nodes.len());
        for edge in inputs {
            if let Some(e) = self.edges[edge.0].as_mut() {
                if !e.consumers.contains(&id) {
                    e.consumers.push(id);
                }
            }
        }
        for edge in outputs {
            if let Some(e) = self.edges[edge.0].as_mut() {
                e.producer = Some(id);
            }
        }
        self.nodes.push(Some(Node {
            id,
            uuid: Uuid::new_v4(),
            name,
            kind,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            attrs,
            forced_dtype: None,
        }));
        Ok(id)
    }

    pub fn mark_output(&mut self, edge: EdgeId) -> Result<()> {
        let e = self.edge_mut(edge)?;
        e.is_output = true;
        if !self.outputs.contains(&edge) {
            self.outputs.push(edge);
        }
        Ok(())
    }

    pub fn set_forced_dtype(&mut self, node: NodeId, dtype: DType) -> Result<()> {
        self.node_mut(node)?.forced_dtype = Some(dtype);
        Ok(())
    }

    pub fn set_attrs(&mut self, node: NodeId, attrs: OpAttrs) -> Result<()> {
        self.node_mut(node)?.attrs = attrs;
        Ok(())
    }

    pub fn set_desc(&mut self, edge: EdgeId, desc: TensorDesc) -> Result<()> {
        self.edge_mut(edge)?.desc = Some(desc);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or_else(|| invalid(format!("unknown node {}", id)))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or_else(|| invalid(format!("unknown node {}", id)))
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge> {
        self.edges
            .get(id.0)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| invalid(format!("unknown edge {}", id)))
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge> {
        self.edges
            .get_mut(id.0)
            .and_then(|e| e.as_mut())
            .ok_or_else(|| invalid(format!("unknown edge {}", id)))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|n| n.as_ref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter_map(|e| e.as_ref())
    }

    pub fn inputs(&self) -> &[EdgeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[EdgeId] {
        &self.outputs
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Upper bound on node ids, including removed slots.
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    pub fn find_edge(&self, name: &str) -> Option<EdgeId> {
        self.edges().find(|e| e.name == name).map(|e| e.id)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn describe_node(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        Ok(describe_node(node, |e| {
            self.edge(e)
                .map(|edge| edge.name.clone())
                .unwrap_or_else(|_| e.to_string())
        }))
    }

    /// Kahn's algorithm; ready nodes leave in id order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); self.nodes.len()];
        for node in self.nodes() {
            let mut producers = BTreeSet::new();
            for edge in &node.inputs {
                if let Some(producer) = self.edge(*edge)?.producer {
                    producers.insert(producer);
                }
            }
            indegree[node.id.0] = producers.len();
            for producer in producers {
                successors
                    .get_mut(producer.0)
                    .ok_or_else(|| invalid(format!("dangling producer {}", producer)))?
                    .insert(node.id);
            }
        }
        let mut ready: BinaryHeap<Reverse<NodeId>> = self
            .nodes()
            .filter(|n| indegree[n.id.0] == 0)
            .map(|n| Reverse(n.id))
            .collect();
        let mut order = Vec::with_capacity(self.node_count());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for next in &successors[id.0] {
                indegree[next.0] -= 1;
                if indegree[next.0] == 0 {
                    ready.push(Reverse(*next));
                }
            }
        }
        if order.len() != self.node_count() {
            return Err(invalid("graph contains a cycle"));
        }
        Ok(order)
    }

    /// Remove a node whose outputs are unused; its output edges go with it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let node = self.node(id)?;
        for edge in &node.outputs {
            let e = self.edge(*edge)?;
            if !e.consumers.is_empty() || e.is_output {
                return Err(invalid(format!(
                    "cannot remove {}: output {} is still in use",
                    id, e.name
                )));
            }
        }
        let node = self.nodes[id.0].take().ok_or_else(|| invalid(format!("unknown node {}", id)))?;
        for edge in &node.inputs {
            if let Some(e) = self.edges[edge.0].as_mut() {
                e.consumers.retain(|c| *c != id);
            }
        }
        for edge in &node.outputs {
            self.edges[edge.0] = None;
        }
        Ok(node)
    }

    /// Rewire `node` to read `new` wherever it read `old`.
    pub fn replace_edge(&mut self, node: NodeId, old: EdgeId, new: EdgeId) -> Result<()> {
        let n = self.node(node)?;
        if !n.inputs.contains(&old) {
            return Err(invalid(format!("{} does not consume {}", node, old)));
        }
        let new_edge = self.edge(new)?;
        if let Some(producer) = new_edge.producer {
            if producer == node || self.downstream_of([node]).contains(&producer) {
                return Err(invalid(format!(
                    "rewiring {} to {} would form a cycle",
                    node, new_edge.name
                )));
            }
        }
        if let Some(n) = self.nodes[node.0].as_mut() {
            for input in n.inputs.iter_mut() {
                if *input == old {
                    *input = new;
                }
            }
        }
        if let Some(e) = self.edges[old.0].as_mut() {
            e.consumers.retain(|c| *c != node);
        }
        if let Some(e) = self.edges[new.0].as_mut() {
            if !e.consumers.contains(&node) {
                e.consumers.push(node);
            }
        }
        Ok(())
    }

    /// Splice a single-input node between `edge` and `consumers`.
    ///
    /// The new output edge copies the descriptor of `edge`; callers refine it.
    pub fn insert_on_edge(
        &mut self,
        edge: EdgeId,
        consumers: &[NodeId],
        kind: OpKind,
        name: impl Into<String>,
        attrs: OpAttrs,
    ) -> Result<(NodeId, EdgeId)> {
        let e = self.edge(edge)?;
        for consumer in consumers {
            if !e.consumers.contains(consumer) {
                return Err(invalid(format!("{} does not consume {}", consumer, e.name)));
            }
        }
        let name = name.into();
        let desc = e.desc.clone();
        let out_name = format!("{}.{}", e.name, name);
        let out = self.push_edge(out_name, EdgeRole::Internal, desc);
        let node = match self.add_node(kind, name, &[edge], &[out], attrs) {
            Ok(node) => node,
            Err(err) => {
                // `out` is the newest edge and nothing refers to it yet.
                self.edges.pop();
                return Err(err);
            }
        };
        for consumer in consumers {
            self.replace_edge(*consumer, edge, out)?;
        }
        Ok((node, out))
    }

    /// Deliver graph output `old` through `new` instead; `new` takes its name.
    pub fn redirect_output(&mut self, old: EdgeId, new: EdgeId) -> Result<()> {
        if !self.edge(old)?.is_output {
            return Err(invalid(format!("{} is not a graph output", old)));
        }
        self.edge(new)?;
        let name = self.edge(old)?.name.clone();
        let old_edge = self.edge_mut(old)?;
        old_edge.is_output = false;
        old_edge.name = format!("{}.pre", name);
        let new_edge = self.edge_mut(new)?;
        new_edge.is_output = true;
        new_edge.name = name;
        for out in self.outputs.iter_mut() {
            if *out == old {
                *out = new;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for edge in self.edges() {
            if let Some(producer) = edge.producer {
                let node = self.node(producer).map_err(|_| {
                    invalid(format!("edge {} has dangling producer {}", edge.name, producer))
                })?;
                if !node.outputs.contains(&edge.id) {
                    return Err(invalid(format!(
                        "edge {} names {} as producer but is not among its outputs",
                        edge.name, producer
                    )));
                }
                if edge.role != EdgeRole::Internal {
                    return Err(invalid(format!(
                        "{} edge {} has a producer",
                        role_name(edge.role),
                        edge.name
                    )));
                }
            } else if edge.role == EdgeRole::Internal && (!edge.consumers.is_empty() || edge.is_output) {
                return Err(invalid(format!("edge {} is used but never produced", edge.name)));
            }
            for consumer in &edge.consumers {
                let node = self.node(*consumer).map_err(|_| {
                    invalid(format!("edge {} has dangling consumer {}", edge.name, consumer))
                })?;
                if !node.inputs.contains(&edge.id) {
                    return Err(invalid(format!(
                        "edge {} lists {} as consumer but it does not read it",
                        edge.name, consumer
                    )));
                }
            }
            if edge.role == EdgeRole::Constant && edge.data.is_none() {
                return Err(invalid(format!("constant {} has no payload", edge.name)));
            }
        }
        for node in self.nodes() {
            for edge in &node.inputs {
                self.edge(*edge).map_err(|_| {
                    invalid(format!("node {} reads dangling edge {}", node.name, edge))
                })?;
            }
            for edge in &node.outputs {
                let e = self.edge(*edge).map_err(|_| {
                    invalid(format!("node {} writes dangling edge {}", node.name, edge))
                })?;
                if e.producer != Some(node.id) {
                    return Err(invalid(format!(
                        "edge {} has two producers",
                        e.name
                    )));
                }
            }
        }
        if self.outputs.is_empty() {
            return Err(invalid("graph has no outputs"));
        }
        for edge in self.inputs.iter().chain(self.outputs.iter()) {
            self.edge(*edge)?;
        }
        self.topological_order()?;
        Ok(())
    }

    /// Nodes reachable from `start` (inclusive) following edges forward.
    pub fn downstream_of(&self, start: impl IntoIterator<Item = NodeId>) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = start.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Ok(node) = self.node(id) else { continue };
            for edge in &node.outputs {
                if let Ok(e) = self.edge(*edge) {
                    queue.extend(e.consumers.iter().copied());
                }
            }
        }
        seen
    }

    /// Nodes that read any of `edges`, directly or transitively.
    pub fn reachable_from_edges(&self, edges: &[EdgeId]) -> HashSet<NodeId> {
        let start: Vec<NodeId> = edges
            .iter()
            .filter_map(|e| self.edge(*e).ok())
            .flat_map(|e| e.consumers.iter().copied())
            .collect();
        self.downstream_of(start)
    }
}

fn role_name(role: EdgeRole) -> &'static str {
    match role {
        EdgeRole::Internal => "internal",
        EdgeRole::Input => "input",
        EdgeRole::Constant => "constant",
    }
}
