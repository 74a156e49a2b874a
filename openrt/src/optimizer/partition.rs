//! Engine assignment and cross-engine transfers.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::engine::Engine;
use crate::error::{node_error, RetCode};
use crate::graph::{EdgeId, Graph, Node, NodeId, OpAttrs, OpKind};

use super::opt_node::{apply_layouts, opt_of, place_on, set_opt, OptNode};

/// What a policy sees when ordering engines for one node.
pub struct PartitionContext<'a> {
    pub graph: &'a Graph,
    pub node: &'a Node,
    pub engines: &'a [Arc<dyn Engine>],
    placed: &'a [Option<OptNode>],
}

impl<'a> PartitionContext<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        node: &'a Node,
        engines: &'a [Arc<dyn Engine>],
        placed: &'a [Option<OptNode>],
    ) -> Self {
        Self {
            graph,
            node,
            engines,
            placed,
        }
    }

    /// Engine index already chosen for `node`.
    pub fn engine_of(&self, node: NodeId) -> Option<usize> {
        opt_of(self.placed, node).map(|o| o.engine)
    }

    /// Engine hosting the producer of the node's first produced input.
    pub fn first_producer_engine(&self) -> Option<usize> {
        self.node.inputs.iter().find_map(|edge| {
            let producer = self.graph.edge(*edge).ok()?.producer?;
            self.engine_of(producer)
        })
    }
}

/// Order in which engines are offered a node. The first engine with a
/// kernel for the node's type and shape wins.
pub trait PartitionPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn candidates(&self, ctx: &PartitionContext) -> Vec<usize>;
}

impl fmt::Debug for dyn PartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionPolicy({})", self.name())
    }
}

/// Registration order is priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityPolicy;

impl PartitionPolicy for PriorityPolicy {
    fn name(&self) -> &str {
        "priority"
    }

    fn candidates(&self, ctx: &PartitionContext) -> Vec<usize> {
        (0..ctx.engines.len()).collect()
    }
}

/// Stay on the engine of the first producer, then fall back to priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffinityPolicy;

impl PartitionPolicy for AffinityPolicy {
    fn name(&self) -> &str {
        "affinity"
    }

    fn candidates(&self, ctx: &PartitionContext) -> Vec<usize> {
        let first = ctx.first_producer_engine();
        first
            .into_iter()
            .chain((0..ctx.engines.len()).filter(|i| Some(*i) != first))
            .collect()
    }
}

/// Place `id` on the first engine the policy offers that can run it.
pub(crate) fn assign(
    graph: &Graph,
    id: NodeId,
    engines: &[Arc<dyn Engine>],
    policy: &dyn PartitionPolicy,
    opt: &[Option<OptNode>],
    inplace: bool,
) -> Result<OptNode> {
    let node = graph.node(id)?;
    let ctx = PartitionContext::new(graph, node, engines, opt);
    for engine in policy.candidates(&ctx) {
        if let Some(placed) = place_on(graph, id, engine, engines, opt, inplace)? {
            crate::trace!(
                "partition: {} -> {} [{}]",
                graph.describe_node(id)?,
                engines[engine].name(),
                placed.kernel.id
            );
            return Ok(placed);
        }
    }
    let names: Vec<&str> = engines.iter().map(|e| e.name()).collect();
    Err(node_error(
        RetCode::Unsupported,
        id,
        format!(
            "no engine among [{}] can run {}",
            names.join(", "),
            graph.describe_node(id)?
        ),
    ))
}

/// One `Transfer` per (edge, destination engine) where producer and consumer
/// engines differ. Consumers on the same engine share it.
pub(crate) fn insert_transfers(
    graph: &mut Graph,
    opt: &mut Vec<Option<OptNode>>,
    engines: &[Arc<dyn Engine>],
) -> Result<usize> {
    let produced: Vec<EdgeId> = graph
        .edges()
        .filter(|e| e.producer.is_some())
        .map(|e| e.id)
        .collect();
    let mut inserted = 0;
    for edge in produced {
        let e = graph.edge(edge)?;
        let Some(src) = e.producer.and_then(|p| opt_of(opt, p)).map(|o| o.engine) else {
            continue;
        };
        let mut by_engine: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for consumer in &e.consumers {
            if let Some(dst) = opt_of(opt, *consumer).map(|o| o.engine) {
                if dst != src {
                    by_engine.entry(dst).or_default().push(*consumer);
                }
            }
        }
        for (dst, consumers) in by_engine {
            let name = format!("to_{}", engines[dst].name());
            let (node, _) =
                graph.insert_on_edge(edge, &consumers, OpKind::Transfer, name, OpAttrs::none())?;
            let placed = place_on(graph, node, dst, engines, opt, false)?.ok_or_else(|| {
                node_error(
                    RetCode::Unsupported,
                    node,
                    format!("{} cannot receive transfers", engines[dst].name()),
                )
            })?;
            apply_layouts(graph, &placed)?;
            crate::trace!(
                "transfer: {} {} -> {}",
                graph.edge(edge)?.name,
                engines[src].name(),
                engines[dst].name()
            );
            set_opt(opt, node, placed);
            inserted += 1;
        }
    }
    Ok(inserted)
}
