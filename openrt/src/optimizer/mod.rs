//! Compile pipeline: check, infer types and shapes, partition, pick layouts
//! and kernels, then splice in transfers and conversions.
use std::sync::Arc;

use anyhow::Result;

use crate::config::CompileOptions;
use crate::engine::Engine;
use crate::error::{attach_node, RetCode};
use crate::graph::{Graph, NodeId};
use crate::registry::check_node;

mod infer;
mod layout;
mod opt_node;
mod partition;

pub(crate) use infer::node_shapes;
pub use opt_node::OptNode;
pub(crate) use opt_node::{opt_of, Operands};
pub use partition::{AffinityPolicy, PartitionContext, PartitionPolicy, PriorityPolicy};

/// Result of [`optimize`]: the rewritten graph, one [`OptNode`] per node
/// (indexed by node id) and the execution order.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub graph: Graph,
    pub opt: Vec<Option<OptNode>>,
    pub order: Vec<NodeId>,
    pub transfers: usize,
    pub reorders: usize,
}

/// Run the full optimization pass on a copy of `source`.
pub fn optimize(
    source: &Graph,
    engines: &[Arc<dyn Engine>],
    options: &CompileOptions,
) -> Result<Optimized> {
    if engines.is_empty() {
        crate::bail_rc!(Unsupported, "no engines registered");
    }
    source.validate()?;
    let mut graph = source.clone();
    for node in graph.nodes() {
        check_node(node).map_err(|err| attach_node(err, node.id, RetCode::InvalidGraph))?;
    }

    let order = graph.topological_order()?;
    crate::phase!("optimize: {} nodes on {} engines", order.len(), engines.len());
    let types = infer::infer_types(&graph, &order)?;
    infer::infer_shapes(&mut graph, &order, &types)?;

    let policy = options.partition_policy();
    crate::phase!("partition: policy {}", policy.name());
    let mut opt: Vec<Option<OptNode>> = vec![None; graph.node_capacity()];
    for id in &order {
        let placed = partition::assign(&graph, *id, engines, policy.as_ref(), &opt, options.inplace)?;
        opt_node::apply_layouts(&mut graph, &placed)?;
        opt[id.0] = Some(placed);
    }

    let transfers = partition::insert_transfers(&mut graph, &mut opt, engines)?;
    let mut reorders = layout::insert_reorders(&mut graph, &mut opt, engines)?;
    reorders += layout::convert_outputs(&mut graph, &mut opt, engines)?;
    let order = graph.topological_order()?;
    crate::phase!(
        "optimize: {} nodes after {} transfers and {} reorders",
        order.len(),
        transfers,
        reorders
    );
    Ok(Optimized {
        graph,
        opt,
        order,
        transfers,
        reorders,
    })
}
