use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::engine::Engine;
use crate::graph::{Graph, NodeId};
use crate::optimizer::{opt_of, OptNode};

/// Inclusive range of topological positions during which an edge holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lifetime {
    pub first: usize,
    pub last: usize,
}

impl Lifetime {
    pub fn overlaps(&self, other: &Lifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Positions at which the executor waits for each engine: a node reading an
/// edge produced on that engine from a different engine.
pub(crate) fn join_points(
    graph: &Graph,
    order: &[NodeId],
    opt: &[Option<OptNode>],
    engines: &[Arc<dyn Engine>],
) -> Result<Vec<Vec<usize>>> {
    let mut joins = vec![Vec::new(); engines.len()];
    for (pos, id) in order.iter().enumerate() {
        let Some(here) = opt_of(opt, *id).map(|o| o.engine) else {
            continue;
        };
        for edge in &graph.node(*id)?.inputs {
            let Some(src) = graph
                .edge(*edge)?
                .producer
                .and_then(|p| opt_of(opt, p))
                .map(|o| o.engine)
            else {
                continue;
            };
            let is_async = engines.get(src).is_some_and(|e| e.is_async());
            if src != here && is_async && joins[src].last() != Some(&pos) {
                joins[src].push(pos);
            }
        }
    }
    Ok(joins)
}

/// Lifetime of every edge, indexed by edge id.
///
/// Inputs and constants start at 0, outputs end at the last position. An edge
/// touched by a node on an asynchronous engine stays live until that engine's
/// next join point, because the queued kernel may still be using it.
pub(crate) fn lifetimes(
    graph: &Graph,
    order: &[NodeId],
    opt: &[Option<OptNode>],
    engines: &[Arc<dyn Engine>],
) -> Result<Vec<Option<Lifetime>>> {
    let end = order.len().saturating_sub(1);
    let mut position = vec![usize::MAX; graph.node_capacity()];
    for (pos, id) in order.iter().enumerate() {
        position[id.0] = pos;
    }
    let joins = join_points(graph, order, opt, engines)?;
    // Last position a buffer used by node `id` at `pos` must survive.
    let hold = |id: NodeId, pos: usize| -> usize {
        let engine = opt_of(opt, id).map(|o| o.engine);
        match engine {
            Some(e) if engines.get(e).is_some_and(|e| e.is_async()) => joins[e]
                .iter()
                .copied()
                .find(|j| *j > pos)
                .unwrap_or(end),
            _ => pos,
        }
    };
    let mut out = vec![None; graph.edge_capacity()];
    for edge in graph.edges() {
        let (first, mut last) = match edge.producer {
            Some(p) => (position[p.0], hold(p, position[p.0])),
            None => (0, 0),
        };
        for consumer in &edge.consumers {
            last = last.max(hold(*consumer, position[consumer.0]));
        }
        if edge.is_output {
            last = end;
        }
        out[edge.id.0] = Some(Lifetime { first, last });
    }
    Ok(out)
}
