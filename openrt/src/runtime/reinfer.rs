//! Shape changes between runs.
//!
//! New input shapes flow through the nodes downstream of the changed inputs
//! only. Each node keeps its engine and layouts when they stay legal and a
//! kernel exists for the new shape class; otherwise the plan is rebuilt from
//! the source graph. Buffers that outgrow their slots trigger a new memory
//! plan and arena.
use anyhow::Result;

use crate::error::{rt_error, RetCode};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::ops::{descriptor, LayoutContext};
use crate::optimizer::{node_shapes, opt_of, Operands};
use crate::planner::plan_memory;
use crate::registry::KernelEntry;
use crate::tensor::{DataLayout, TensorDesc};

use super::arena::Arena;
use super::plan::{compile, load_constants, ExecutionPlan};

enum Recheck {
    Same,
    Kernel(KernelEntry),
    Rebuild(String),
}

fn resize(graph: &mut Graph, edge: EdgeId, shape: &[usize]) -> Result<()> {
    let e = graph.edge(edge)?;
    let desc = e
        .desc
        .as_ref()
        .ok_or_else(|| rt_error(RetCode::InvalidValue, format!("{} has no descriptor", e.name)))?;
    let resized = TensorDesc::new(shape, desc.dtype()?).with_layout(desc.layout);
    graph.set_desc(edge, resized)
}

impl ExecutionPlan {
    /// Nothing on `self` changes unless the new shapes are accepted, so a
    /// rejected run leaves the plan as it was.
    pub(crate) fn reshape(&mut self, changed: &[(EdgeId, Vec<usize>)]) -> Result<()> {
        let mut source = self.source.clone();
        let mut graph = self.graph.clone();
        for (edge, shape) in changed {
            resize(&mut source, *edge, shape)?;
            resize(&mut graph, *edge, shape)?;
        }
        let edges: Vec<EdgeId> = changed.iter().map(|(e, _)| *e).collect();
        let affected = graph.reachable_from_edges(&edges);

        let mut opt = self.opt.clone();
        for id in self.order.iter().filter(|id| affected.contains(id)) {
            match self.recheck(&mut graph, *id)? {
                Recheck::Same => {}
                Recheck::Kernel(kernel) => {
                    if let Some(Some(placed)) = opt.get_mut(id.0) {
                        crate::trace!("reshape: {} now uses {}", id, kernel.id);
                        placed.kernel = kernel;
                    }
                }
                Recheck::Rebuild(reason) => {
                    crate::trace!("reshape: rebuilding plan, {}", reason);
                    return self.rebuild(source);
                }
            }
        }

        let mut memory = self.memory.clone();
        let replan = !memory.absorb(&graph)?;
        let arena = if replan {
            memory = plan_memory(&graph, &self.order, &opt, &self.engines, self.options.alignment)?;
            memory.verify(&graph)?;
            let mut arena = Arena::new(memory.total, self.options.alignment)?;
            load_constants(&graph, &memory, &mut arena)?;
            crate::trace!("reshape: arena {} -> {} bytes", self.memory.total, memory.total);
            Some(arena)
        } else {
            None
        };

        self.source = source;
        self.graph = graph;
        self.opt = opt;
        self.memory = memory;
        if let Some(arena) = arena {
            self.arena = arena;
            self.stats.memory_replans += 1;
        }
        self.stats.reinferences += 1;
        Ok(())
    }

    /// Refresh the output shapes of `id` and check its placement still holds.
    fn recheck(&self, graph: &mut Graph, id: NodeId) -> Result<Recheck> {
        let shapes = node_shapes(graph, id)?;
        let outputs = graph.node(id)?.outputs.clone();
        for (edge, shape) in outputs.iter().zip(&shapes) {
            resize(graph, *edge, shape)?;
        }
        let Some(placed) = opt_of(&self.opt, id) else {
            return Ok(Recheck::Rebuild(format!("{} has no placement", id)));
        };
        let Some(engine) = self.engines.get(placed.engine) else {
            return Ok(Recheck::Rebuild(format!("{} has no engine", id)));
        };
        let node = graph.node(id)?;
        let operands = Operands::read(graph, id, &self.opt)?;
        let ctx = LayoutContext {
            node,
            input_dtypes: &operands.dtypes,
            input_shapes: &operands.shapes,
            output_shapes: &operands.output_shapes,
            input_layouts: &operands.layouts,
            producer_layout: operands.producer_layout,
            engine: engine.as_ref(),
        };
        let desc = descriptor(node.kind)?;
        let layout = placed
            .output_layouts
            .first()
            .copied()
            .unwrap_or(DataLayout::NdArray);
        let expected = (placed.input_layouts.clone(), placed.output_layouts.clone());
        if desc.layouts_for(&ctx, layout) != Some(expected) {
            return Ok(Recheck::Rebuild(format!(
                "{} cannot stay in {}",
                graph.describe_node(id)?,
                layout
            )));
        }
        let Some(dtype) = operands.dtypes.first().copied() else {
            return Ok(Recheck::Same);
        };
        let key = desc.kernel_key(dtype, layout, &operands.shapes);
        match engine.registry().lookup(&key) {
            None => Ok(Recheck::Rebuild(format!("{} has no kernel {}", engine.name(), key))),
            Some(entry) if entry.id != placed.kernel.id => Ok(Recheck::Kernel(entry.clone())),
            Some(_) => Ok(Recheck::Same),
        }
    }

    fn rebuild(&mut self, source: Graph) -> Result<()> {
        let mut plan = compile(&source, &self.engines, self.options.clone())?;
        plan.stats = self.stats;
        plan.stats.repartitions += 1;
        plan.state = self.state;
        plan.ticket = self.ticket;
        *self = plan;
        Ok(())
    }
}
