use std::sync::Arc;

use anyhow::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::CompileOptions;
use crate::engine::Engine;
use crate::error::{rt_error, with_code, RetCode};
use crate::graph::{EdgeRole, Graph, NodeId, OpAttrs};
use crate::optimizer::{opt_of, optimize, OptNode};
use crate::planner::{plan_memory, MemoryPlan};

use super::arena::Arena;
use super::state::{PlanStats, RunState};
use super::trace::TraceEvent;

/// A compiled graph bound to its engines, with its own arena.
///
/// ```no_run
/// # use std::collections::HashMap;
/// # use openrt::{compile, engines, CompileOptions, DType, Graph, OpAttrs, OpKind, TensorDesc};
/// # fn main() -> anyhow::Result<()> {
/// let mut g = Graph::new();
/// let x = g.add_input("x", TensorDesc::new(&[4], DType::F32));
/// let y = g.add_edge("y");
/// g.add_node(OpKind::Relu, "relu", &[x], &[y], OpAttrs::none())?;
/// g.mark_output(y)?;
/// let mut plan = compile(&g, &[engines::x86()], CompileOptions::default())?;
/// let mut inputs = HashMap::new();
/// inputs.insert("x".to_string(), vec![-1.0f32, 0.5, 2.0, -3.0].into());
/// let outputs = plan.run(&inputs)?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub(crate) source: Graph,
    pub(crate) graph: Graph,
    pub(crate) opt: Vec<Option<OptNode>>,
    pub(crate) order: Vec<NodeId>,
    pub(crate) memory: MemoryPlan,
    pub(crate) arena: Arena,
    pub(crate) engines: Vec<Arc<dyn Engine>>,
    pub(crate) options: CompileOptions,
    pub(crate) pool: Arc<ThreadPool>,
    pub(crate) attrs: Vec<Option<Arc<OpAttrs>>>,
    pub(crate) state: RunState,
    pub(crate) stats: PlanStats,
    pub(crate) trace: Vec<TraceEvent>,
    /// Ticket of the current or last run.
    pub(crate) ticket: u64,
}

/// Optimize `graph` for `engines` (list order is priority) and build a plan.
/// The caller's graph is never modified.
pub fn compile(
    graph: &Graph,
    engines: &[Arc<dyn Engine>],
    options: CompileOptions,
) -> Result<ExecutionPlan> {
    options
        .validate()
        .map_err(|err| with_code(err, RetCode::InvalidValue))?;
    let optimized = optimize(graph, engines, &options)?;
    assemble(
        graph.clone(),
        optimized.graph,
        optimized.opt,
        optimized.order,
        engines.to_vec(),
        options,
    )
}

/// Memory plan, arena, constants and thread pool around an optimized graph.
pub(crate) fn assemble(
    source: Graph,
    graph: Graph,
    opt: Vec<Option<OptNode>>,
    order: Vec<NodeId>,
    engines: Vec<Arc<dyn Engine>>,
    options: CompileOptions,
) -> Result<ExecutionPlan> {
    for id in &order {
        if opt_of(&opt, *id).is_none() {
            return Err(rt_error(
                RetCode::InvalidGraph,
                format!("node {} has no kernel assignment", id),
            ));
        }
    }
    let memory = plan_memory(&graph, &order, &opt, &engines, options.alignment)?;
    memory.verify(&graph)?;
    let mut arena = Arena::new(memory.total, options.alignment)?;
    load_constants(&graph, &memory, &mut arena)?;

    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("openrt-{}", i));
    if let Some(threads) = options.resolved_threads() {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|err| rt_error(RetCode::RuntimeError, format!("thread pool: {}", err)))?;

    let attrs = node_attrs(&graph);
    crate::trace!(
        "plan: {} nodes, arena {} bytes, {} engines",
        order.len(),
        memory.total,
        engines.len()
    );
    Ok(ExecutionPlan {
        source,
        graph,
        opt,
        order,
        memory,
        arena,
        engines,
        options,
        pool: Arc::new(pool),
        attrs,
        state: RunState::Planned,
        stats: PlanStats::default(),
        trace: Vec::new(),
        ticket: 0,
    })
}

pub(crate) fn node_attrs(graph: &Graph) -> Vec<Option<Arc<OpAttrs>>> {
    let mut attrs = vec![None; graph.node_capacity()];
    for node in graph.nodes() {
        attrs[node.id.0] = Some(Arc::new(node.attrs.clone()));
    }
    attrs
}

pub(crate) fn load_constants(graph: &Graph, memory: &MemoryPlan, arena: &mut Arena) -> Result<()> {
    for edge in graph.edges().filter(|e| e.role == EdgeRole::Constant) {
        let data = edge.data.as_ref().ok_or_else(|| {
            rt_error(RetCode::InvalidGraph, format!("constant {} has no payload", edge.name))
        })?;
        arena.write(memory.slot(edge.id)?.offset, data)?;
    }
    Ok(())
}

impl ExecutionPlan {
    /// Optimized graph, conversions and transfers included.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Graph the plan was compiled from; rebuilds start here.
    pub fn source(&self) -> &Graph {
        &self.source
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn opt_node(&self, id: NodeId) -> Option<&OptNode> {
        opt_of(&self.opt, id)
    }

    pub fn memory(&self) -> &MemoryPlan {
        &self.memory
    }

    pub fn engines(&self) -> &[Arc<dyn Engine>] {
        &self.engines
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stats(&self) -> PlanStats {
        self.stats
    }

    /// Events of the last run; empty unless the `trace` option is on.
    pub fn trace_events(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Name of the engine `id` runs on.
    pub fn engine_of(&self, id: NodeId) -> Option<&str> {
        self.opt_node(id)
            .and_then(|o| self.engines.get(o.engine))
            .map(|e| e.name())
    }
}
