use std::sync::Arc;

use anyhow::Result;

use crate::engine::Engine;
use crate::error::{rt_error, with_code, RetCode};
use crate::graph::{Graph, NodeId};
use crate::ops::{descriptor, LayoutContext};
use crate::registry::{op_def, KernelEntry};
use crate::tensor::{DType, DataLayout};

/// Optimization state of one node: where it runs and how.
#[derive(Debug, Clone)]
pub struct OptNode {
    pub node: NodeId,
    /// Index into the plan's engine list.
    pub engine: usize,
    /// Element type of the outputs.
    pub dtype: DType,
    pub input_layouts: Vec<DataLayout>,
    pub output_layouts: Vec<DataLayout>,
    pub kernel: KernelEntry,
    /// Operator may write over its first input if the planner allows it.
    pub inplace: bool,
}

pub(crate) fn opt_of(opt: &[Option<OptNode>], id: NodeId) -> Option<&OptNode> {
    opt.get(id.0).and_then(|o| o.as_ref())
}

pub(crate) fn set_opt(opt: &mut Vec<Option<OptNode>>, id: NodeId, node: OptNode) {
    if opt.len() <= id.0 {
        opt.resize(id.0 + 1, None);
    }
    opt[id.0] = Some(node);
}

/// Operand facts layout selection needs, read off the node's edges.
pub(crate) struct Operands {
    pub dtypes: Vec<DType>,
    pub shapes: Vec<Vec<usize>>,
    pub layouts: Vec<DataLayout>,
    pub output_shapes: Vec<Vec<usize>>,
    pub output_dtype: DType,
    pub producer_layout: Option<DataLayout>,
}

impl Operands {
    pub(crate) fn read(graph: &Graph, id: NodeId, opt: &[Option<OptNode>]) -> Result<Self> {
        let node = graph.node(id)?;
        let mut dtypes = Vec::with_capacity(node.inputs.len());
        let mut shapes = Vec::with_capacity(node.inputs.len());
        let mut layouts = Vec::with_capacity(node.inputs.len());
        let mut producer_layout = None;
        for edge in &node.inputs {
            let e = graph.edge(*edge)?;
            let desc = e.desc.as_ref().ok_or_else(|| {
                rt_error(RetCode::InvalidValue, format!("edge {} has no descriptor", e.name))
            })?;
            dtypes.push(desc.dtype().map_err(|err| with_code(err, RetCode::InvalidValue))?);
            shapes.push(desc.shape().map_err(|err| with_code(err, RetCode::InvalidValue))?);
            layouts.push(desc.layout);
            let placed = e.producer.is_some_and(|p| opt_of(opt, p).is_some());
            if placed && producer_layout.is_none() {
                producer_layout = Some(desc.layout);
            }
        }
        let mut output_shapes = Vec::with_capacity(node.outputs.len());
        let mut output_dtype = None;
        for edge in &node.outputs {
            let desc = graph.edge(*edge)?.desc.clone().ok_or_else(|| {
                rt_error(RetCode::InvalidValue, format!("output of {} has no descriptor", id))
            })?;
            output_shapes.push(desc.shape().map_err(|err| with_code(err, RetCode::InvalidValue))?);
            output_dtype = output_dtype.or(desc.dtype);
        }
        let output_dtype = output_dtype
            .or_else(|| dtypes.first().copied())
            .ok_or_else(|| rt_error(RetCode::InvalidValue, format!("{} has no typed operands", id)))?;
        Ok(Self {
            dtypes,
            shapes,
            layouts,
            output_shapes,
            output_dtype,
            producer_layout,
        })
    }
}

/// Try to host node `id` on `engines[engine]`. `None` when the engine has no
/// kernel for any legal layout.
pub(crate) fn place_on(
    graph: &Graph,
    id: NodeId,
    engine: usize,
    engines: &[Arc<dyn Engine>],
    opt: &[Option<OptNode>],
    allow_inplace: bool,
) -> Result<Option<OptNode>> {
    let node = graph.node(id)?;
    let Some(target) = engines.get(engine) else {
        return Ok(None);
    };
    let operands = Operands::read(graph, id, opt)?;
    let Some(dtype) = operands.dtypes.first().copied() else {
        return Ok(None);
    };
    if !target.supports(node.kind, dtype) {
        return Ok(None);
    }
    let desc = descriptor(node.kind)?;
    let ctx = LayoutContext {
        node,
        input_dtypes: &operands.dtypes,
        input_shapes: &operands.shapes,
        output_shapes: &operands.output_shapes,
        input_layouts: &operands.layouts,
        producer_layout: operands.producer_layout,
        engine: target.as_ref(),
    };
    let Some(choice) = desc.select_layout(&ctx) else {
        return Ok(None);
    };
    let Some(kernel) = target.registry().lookup(&choice.kernel).cloned() else {
        return Ok(None);
    };
    Ok(Some(OptNode {
        node: id,
        engine,
        dtype: operands.output_dtype,
        input_layouts: choice.inputs,
        output_layouts: choice.outputs,
        kernel,
        inplace: allow_inplace && op_def(node.kind)?.supports_inplace,
    }))
}

/// Record the chosen output layouts on the node's output edges.
pub(crate) fn apply_layouts(graph: &mut Graph, placed: &OptNode) -> Result<()> {
    let outputs = graph.node(placed.node)?.outputs.clone();
    for (edge, layout) in outputs.iter().zip(&placed.output_layouts) {
        if let Some(desc) = graph.edge_mut(*edge)?.desc.as_mut() {
            desc.layout = *layout;
        }
    }
    Ok(())
}
