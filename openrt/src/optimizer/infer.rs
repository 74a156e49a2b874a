//! Type and shape inference over a topological order.
use anyhow::Result;

use crate::error::{attach_node, node_error, with_code, RetCode};
use crate::graph::{Graph, NodeId};
use crate::ops::{descriptor, TypeContext};
use crate::tensor::{checked_numel, DType, DataLayout, TensorDesc};

/// Element type of every edge, indexed by edge id. Nodes whose inputs are not
/// typed yet are deferred and revisited until nothing changes.
pub(crate) fn infer_types(graph: &Graph, order: &[NodeId]) -> Result<Vec<Option<DType>>> {
    let mut types = vec![None; graph.edge_capacity()];
    for edge in graph.edges() {
        types[edge.id.0] = edge.desc.as_ref().and_then(|d| d.dtype);
    }
    let mut pending = order.to_vec();
    while !pending.is_empty() {
        let mut deferred = Vec::new();
        for id in &pending {
            let node = graph.node(*id)?;
            let inputs: Vec<Option<DType>> = node.inputs.iter().map(|e| types[e.0]).collect();
            let ctx = TypeContext {
                node,
                inputs: &inputs,
            };
            let inferred = descriptor(node.kind)?
                .infer_type(&ctx)
                .map_err(|err| attach_node(err, *id, RetCode::InvalidValue))?;
            match inferred {
                Some(outputs) => {
                    for (edge, dtype) in node.outputs.iter().zip(outputs) {
                        types[edge.0] = Some(dtype);
                    }
                }
                None => deferred.push(*id),
            }
        }
        if deferred.len() == pending.len() {
            let id = deferred[0];
            return Err(node_error(
                RetCode::InvalidValue,
                id,
                format!("cannot resolve output type of {}", graph.describe_node(id)?),
            ));
        }
        pending = deferred;
    }
    Ok(types)
}

/// Output shapes of one node from the current input descriptors. Shapes
/// whose element count overflows are rejected.
pub(crate) fn node_shapes(graph: &Graph, id: NodeId) -> Result<Vec<Vec<usize>>> {
    let node = graph.node(id)?;
    let mut shapes = Vec::with_capacity(node.inputs.len());
    for edge in &node.inputs {
        let e = graph.edge(*edge)?;
        let shape = e
            .desc
            .as_ref()
            .ok_or_else(|| node_error(RetCode::InvalidValue, id, format!("{} has no shape", e.name)))?
            .shape()
            .map_err(|err| attach_node(with_code(err, RetCode::InvalidValue), id, RetCode::InvalidValue))?;
        shapes.push(shape);
    }
    let outputs = descriptor(node.kind)?
        .infer_shape(&node.attrs, &shapes)
        .map_err(|err| attach_node(err, id, RetCode::InvalidValue))?;
    for shape in &outputs {
        checked_numel(shape).map_err(|err| attach_node(err, id, RetCode::InvalidValue))?;
    }
    Ok(outputs)
}

/// Fill every output edge descriptor along `order`. Existing layouts are kept.
pub(crate) fn infer_shapes(graph: &mut Graph, order: &[NodeId], types: &[Option<DType>]) -> Result<()> {
    for id in order {
        let shapes = node_shapes(graph, *id)?;
        let outputs = graph.node(*id)?.outputs.clone();
        for (edge, shape) in outputs.iter().zip(shapes) {
            let dtype = types.get(edge.0).copied().flatten().ok_or_else(|| {
                node_error(RetCode::InvalidValue, *id, format!("output {} is untyped", edge))
            })?;
            let layout = graph
                .edge(*edge)?
                .desc
                .as_ref()
                .map(|d| d.layout)
                .unwrap_or(DataLayout::NdArray);
            graph.set_desc(*edge, TensorDesc::new(&shape, dtype).with_layout(layout))?;
        }
    }
    Ok(())
}
