//! Layout conversions the partitioned graph still needs.
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::engine::Engine;
use crate::error::{node_error, RetCode};
use crate::graph::{AttrValue, EdgeId, Graph, NodeId, OpAttrs, OpKind};
use crate::tensor::DataLayout;

use super::opt_node::{apply_layouts, opt_of, place_on, set_opt, OptNode};

fn reorder_attrs(layout: DataLayout) -> OpAttrs {
    OpAttrs::none().with("layout", AttrValue::Layout(layout))
}

fn place_reorder(
    graph: &mut Graph,
    opt: &mut Vec<Option<OptNode>>,
    engines: &[Arc<dyn Engine>],
    node: NodeId,
    out: EdgeId,
    engine: usize,
    layout: DataLayout,
) -> Result<()> {
    if let Some(desc) = graph.edge_mut(out)?.desc.as_mut() {
        desc.layout = layout;
    }
    let placed = place_on(graph, node, engine, engines, opt, false)?.ok_or_else(|| {
        node_error(
            RetCode::Unsupported,
            node,
            format!("{} cannot convert to {}", engines[engine].name(), layout),
        )
    })?;
    apply_layouts(graph, &placed)?;
    set_opt(opt, node, placed);
    Ok(())
}

/// Insert a `Reorder` wherever a node reads an edge in a layout other than
/// the one it selected. Runs on the consumer's engine; consumers that need
/// the same (edge, engine, layout) share one conversion.
pub(crate) fn insert_reorders(
    graph: &mut Graph,
    opt: &mut Vec<Option<OptNode>>,
    engines: &[Arc<dyn Engine>],
) -> Result<usize> {
    let mut needed: BTreeMap<(EdgeId, usize, DataLayout), Vec<NodeId>> = BTreeMap::new();
    for node in graph.nodes() {
        let Some(placed) = opt_of(opt, node.id) else {
            continue;
        };
        for (edge, want) in node.inputs.iter().zip(&placed.input_layouts) {
            let have = graph.edge(*edge)?.desc.as_ref().map(|d| d.layout);
            if have != Some(*want) {
                let consumers = needed.entry((*edge, placed.engine, *want)).or_default();
                if !consumers.contains(&node.id) {
                    consumers.push(node.id);
                }
            }
        }
    }
    let inserted = needed.len();
    for ((edge, engine, layout), consumers) in needed {
        let name = format!("to_{}", layout);
        let (node, out) =
            graph.insert_on_edge(edge, &consumers, OpKind::Reorder, name, reorder_attrs(layout))?;
        place_reorder(graph, opt, engines, node, out, engine, layout)?;
        crate::trace!(
            "reorder: {} -> {} on {}",
            graph.edge(edge)?.name,
            layout,
            engines[engine].name()
        );
    }
    Ok(inserted)
}

/// Graph outputs leave in `NdArray`; blocked results get a final conversion
/// on their producer's engine.
pub(crate) fn convert_outputs(
    graph: &mut Graph,
    opt: &mut Vec<Option<OptNode>>,
    engines: &[Arc<dyn Engine>],
) -> Result<usize> {
    let mut inserted = 0;
    for edge in graph.outputs().to_vec() {
        let e = graph.edge(edge)?;
        let blocked = e.desc.as_ref().is_some_and(|d| d.layout.is_blocked());
        let engine = e.producer.and_then(|p| opt_of(opt, p)).map(|o| o.engine);
        let (true, Some(engine)) = (blocked, engine) else {
            continue;
        };
        let (node, out) = graph.insert_on_edge(
            edge,
            &[],
            OpKind::Reorder,
            "to_ndarray",
            reorder_attrs(DataLayout::NdArray),
        )?;
        graph.redirect_output(edge, out)?;
        place_reorder(graph, opt, engines, node, out, engine, DataLayout::NdArray)?;
        inserted += 1;
    }
    Ok(inserted)
}
