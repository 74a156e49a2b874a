//! Nodes the optimizer inserts on its own.
use anyhow::Result;

use crate::graph::{OpAttrs, OpKind};
use crate::tensor::DataLayout;

use super::{LayoutContext, OpDescriptor};

/// Converts its input into the `layout` attribute's layout.
pub struct Reorder;

impl Reorder {
    fn target(ctx: &LayoutContext) -> Option<DataLayout> {
        ctx.node.attrs.layout("layout").ok().flatten()
    }
}

impl OpDescriptor for Reorder {
    fn kind(&self) -> OpKind {
        OpKind::Reorder
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        Ok(vec![inputs[0].clone()])
    }

    fn candidates(&self, ctx: &LayoutContext) -> Vec<DataLayout> {
        Self::target(ctx).into_iter().collect()
    }

    fn layouts_for(
        &self,
        ctx: &LayoutContext,
        layout: DataLayout,
    ) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
        let source = *ctx.input_layouts.first()?;
        let rank = ctx.input_shapes[0].len();
        if !layout.supports_rank(rank) || !source.supports_rank(rank) {
            return None;
        }
        Some((vec![source], vec![layout]))
    }
}

/// Moves a tensor to the consuming engine; the layout is unchanged.
pub struct Transfer;

impl OpDescriptor for Transfer {
    fn kind(&self) -> OpKind {
        OpKind::Transfer
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        Ok(vec![inputs[0].clone()])
    }

    fn candidates(&self, ctx: &LayoutContext) -> Vec<DataLayout> {
        ctx.input_layouts.first().copied().into_iter().collect()
    }

    fn layouts_for(
        &self,
        _ctx: &LayoutContext,
        layout: DataLayout,
    ) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
        Some((vec![layout], vec![layout]))
    }
}
