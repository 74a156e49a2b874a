//! Per-operator inference hooks.
//!
//! One [`OpDescriptor`] per [`OpKind`] answers three questions for the
//! optimizer: which element types come out, which shapes come out, and which
//! layouts the node should run in on a given engine.
use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::engine::Engine;
use crate::error::{rt_error, RetCode};
use crate::graph::{Node, OpAttrs, OpKind};
use crate::registry::{op_def, KernelKey, ShapeClass};
use crate::tensor::{DType, DataLayout};

mod elementwise;
mod internal;
mod movement;
mod norm;

pub use norm::LayerNormOperands;

pub struct TypeContext<'a> {
    pub node: &'a Node,
    /// `None` for inputs whose type is not known yet.
    pub inputs: &'a [Option<DType>],
}

pub struct LayoutContext<'a> {
    pub node: &'a Node,
    pub input_dtypes: &'a [DType],
    pub input_shapes: &'a [Vec<usize>],
    pub output_shapes: &'a [Vec<usize>],
    /// Layouts the input edges currently hold.
    pub input_layouts: &'a [DataLayout],
    /// Layout of the first input that comes from an already placed node.
    pub producer_layout: Option<DataLayout>,
    pub engine: &'a dyn Engine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutChoice {
    pub inputs: Vec<DataLayout>,
    pub outputs: Vec<DataLayout>,
    pub kernel: KernelKey,
}

pub trait OpDescriptor: Send + Sync {
    fn kind(&self) -> OpKind;

    /// Output element types, or `None` to defer until all inputs are typed.
    fn infer_type(&self, ctx: &TypeContext) -> Result<Option<Vec<DType>>> {
        same_as_input(self.kind(), ctx)
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>>;

    /// Operand layouts when the node runs in `layout`; `None` if illegal.
    fn layouts_for(
        &self,
        ctx: &LayoutContext,
        layout: DataLayout,
    ) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
        uniform_layouts(self.kind(), ctx, layout)
    }

    /// Candidate order: producer's layout, then the engine's preferences.
    fn candidates(&self, ctx: &LayoutContext) -> Vec<DataLayout> {
        let mut out = Vec::new();
        let preferred = ctx.engine.layout_preference();
        for layout in ctx
            .producer_layout
            .into_iter()
            .chain(preferred.iter().copied())
            .chain(std::iter::once(DataLayout::NdArray))
        {
            if !out.contains(&layout) {
                out.push(layout);
            }
        }
        out
    }

    /// First candidate the engine has a kernel for.
    fn select_layout(&self, ctx: &LayoutContext) -> Option<LayoutChoice> {
        let dtype = *ctx.input_dtypes.first()?;
        for layout in self.candidates(ctx) {
            let Some((inputs, outputs)) = self.layouts_for(ctx, layout) else {
                continue;
            };
            let key_layout = outputs.first().copied().unwrap_or(layout);
            let key = self.kernel_key(dtype, key_layout, ctx.input_shapes);
            if ctx.engine.registry().lookup(&key).is_some() {
                return Some(LayoutChoice {
                    inputs,
                    outputs,
                    kernel: key,
                });
            }
        }
        None
    }

    fn kernel_key(&self, dtype: DType, layout: DataLayout, inputs: &[Vec<usize>]) -> KernelKey {
        let rank = inputs.first().map(|s| s.len()).unwrap_or(0);
        KernelKey::new(self.kind(), dtype, layout, ShapeClass::Rank(rank))
    }
}

pub(crate) fn invalid_value(message: impl Into<String>) -> anyhow::Error {
    rt_error(RetCode::InvalidValue, message)
}

/// Output type equals input 0; every input shares it.
pub(crate) fn same_as_input(kind: OpKind, ctx: &TypeContext) -> Result<Option<Vec<DType>>> {
    if ctx.inputs.iter().any(|d| d.is_none()) {
        return Ok(None);
    }
    let dtypes: Vec<DType> = ctx.inputs.iter().flatten().copied().collect();
    let Some(first) = dtypes.first().copied() else {
        return Err(invalid_value(format!("{} {} has no inputs", kind, ctx.node.name)));
    };
    check_supported(kind, first)?;
    if let Some(other) = dtypes.iter().find(|d| **d != first) {
        return Err(invalid_value(format!(
            "{} {} mixes {} and {} inputs",
            kind, ctx.node.name, first, other
        )));
    }
    if let Some(forced) = ctx.node.forced_dtype {
        if forced != first {
            return Err(rt_error(
                RetCode::Unsupported,
                format!("{} cannot produce {} from {}", kind, forced, first),
            ));
        }
    }
    Ok(Some(vec![first; ctx.node.outputs.len()]))
}

pub(crate) fn check_supported(kind: OpKind, dtype: DType) -> Result<()> {
    if op_def(kind)?.dtypes.contains(&dtype) {
        Ok(())
    } else {
        Err(rt_error(
            RetCode::Unsupported,
            format!("{} does not accept {} inputs", kind, dtype),
        ))
    }
}

/// Every operand in `layout`; blocked layouts need rank >= 3 everywhere.
pub(crate) fn uniform_layouts(
    kind: OpKind,
    ctx: &LayoutContext,
    layout: DataLayout,
) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
    if layout.is_blocked() {
        let ndarray_only = op_def(kind).map(|d| d.ndarray_only).unwrap_or(true);
        if ndarray_only {
            return None;
        }
        let ranks_ok = ctx
            .input_shapes
            .iter()
            .chain(ctx.output_shapes.iter())
            .all(|s| layout.supports_rank(s.len()));
        if !ranks_ok {
            return None;
        }
    }
    Some((
        vec![layout; ctx.input_shapes.len()],
        vec![layout; ctx.output_shapes.len()],
    ))
}

static DESCRIPTORS: Lazy<HashMap<OpKind, Box<dyn OpDescriptor>>> = Lazy::new(|| {
    let all: Vec<Box<dyn OpDescriptor>> = vec![
        Box::new(elementwise::Binary(OpKind::Add)),
        Box::new(elementwise::Binary(OpKind::Mul)),
        Box::new(elementwise::Unary(OpKind::Relu)),
        Box::new(elementwise::Unary(OpKind::Sigmoid)),
        Box::new(elementwise::Cast),
        Box::new(movement::Squeeze),
        Box::new(movement::Unsqueeze),
        Box::new(movement::Reshape),
        Box::new(movement::Transpose),
        Box::new(movement::Concat),
        Box::new(norm::LayerNorm),
        Box::new(norm::InstanceNorm),
        Box::new(internal::Reorder),
        Box::new(internal::Transfer),
    ];
    all.into_iter().map(|d| (d.kind(), d)).collect()
});

pub fn descriptor(kind: OpKind) -> Result<&'static dyn OpDescriptor> {
    DESCRIPTORS
        .get(&kind)
        .map(|d| d.as_ref())
        .ok_or_else(|| rt_error(RetCode::Unsupported, format!("no descriptor for {}", kind)))
}
