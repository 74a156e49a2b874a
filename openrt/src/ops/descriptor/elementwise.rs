use anyhow::Result;

use crate::error::{rt_error, RetCode};
use crate::graph::{OpAttrs, OpKind};
use crate::tensor::{broadcast_shape, DType, DataLayout};

use super::{
    check_supported, invalid_value, uniform_layouts, LayoutContext, OpDescriptor, TypeContext,
};

/// `Add` and `Mul`.
pub struct Binary(pub OpKind);

impl OpDescriptor for Binary {
    fn kind(&self) -> OpKind {
        self.0
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let out = broadcast_shape(&inputs[0], &inputs[1])
            .map_err(|err| invalid_value(format!("{}: {}", self.0, err)))?;
        Ok(vec![out])
    }

    fn layouts_for(
        &self,
        ctx: &LayoutContext,
        layout: DataLayout,
    ) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
        // Blocked kernels walk both operands lane by lane.
        if layout.is_blocked() && ctx.input_shapes.iter().any(|s| *s != ctx.output_shapes[0]) {
            return None;
        }
        uniform_layouts(self.0, ctx, layout)
    }
}

/// `Relu` and `Sigmoid`.
pub struct Unary(pub OpKind);

impl OpDescriptor for Unary {
    fn kind(&self) -> OpKind {
        self.0
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        Ok(vec![inputs[0].clone()])
    }
}

pub struct Cast;

impl OpDescriptor for Cast {
    fn kind(&self) -> OpKind {
        OpKind::Cast
    }

    fn infer_type(&self, ctx: &TypeContext) -> Result<Option<Vec<DType>>> {
        let Some(Some(src)) = ctx.inputs.first().copied() else {
            return Ok(None);
        };
        check_supported(OpKind::Cast, src)?;
        let to = ctx
            .node
            .attrs
            .dtype("to")
            .map_err(|err| invalid_value(err.to_string()))?;
        let dst = match (to, ctx.node.forced_dtype) {
            (Some(to), Some(forced)) if to != forced => {
                return Err(rt_error(
                    RetCode::Unsupported,
                    format!("cast {} to {} cannot produce {}", ctx.node.name, to, forced),
                ));
            }
            (Some(to), _) => to,
            (None, Some(forced)) => forced,
            (None, None) => {
                return Err(invalid_value(format!(
                    "cast {} has no target type",
                    ctx.node.name
                )))
            }
        };
        Ok(Some(vec![dst]))
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        Ok(vec![inputs[0].clone()])
    }
}
