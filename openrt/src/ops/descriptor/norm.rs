use anyhow::Result;

use crate::graph::{OpAttrs, OpKind};
use crate::tensor::{normalize_axis, numel, DataLayout};

use super::{invalid_value, LayoutContext, OpDescriptor};

fn check_params(kind: OpKind, params: &[Vec<usize>], expected: usize) -> Result<()> {
    for shape in params {
        if numel(shape) != expected {
            return Err(invalid_value(format!(
                "{} parameter {:?} needs {} values",
                kind, shape, expected
            )));
        }
    }
    Ok(())
}

/// Input slots of a layer norm node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerNormOperands {
    pub scale: Option<usize>,
    pub bias: Option<usize>,
    /// Residual added to `x` before normalizing.
    pub skip: Option<usize>,
}

impl LayerNormOperands {
    pub fn resolve(attrs: &OpAttrs, inputs: usize) -> Result<Self> {
        let affine = attrs.bool("elementwise_affine")?.unwrap_or(true);
        let skip_term = attrs.bool("skip_term")?.unwrap_or(false);
        let params = if skip_term {
            if inputs < 2 {
                return Err(invalid_value("layer_norm with skip_term needs a residual input"));
            }
            inputs - 2
        } else {
            inputs.saturating_sub(1)
        };
        if params > 2 {
            return Err(invalid_value(format!("layer_norm takes {} inputs", inputs)));
        }
        // Scale and bias keep their slots but are unused without elementwise_affine.
        let params = if affine { params } else { 0 };
        Ok(Self {
            scale: (params >= 1).then_some(1),
            bias: (params >= 2).then_some(2),
            skip: skip_term.then_some(inputs - 1),
        })
    }
}

pub struct LayerNorm;

impl OpDescriptor for LayerNorm {
    fn kind(&self) -> OpKind {
        OpKind::LayerNorm
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let x = &inputs[0];
        let axis = attrs
            .int("axis")
            .and_then(|axis| normalize_axis(axis.unwrap_or(-1), x.len()))
            .map_err(|e| invalid_value(format!("layer_norm: {}", e)))?;
        let operands = LayerNormOperands::resolve(attrs, inputs.len())?;
        let params: Vec<Vec<usize>> = [operands.scale, operands.bias]
            .into_iter()
            .flatten()
            .map(|i| inputs[i].clone())
            .collect();
        check_params(OpKind::LayerNorm, &params, numel(&x[axis..]))?;
        if let Some(skip) = operands.skip {
            if &inputs[skip] != x {
                return Err(invalid_value(format!(
                    "layer_norm residual {:?} does not match input {:?}",
                    inputs[skip], x
                )));
            }
        }
        Ok(vec![x.clone()])
    }
}

pub struct InstanceNorm;

impl OpDescriptor for InstanceNorm {
    fn kind(&self) -> OpKind {
        OpKind::InstanceNorm
    }

    fn infer_shape(&self, _attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let x = &inputs[0];
        if x.len() < 3 {
            return Err(invalid_value(format!(
                "instance_norm needs [N, C, X...], got {:?}",
                x
            )));
        }
        check_params(OpKind::InstanceNorm, &inputs[1..], x[1])?;
        Ok(vec![x.clone()])
    }

    /// Data may be blocked; scale and bias stay plain vectors.
    fn layouts_for(
        &self,
        ctx: &LayoutContext,
        layout: DataLayout,
    ) -> Option<(Vec<DataLayout>, Vec<DataLayout>)> {
        if !layout.supports_rank(ctx.input_shapes[0].len()) {
            return None;
        }
        let mut inputs = vec![DataLayout::NdArray; ctx.input_shapes.len()];
        inputs[0] = layout;
        Some((inputs, vec![layout]))
    }
}
