use anyhow::Result;

use crate::error::{rt_error, RetCode};
use crate::graph::{Node, OpKind};
use crate::tensor::DType;

use super::op_attrs::{
    OpAttrDef, AXES_ATTR, AXIS_ATTR, ELEMENTWISE_AFFINE_ATTR, EPSILON_ATTR, LAYOUT_ATTR,
    PERM_ATTR, SHAPE_ATTR, SKIP_TERM_ATTR, TO_ATTR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    Fixed(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl InputArity {
    pub fn allows(self, count: usize) -> bool {
        match self {
            InputArity::Fixed(expected) => count == expected,
            InputArity::AtLeast(min) => count >= min,
            InputArity::Range(min, max) => (min..=max).contains(&count),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    pub kind: OpKind,
    pub inputs: InputArity,
    pub outputs: usize,
    pub attrs: &'static [OpAttrDef],
    pub supports_inplace: bool,
    /// Element types accepted on input 0.
    pub dtypes: &'static [DType],
    /// Restricted to plain row-major data.
    pub ndarray_only: bool,
}

const NUMERIC: &[DType] = &[DType::F32, DType::F64, DType::I32, DType::I64, DType::U8];
const SIGNED: &[DType] = &[DType::F32, DType::F64, DType::I32, DType::I64];
const FLOAT: &[DType] = &[DType::F32, DType::F64];

const fn unary(kind: OpKind, dtypes: &'static [DType], inplace: bool) -> OpDef {
    OpDef {
        kind,
        inputs: InputArity::Fixed(1),
        outputs: 1,
        attrs: &[],
        supports_inplace: inplace,
        dtypes,
        ndarray_only: false,
    }
}

pub const OPS: &[OpDef] = &[
    OpDef {
        kind: OpKind::Add,
        inputs: InputArity::Fixed(2),
        outputs: 1,
        attrs: &[],
        supports_inplace: true,
        dtypes: NUMERIC,
        ndarray_only: false,
    },
    OpDef {
        kind: OpKind::Mul,
        inputs: InputArity::Fixed(2),
        outputs: 1,
        attrs: &[],
        supports_inplace: true,
        dtypes: NUMERIC,
        ndarray_only: false,
    },
    unary(OpKind::Relu, SIGNED, true),
    unary(OpKind::Sigmoid, FLOAT, true),
    OpDef {
        attrs: &[TO_ATTR],
        ..unary(OpKind::Cast, NUMERIC, false)
    },
    OpDef {
        attrs: &[AXES_ATTR],
        ndarray_only: true,
        ..unary(OpKind::Squeeze, NUMERIC, true)
    },
    OpDef {
        attrs: &[AXES_ATTR],
        ndarray_only: true,
        ..unary(OpKind::Unsqueeze, NUMERIC, true)
    },
    OpDef {
        attrs: &[SHAPE_ATTR],
        ndarray_only: true,
        ..unary(OpKind::Reshape, NUMERIC, true)
    },
    OpDef {
        attrs: &[PERM_ATTR],
        ndarray_only: true,
        ..unary(OpKind::Transpose, NUMERIC, false)
    },
    OpDef {
        kind: OpKind::Concat,
        inputs: InputArity::AtLeast(1),
        outputs: 1,
        attrs: &[AXIS_ATTR],
        supports_inplace: false,
        dtypes: NUMERIC,
        ndarray_only: true,
    },
    OpDef {
        kind: OpKind::LayerNorm,
        // x, then scale and bias when affine, then the residual when skip_term.
        inputs: InputArity::Range(1, 4),
        outputs: 1,
        attrs: &[AXIS_ATTR, EPSILON_ATTR, ELEMENTWISE_AFFINE_ATTR, SKIP_TERM_ATTR],
        supports_inplace: false,
        dtypes: FLOAT,
        ndarray_only: true,
    },
    OpDef {
        kind: OpKind::InstanceNorm,
        inputs: InputArity::Fixed(3),
        outputs: 1,
        attrs: &[EPSILON_ATTR],
        supports_inplace: false,
        dtypes: FLOAT,
        ndarray_only: false,
    },
    OpDef {
        attrs: &[LAYOUT_ATTR],
        ..unary(OpKind::Reorder, NUMERIC, false)
    },
    unary(OpKind::Transfer, NUMERIC, false),
];

pub fn op_def(kind: OpKind) -> Result<&'static OpDef> {
    OPS.iter()
        .find(|op| op.kind == kind)
        .ok_or_else(|| rt_error(RetCode::Unsupported, format!("no definition for op {}", kind)))
}

/// Arity and attribute checks for one node.
pub fn check_node(node: &Node) -> Result<()> {
    let def = op_def(node.kind)?;
    if !def.inputs.allows(node.inputs.len()) {
        return Err(rt_error(
            RetCode::InvalidGraph,
            format!(
                "{} {} takes {:?} inputs, got {}",
                node.kind,
                node.name,
                def.inputs,
                node.inputs.len()
            ),
        ));
    }
    if node.outputs.len() != def.outputs {
        return Err(rt_error(
            RetCode::InvalidGraph,
            format!(
                "{} {} produces {} outputs, got {}",
                node.kind,
                node.name,
                def.outputs,
                node.outputs.len()
            ),
        ));
    }
    for attr in &node.attrs.items {
        let attr_def = def
            .attrs
            .iter()
            .find(|d| d.name == attr.name)
            .ok_or_else(|| {
                rt_error(
                    RetCode::InvalidValue,
                    format!("{} does not take attribute {}", node.kind, attr.name),
                )
            })?;
        attr_def
            .accepts(&attr.value)
            .map_err(|err| rt_error(RetCode::InvalidValue, format!("{}: {}", node.name, err)))?;
    }
    Ok(())
}
