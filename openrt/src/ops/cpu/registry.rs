use std::sync::Arc;

use crate::dispatch_dtype;
use crate::graph::OpKind;
use crate::ops::KernelArgs;
use crate::registry::{op_def, KernelFn};
use crate::tensor::{DType, DataLayout, ALL_LAYOUTS};

use super::{cast, elementwise, movement, norm, reorder};

/// Portable kernel for `(op, dtype)`, if the op accepts that element type.
pub fn reference_kernel(op: OpKind, dtype: DType) -> Option<KernelFn> {
    let def = op_def(op).ok()?;
    if !def.dtypes.contains(&dtype) {
        return None;
    }
    let func: KernelFn = match (op, dtype) {
        (OpKind::Add, DType::U8) => Arc::new(elementwise::add_u8),
        (OpKind::Mul, DType::U8) => Arc::new(elementwise::mul_u8),
        (OpKind::Add, DType::F32) => Arc::new(elementwise::add::<f32>),
        (OpKind::Add, DType::F64) => Arc::new(elementwise::add::<f64>),
        (OpKind::Add, DType::I32) => Arc::new(elementwise::add_i32),
        (OpKind::Add, DType::I64) => Arc::new(elementwise::add_i64),
        (OpKind::Mul, DType::F32) => Arc::new(elementwise::mul::<f32>),
        (OpKind::Mul, DType::F64) => Arc::new(elementwise::mul::<f64>),
        (OpKind::Mul, DType::I32) => Arc::new(elementwise::mul_i32),
        (OpKind::Mul, DType::I64) => Arc::new(elementwise::mul_i64),
        (OpKind::Relu, DType::F32) => Arc::new(elementwise::relu::<f32>),
        (OpKind::Relu, DType::F64) => Arc::new(elementwise::relu::<f64>),
        (OpKind::Relu, DType::I32) => Arc::new(elementwise::relu::<i32>),
        (OpKind::Relu, DType::I64) => Arc::new(elementwise::relu::<i64>),
        (OpKind::Sigmoid, DType::F32) => Arc::new(elementwise::sigmoid_f32),
        (OpKind::Sigmoid, DType::F64) => Arc::new(elementwise::sigmoid_f64),
        (OpKind::Cast, _) => Arc::new(cast::cast),
        (OpKind::Squeeze | OpKind::Unsqueeze | OpKind::Reshape | OpKind::Transfer, _) => {
            Arc::new(movement::copy_or_alias)
        }
        (OpKind::Transpose, dtype) => {
            Arc::new(move |args: &KernelArgs| {
                dispatch_dtype!(dtype, T => movement::transpose::<T>(args))
            })
        }
        (OpKind::Concat, dtype) => {
            Arc::new(move |args: &KernelArgs| {
                dispatch_dtype!(dtype, T => movement::concat::<T>(args))
            })
        }
        (OpKind::Reorder, dtype) => {
            Arc::new(move |args: &KernelArgs| {
                dispatch_dtype!(dtype, T => reorder::reorder::<T>(args))
            })
        }
        (OpKind::LayerNorm, DType::F32) => Arc::new(norm::layer_norm::<f32>),
        (OpKind::LayerNorm, DType::F64) => Arc::new(norm::layer_norm::<f64>),
        (OpKind::InstanceNorm, DType::F32) => Arc::new(norm::instance_norm::<f32>),
        (OpKind::InstanceNorm, DType::F64) => Arc::new(norm::instance_norm::<f64>),
        _ => return None,
    };
    Some(func)
}

/// Layouts the portable kernel for `op` can handle.
pub fn reference_layouts(op: OpKind) -> &'static [DataLayout] {
    match op_def(op) {
        Ok(def) if def.ndarray_only => &[DataLayout::NdArray],
        _ => ALL_LAYOUTS,
    }
}
