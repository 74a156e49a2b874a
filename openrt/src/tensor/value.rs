use anyhow::{anyhow, Result};

use super::{numel, DType, Tensor, TensorElement};

/// Tensor of any supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValue {
    F32(Tensor<f32>),
    F64(Tensor<f64>),
    I32(Tensor<i32>),
    I64(Tensor<i64>),
    U8(Tensor<u8>),
}

macro_rules! with_tensor {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            TensorValue::F32($t) => $body,
            TensorValue::F64($t) => $body,
            TensorValue::I32($t) => $body,
            TensorValue::I64($t) => $body,
            TensorValue::U8($t) => $body,
        }
    };
}

impl TensorValue {
    pub fn dtype(&self) -> DType {
        match self {
            TensorValue::F32(_) => DType::F32,
            TensorValue::F64(_) => DType::F64,
            TensorValue::I32(_) => DType::I32,
            TensorValue::I64(_) => DType::I64,
            TensorValue::U8(_) => DType::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_tensor!(self, t => t.shape())
    }

    pub fn len(&self) -> usize {
        with_tensor!(self, t => t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian bytes of the element data.
    pub fn as_bytes(&self) -> &[u8] {
        with_tensor!(self, t => bytemuck::cast_slice(t.as_slice()))
    }

    /// Rebuild a tensor from raw element bytes.
    pub fn from_bytes(dtype: DType, shape: Vec<usize>, bytes: &[u8]) -> Result<Self> {
        let expected = numel(&shape).saturating_mul(dtype.size());
        if bytes.len() != expected {
            return Err(anyhow!(
                "{} tensor {:?} expects {} bytes, got {}",
                dtype,
                shape,
                expected,
                bytes.len()
            ));
        }
        Ok(match dtype {
            DType::F32 => TensorValue::F32(typed_from_bytes(shape, bytes)?),
            DType::F64 => TensorValue::F64(typed_from_bytes(shape, bytes)?),
            DType::I32 => TensorValue::I32(typed_from_bytes(shape, bytes)?),
            DType::I64 => TensorValue::I64(typed_from_bytes(shape, bytes)?),
            DType::U8 => TensorValue::U8(typed_from_bytes(shape, bytes)?),
        })
    }

    pub fn as_tensor<T: TensorElement>(&self) -> Result<Tensor<T>> {
        T::from_value(self).ok_or_else(|| {
            anyhow!("tensor has dtype {}, requested {}", self.dtype(), T::DTYPE)
        })
    }
}

fn typed_from_bytes<T: TensorElement>(shape: Vec<usize>, bytes: &[u8]) -> Result<Tensor<T>> {
    // Source bytes carry no alignment guarantee.
    let data: Vec<T> = bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect();
    Tensor::from_vec_with_shape(data, shape)
}

impl<T: TensorElement> From<Tensor<T>> for TensorValue {
    fn from(value: Tensor<T>) -> Self {
        T::into_value(value)
    }
}

impl<T: TensorElement> From<Vec<T>> for TensorValue {
    fn from(value: Vec<T>) -> Self {
        T::into_value(Tensor::new(value))
    }
}
