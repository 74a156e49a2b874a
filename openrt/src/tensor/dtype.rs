use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{Tensor, TensorValue};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

pub const ALL_DTYPES: &[DType] = &[DType::F32, DType::F64, DType::I32, DType::I64, DType::U8];

impl DType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
        }
    }

    pub fn from_ident(ident: &str) -> Result<Self> {
        match ident {
            "f32" => Ok(DType::F32),
            "f64" => Ok(DType::F64),
            "i32" => Ok(DType::I32),
            "i64" => Ok(DType::I64),
            "u8" => Ok(DType::U8),
            other => Err(anyhow!("unknown dtype {}", other)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        DType::from_ident(value)
    }
}

/// Host element type that maps onto a [`DType`].
pub trait TensorElement:
    bytemuck::Pod + Default + Send + Sync + PartialEq + fmt::Debug + 'static
{
    const DTYPE: DType;

    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
    /// Attempt to extract a typed tensor from a generic value.
    fn from_value(value: &TensorValue) -> Option<Tensor<Self>>;
    /// Wrap a typed tensor into a generic value.
    fn into_value(tensor: Tensor<Self>) -> TensorValue;
}

macro_rules! impl_tensor_element {
    ($t:ty, $dtype:ident) => {
        impl TensorElement for $t {
            const DTYPE: DType = DType::$dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn from_value(value: &TensorValue) -> Option<Tensor<Self>> {
                match value {
                    TensorValue::$dtype(tensor) => Some(tensor.clone()),
                    _ => None,
                }
            }

            fn into_value(tensor: Tensor<Self>) -> TensorValue {
                TensorValue::$dtype(tensor)
            }
        }
    };
}

impl_tensor_element!(f32, F32);
impl_tensor_element!(f64, F64);
impl_tensor_element!(i32, I32);
impl_tensor_element!(i64, I64);
impl_tensor_element!(u8, U8);
