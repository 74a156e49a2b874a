use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::shape::overflow;
use super::{checked_numel, DType, DataLayout};

/// One tensor dimension; `Unresolved` only exists before shape inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dim {
    Fixed(usize),
    Unresolved,
}

impl Dim {
    pub fn value(self) -> Option<usize> {
        match self {
            Dim::Fixed(n) => Some(n),
            Dim::Unresolved => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Unresolved => write!(f, "?"),
        }
    }
}

/// Shape, element type and layout of one tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dims: Vec<Dim>,
    pub dtype: Option<DType>,
    pub layout: DataLayout,
}

impl TensorDesc {
    pub fn new(shape: &[usize], dtype: DType) -> Self {
        Self {
            dims: shape.iter().map(|d| Dim::Fixed(*d)).collect(),
            dtype: Some(dtype),
            layout: DataLayout::NdArray,
        }
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Concrete shape; fails while any dimension is unresolved.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.dims
            .iter()
            .map(|d| d.value().ok_or_else(|| anyhow!("unresolved dimension in {}", self)))
            .collect()
    }

    pub fn dtype(&self) -> Result<DType> {
        self.dtype.ok_or_else(|| anyhow!("unresolved element type in {}", self))
    }

    pub fn element_count(&self) -> Result<usize> {
        checked_numel(&self.shape()?)
    }

    /// Element count including the padding lanes of a blocked layout.
    pub fn padded_element_count(&self) -> Result<usize> {
        let shape = self.shape()?;
        match self.layout.block() {
            None => checked_numel(&shape),
            Some(block) => {
                if shape.len() < 3 {
                    return Err(anyhow!("layout {} requires rank >= 3, got {}", self.layout, self));
                }
                let spatial = checked_numel(&shape[2..])?;
                shape[1]
                    .div_ceil(block)
                    .checked_mul(block)
                    .and_then(|channels| channels.checked_mul(shape[0]))
                    .and_then(|n| n.checked_mul(spatial))
                    .ok_or_else(|| overflow(&shape))
            }
        }
    }

    pub fn bytes(&self) -> Result<usize> {
        let elements = self.padded_element_count()?;
        elements
            .checked_mul(self.dtype()?.size())
            .ok_or_else(|| overflow(&self.shape().unwrap_or_default()))
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        let dtype = self.dtype.map(|d| d.as_str()).unwrap_or("?");
        write!(f, "{}[{}] {}", dtype, dims.join(", "), self.layout)
    }
}
