//! Host tensor container.
//!
//! `Tensor<T>` owns flat row-major storage plus its shape. It is what callers
//! hand to `ExecutionPlan::run` and what they get back.
use anyhow::{anyhow, Result};

use super::numel;

/// Owned tensor container with shape metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub data: Vec<T>,
    shape: Vec<usize>,
}

impl<T> Tensor<T> {
    /// Build a rank-1 tensor from a flat data vector.
    ///
    /// # Example
    /// ```no_run
    /// # use openrt::Tensor;
    /// let t = Tensor::new(vec![1.0f32, 2.0, 3.0]);
    /// assert_eq!(t.shape(), &[3]);
    /// ```
    pub fn new(data: Vec<T>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    /// Build a tensor with an explicit shape.
    ///
    /// # Example
    /// ```no_run
    /// # use openrt::Tensor;
    /// # fn main() -> anyhow::Result<()> {
    /// let t = Tensor::from_vec_with_shape(vec![1.0f32, 2.0, 3.0, 4.0], vec![2, 2])?;
    /// # Ok(()) }
    /// ```
    pub fn from_vec_with_shape(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        let expected = numel(&shape);
        if expected != data.len() {
            return Err(anyhow!(
                "tensor shape {:?} expects {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { data, shape })
    }

    pub fn from_scalar(value: T) -> Self {
        Self {
            data: vec![value],
            shape: Vec::new(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn reshape(mut self, shape: Vec<usize>) -> Result<Self> {
        if numel(&shape) != self.data.len() {
            return Err(anyhow!(
                "cannot reshape {:?} into {:?}",
                self.shape,
                shape
            ));
        }
        self.shape = shape;
        Ok(self)
    }
}

impl<T> From<Vec<T>> for Tensor<T> {
    fn from(value: Vec<T>) -> Self {
        Tensor::new(value)
    }
}
