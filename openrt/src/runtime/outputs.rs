use std::collections::HashMap;

use anyhow::Result;

use crate::error::{rt_error, RetCode};
use crate::tensor::{Tensor, TensorElement, TensorValue};

/// Values that can be read out of a run's results by name.
pub trait Fetchable: Sized {
    fn fetch(outputs: &Outputs, name: &str) -> Result<Self>;
}

impl Fetchable for TensorValue {
    fn fetch(outputs: &Outputs, name: &str) -> Result<Self> {
        outputs.get(name).cloned()
    }
}

impl<T: TensorElement> Fetchable for Tensor<T> {
    fn fetch(outputs: &Outputs, name: &str) -> Result<Self> {
        outputs.get(name)?.as_tensor::<T>()
    }
}

/// Graph outputs of one run, keyed by edge name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: HashMap<String, TensorValue>,
}

impl Outputs {
    pub(crate) fn new(values: HashMap<String, TensorValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Result<&TensorValue> {
        self.values
            .get(name)
            .ok_or_else(|| rt_error(RetCode::InvalidValue, format!("no output named {}", name)))
    }

    pub fn fetch<T: Fetchable>(&self, name: &str) -> Result<T> {
        T::fetch(self, name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, TensorValue> {
        self.values
    }
}
