//! Attribute and operator kinds carried by graph nodes.
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::{DType, DataLayout};

/// Attribute value used by ops in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
    DType(DType),
    Layout(DataLayout),
}

/// Named attribute for an op invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpAttr {
    pub name: String,
    pub value: AttrValue,
}

/// Collection of op attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpAttrs {
    pub items: Vec<OpAttr>,
}

impl OpAttrs {
    /// Build an empty attribute set.
    pub fn none() -> Self {
        Self { items: Vec::new() }
    }

    /// Builder form of [`OpAttrs::set`].
    ///
    /// ```no_run
    /// # use openrt::{AttrValue, OpAttrs};
    /// let attrs = OpAttrs::none()
    ///     .with("axis", AttrValue::Int(-1))
    ///     .with("epsilon", AttrValue::Float(1e-5));
    /// ```
    pub fn with(mut self, name: &str, value: AttrValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: AttrValue) {
        match self.items.iter_mut().find(|item| item.name == name) {
            Some(item) => item.value = value,
            None => self.items.push(OpAttr {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Int(v)) => Ok(Some(*v)),
            Some(AttrValue::UInt(v)) => Ok(Some(*v as i64)),
            Some(other) => Err(anyhow!("{} attribute must be an int, got {:?}", name, other)),
        }
    }

    pub fn int_list(&self, name: &str) -> Result<Option<Vec<i64>>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::IntList(v)) => Ok(Some(v.clone())),
            Some(AttrValue::Int(v)) => Ok(Some(vec![*v])),
            Some(other) => Err(anyhow!("{} attribute must be an int list, got {:?}", name, other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Float(v)) => Ok(Some(*v as f64)),
            Some(AttrValue::Double(v)) => Ok(Some(*v)),
            Some(AttrValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(anyhow!("{} attribute must be a float, got {:?}", name, other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(anyhow!("{} attribute must be a bool, got {:?}", name, other)),
        }
    }

    pub fn dtype(&self, name: &str) -> Result<Option<DType>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::DType(v)) => Ok(Some(*v)),
            Some(AttrValue::Str(v)) => Ok(Some(DType::from_ident(v)?)),
            Some(other) => Err(anyhow!("{} attribute must be a dtype, got {:?}", name, other)),
        }
    }

    pub fn layout(&self, name: &str) -> Result<Option<DataLayout>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Layout(v)) => Ok(Some(*v)),
            Some(AttrValue::Str(v)) => Ok(Some(v.parse()?)),
            Some(other) => Err(anyhow!("{} attribute must be a layout, got {:?}", name, other)),
        }
    }
}

/// Operation kind supported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Add,
    Mul,
    Relu,
    Sigmoid,
    Cast,
    Squeeze,
    Unsqueeze,
    Reshape,
    Transpose,
    Concat,
    LayerNorm,
    InstanceNorm,
    Reorder,
    Transfer,
}

pub const ALL_OPS: &[OpKind] = &[
    OpKind::Add,
    OpKind::Mul,
    OpKind::Relu,
    OpKind::Sigmoid,
    OpKind::Cast,
    OpKind::Squeeze,
    OpKind::Unsqueeze,
    OpKind::Reshape,
    OpKind::Transpose,
    OpKind::Concat,
    OpKind::LayerNorm,
    OpKind::InstanceNorm,
    OpKind::Reorder,
    OpKind::Transfer,
];

impl OpKind {
    /// String identifier for the op kind.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Mul => "mul",
            OpKind::Relu => "relu",
            OpKind::Sigmoid => "sigmoid",
            OpKind::Cast => "cast",
            OpKind::Squeeze => "squeeze",
            OpKind::Unsqueeze => "unsqueeze",
            OpKind::Reshape => "reshape",
            OpKind::Transpose => "transpose",
            OpKind::Concat => "concat",
            OpKind::LayerNorm => "layer_norm",
            OpKind::InstanceNorm => "instance_norm",
            OpKind::Reorder => "reorder",
            OpKind::Transfer => "transfer",
        }
    }

    /// Parse an op kind from its string name.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse()
    }

    /// Nodes the optimizer inserts itself.
    pub fn is_internal(self) -> bool {
        matches!(self, OpKind::Reorder | OpKind::Transfer)
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OpKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        ALL_OPS
            .iter()
            .copied()
            .find(|op| op.as_str() == value)
            .ok_or_else(|| anyhow!("unsupported op {}", value))
    }
}
