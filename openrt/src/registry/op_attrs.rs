use anyhow::{anyhow, Result};

use crate::graph::AttrValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpAttrType {
    Scalar,
    DType,
    String,
    IntList,
    Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarAttrKind {
    Float,
    Int,
    UInt,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpAttrDef {
    pub name: &'static str,
    pub kind: OpAttrType,
    pub scalar_kinds: &'static [ScalarAttrKind],
}

impl OpAttrDef {
    pub const fn new(name: &'static str, kind: OpAttrType) -> Self {
        Self {
            name,
            kind,
            scalar_kinds: &[],
        }
    }

    pub const fn scalar(name: &'static str, scalar_kinds: &'static [ScalarAttrKind]) -> Self {
        Self {
            name,
            kind: OpAttrType::Scalar,
            scalar_kinds,
        }
    }

    /// Check that `value` has the declared kind.
    pub fn accepts(&self, value: &AttrValue) -> Result<()> {
        let ok = match (self.kind, value) {
            (OpAttrType::Scalar, AttrValue::Float(_) | AttrValue::Double(_)) => {
                self.scalar_kinds.contains(&ScalarAttrKind::Float)
            }
            (OpAttrType::Scalar, AttrValue::Int(_)) => self
                .scalar_kinds
                .iter()
                .any(|k| matches!(k, ScalarAttrKind::Int | ScalarAttrKind::Float)),
            (OpAttrType::Scalar, AttrValue::UInt(_)) => self
                .scalar_kinds
                .iter()
                .any(|k| matches!(k, ScalarAttrKind::UInt | ScalarAttrKind::Int)),
            (OpAttrType::Scalar, AttrValue::Bool(_)) => {
                self.scalar_kinds.contains(&ScalarAttrKind::Bool)
            }
            (OpAttrType::DType, AttrValue::DType(_) | AttrValue::Str(_)) => true,
            (OpAttrType::Layout, AttrValue::Layout(_) | AttrValue::Str(_)) => true,
            (OpAttrType::String, AttrValue::Str(_)) => true,
            (OpAttrType::IntList, AttrValue::IntList(_) | AttrValue::Int(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(anyhow!(
                "attribute {} expects {:?}, got {:?}",
                self.name,
                self.kind,
                value
            ))
        }
    }
}

pub const INT_SCALAR_KINDS: &[ScalarAttrKind] = &[ScalarAttrKind::Int, ScalarAttrKind::UInt];
pub const FLOAT_SCALAR_KINDS: &[ScalarAttrKind] = &[ScalarAttrKind::Float];

pub const AXIS_ATTR: OpAttrDef = OpAttrDef::scalar("axis", INT_SCALAR_KINDS);
pub const AXES_ATTR: OpAttrDef = OpAttrDef::new("axes", OpAttrType::IntList);
pub const SHAPE_ATTR: OpAttrDef = OpAttrDef::new("shape", OpAttrType::IntList);
pub const PERM_ATTR: OpAttrDef = OpAttrDef::new("perm", OpAttrType::IntList);
pub const EPSILON_ATTR: OpAttrDef = OpAttrDef::scalar("epsilon", FLOAT_SCALAR_KINDS);
pub const ELEMENTWISE_AFFINE_ATTR: OpAttrDef =
    OpAttrDef::scalar("elementwise_affine", &[ScalarAttrKind::Bool]);
pub const SKIP_TERM_ATTR: OpAttrDef = OpAttrDef::scalar("skip_term", &[ScalarAttrKind::Bool]);
pub const TO_ATTR: OpAttrDef = OpAttrDef::new("to", OpAttrType::DType);
pub const LAYOUT_ATTR: OpAttrDef = OpAttrDef::new("layout", OpAttrType::Layout);
