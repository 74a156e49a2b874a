//! Per-engine capability table.
//!
//! Engines fill a `KernelRegistry` at construction and never change it
//! afterwards; the optimizer queries it for layout support and kernel lookup,
//! the plan codec re-binds kernels by their string id.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::graph::OpKind;
use crate::ops::KernelArgs;
use crate::tensor::{DType, DataLayout};

pub type KernelFn = Arc<dyn Fn(&KernelArgs) -> Result<()> + Send + Sync>;

/// Coarse shape bucket a kernel is specialised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeClass {
    Any,
    Rank(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelKey {
    pub op: OpKind,
    pub dtype: DType,
    pub layout: DataLayout,
    pub shape_class: ShapeClass,
}

impl KernelKey {
    pub fn new(op: OpKind, dtype: DType, layout: DataLayout, shape_class: ShapeClass) -> Self {
        Self {
            op,
            dtype,
            layout,
            shape_class,
        }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.op, self.dtype, self.layout)?;
        if let ShapeClass::Rank(rank) = self.shape_class {
            write!(f, ".r{}", rank)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct KernelEntry {
    /// Stable name, `{engine}.{op}.{dtype}.{layout}[.r{rank}]`.
    pub id: String,
    pub key: KernelKey,
    pub func: KernelFn,
}

impl fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelEntry").field("id", &self.id).finish()
    }
}

#[derive(Clone, Default)]
pub struct KernelRegistry {
    entries: HashMap<KernelKey, KernelEntry>,
    by_id: HashMap<String, KernelKey>,
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.entries.len())
            .finish()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `key`; `prefix` is the owning engine's name.
    pub fn register(&mut self, prefix: &str, key: KernelKey, func: KernelFn) {
        let id = format!("{}.{}", prefix, key);
        self.by_id.insert(id.clone(), key);
        self.entries.insert(key, KernelEntry { id, key, func });
    }

    /// Exact shape class first, then the `Any` fallback.
    pub fn lookup(&self, key: &KernelKey) -> Option<&KernelEntry> {
        self.entries.get(key).or_else(|| {
            self.entries.get(&KernelKey {
                shape_class: ShapeClass::Any,
                ..*key
            })
        })
    }

    pub fn by_id(&self, id: &str) -> Option<&KernelEntry> {
        self.by_id.get(id).and_then(|key| self.entries.get(key))
    }

    pub fn supports_op(&self, op: OpKind, dtype: DType) -> bool {
        self.entries
            .keys()
            .any(|key| key.op == op && key.dtype == dtype)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
