use std::collections::{BTreeSet, HashMap};

use crate::graph::{OpKind, ALL_OPS};
use crate::ops::cpu::{reference_kernel, reference_layouts};
use crate::registry::{KernelKey, KernelRegistry, ShapeClass};
use crate::tensor::{DataLayout, ALL_DTYPES, ALL_LAYOUTS};

use super::{AccelEngine, CpuEngine, EngineKind};

/// Assembles an engine's capability table from the reference kernels.
///
/// ```no_run
/// # use openrt::{CpuEngine, OpKind};
/// let relu_only = CpuEngine::builder("relu-box").ops(&[OpKind::Relu]).build();
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    name: String,
    kind: EngineKind,
    preference: Vec<DataLayout>,
    ops: Option<BTreeSet<OpKind>>,
    op_layouts: HashMap<OpKind, Vec<DataLayout>>,
    op_ranks: HashMap<OpKind, Vec<usize>>,
}

impl EngineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EngineKind::Custom,
            preference: vec![DataLayout::NdArray],
            ops: None,
            op_layouts: HashMap::new(),
            op_ranks: HashMap::new(),
        }
    }

    pub fn kind(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Layout preference order. `NdArray` is always supported even when not
    /// listed.
    pub fn prefer(mut self, layouts: &[DataLayout]) -> Self {
        self.preference = layouts.to_vec();
        self
    }

    /// Restrict the user-visible operator set. Reorder and transfer are
    /// always present.
    pub fn ops(mut self, ops: &[OpKind]) -> Self {
        self.ops = Some(ops.iter().copied().collect());
        self
    }

    /// Register `op` only in `layouts`.
    pub fn op_layouts(mut self, op: OpKind, layouts: &[DataLayout]) -> Self {
        self.op_layouts.insert(op, layouts.to_vec());
        self
    }

    /// Register `op` only for inputs of the given ranks.
    pub fn op_ranks(mut self, op: OpKind, ranks: &[usize]) -> Self {
        self.op_ranks.insert(op, ranks.to_vec());
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn engine_kind(&self) -> EngineKind {
        self.kind
    }

    pub(crate) fn preference(&self) -> &[DataLayout] {
        &self.preference
    }

    fn engine_layouts(&self) -> Vec<DataLayout> {
        let mut out = self.preference.clone();
        if !out.contains(&DataLayout::NdArray) {
            out.push(DataLayout::NdArray);
        }
        out
    }

    fn layouts_for(&self, op: OpKind) -> Vec<DataLayout> {
        if op.is_internal() {
            return ALL_LAYOUTS.to_vec();
        }
        let engine = self.engine_layouts();
        let allowed = self.op_layouts.get(&op).unwrap_or(&engine);
        reference_layouts(op)
            .iter()
            .copied()
            .filter(|layout| allowed.contains(layout))
            .collect()
    }

    fn enabled(&self, op: OpKind) -> bool {
        op.is_internal() || self.ops.as_ref().map_or(true, |ops| ops.contains(&op))
    }

    pub(crate) fn registry(&self) -> KernelRegistry {
        let mut registry = KernelRegistry::new();
        for op in ALL_OPS.iter().copied().filter(|op| self.enabled(*op)) {
            let classes: Vec<ShapeClass> = match self.op_ranks.get(&op) {
                Some(ranks) => ranks.iter().map(|r| ShapeClass::Rank(*r)).collect(),
                None => vec![ShapeClass::Any],
            };
            for dtype in ALL_DTYPES.iter().copied() {
                let Some(func) = reference_kernel(op, dtype) else {
                    continue;
                };
                for layout in self.layouts_for(op) {
                    for class in &classes {
                        let key = KernelKey::new(op, dtype, layout, *class);
                        registry.register(&self.name, key, func.clone());
                    }
                }
            }
        }
        registry
    }

    pub fn build(self) -> CpuEngine {
        CpuEngine::from_builder(self)
    }

    /// Same capability table, executed on a dedicated worker queue.
    pub fn build_async(self) -> AccelEngine {
        AccelEngine::from_builder(self)
    }
}
