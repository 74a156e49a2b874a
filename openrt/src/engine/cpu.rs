use anyhow::Result;

use crate::ops::KernelArgs;
use crate::registry::{KernelEntry, KernelRegistry};
use crate::tensor::DataLayout;

use super::{Engine, EngineBuilder, EngineKind};

/// Synchronous host engine; kernels run on the caller's thread inside the
/// plan's rayon pool.
#[derive(Debug)]
pub struct CpuEngine {
    name: String,
    kind: EngineKind,
    registry: KernelRegistry,
    preference: Vec<DataLayout>,
}

impl CpuEngine {
    pub fn builder(name: impl Into<String>) -> EngineBuilder {
        EngineBuilder::new(name)
    }

    pub(crate) fn from_builder(builder: EngineBuilder) -> Self {
        Self {
            name: builder.name().to_string(),
            kind: builder.engine_kind(),
            registry: builder.registry(),
            preference: builder.preference().to_vec(),
        }
    }
}

impl Engine for CpuEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn layout_preference(&self) -> &[DataLayout] {
        &self.preference
    }

    fn launch(&self, kernel: &KernelEntry, args: KernelArgs) -> Result<()> {
        (kernel.func)(&args)
    }
}
