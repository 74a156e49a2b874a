//! Hardware backends.
//!
//! An engine owns a [`KernelRegistry`] filled once at construction, a layout
//! preference order used by layout selection, and a launch/synchronize
//! protocol. Synchronous engines run a kernel inside `launch`; asynchronous
//! ones queue it and only guarantee completion after `synchronize`.
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::graph::OpKind;
use crate::ops::KernelArgs;
use crate::registry::{KernelEntry, KernelRegistry};
use crate::tensor::{DType, DataLayout};

mod accel;
mod builder;
mod cpu;
pub mod stock;

pub use accel::AccelEngine;
pub use builder::EngineBuilder;
pub use cpu::CpuEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Vector CPU.
    X86,
    /// Mobile SIMD CPU.
    Arm,
    /// Discrete accelerator with its own work queue.
    Accel,
    /// User-assembled engine.
    Custom,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::X86 => "x86",
            EngineKind::Arm => "arm",
            EngineKind::Accel => "accel",
            EngineKind::Custom => "custom",
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            EngineKind::X86 => 0,
            EngineKind::Arm => 1,
            EngineKind::Accel => 2,
            EngineKind::Custom => 3,
        }
    }

    pub(crate) fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(EngineKind::X86),
            1 => Some(EngineKind::Arm),
            2 => Some(EngineKind::Accel),
            3 => Some(EngineKind::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub trait Engine: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> EngineKind;

    fn registry(&self) -> &KernelRegistry;

    /// Layouts this engine would rather compute in, best first.
    fn layout_preference(&self) -> &[DataLayout];

    fn is_async(&self) -> bool {
        false
    }

    fn supports(&self, op: OpKind, dtype: DType) -> bool {
        self.registry().supports_op(op, dtype)
    }

    /// Run or enqueue `kernel`. The buffers behind `args` must stay valid
    /// until `synchronize` returns.
    fn launch(&self, kernel: &KernelEntry, args: KernelArgs) -> Result<()>;

    /// Block until every kernel launched under `ticket` finished; returns
    /// the first failure of that ticket only.
    fn synchronize(&self, _ticket: u64) -> Result<()> {
        Ok(())
    }
}
