use serde::Serialize;

use crate::error::RetCode;
use crate::graph::NodeId;

/// Lifecycle of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Planned,
    Running,
    Completed,
    Failed {
        node: Option<NodeId>,
        code: RetCode,
    },
}

/// Counters kept across runs of one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanStats {
    pub runs: u64,
    /// Input shape changes absorbed by shape-only re-inference.
    pub reinferences: u64,
    /// Full rebuilds from the source graph.
    pub repartitions: u64,
    /// Arena rebuilds after buffers outgrew their slots.
    pub memory_replans: u64,
}
