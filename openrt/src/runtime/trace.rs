use std::fmt;

use serde::ser::{SerializeStruct, Serializer};
use uuid::Uuid;

use crate::graph::{NodeId, OpKind};

/// Kind of trace event emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceEventKind {
    OpExecute,
    Transfer,
    Reorder,
    /// The executor waited for an asynchronous engine.
    Sync,
}

impl TraceEventKind {
    pub(crate) fn for_op(op: OpKind) -> Self {
        match op {
            OpKind::Transfer => TraceEventKind::Transfer,
            OpKind::Reorder => TraceEventKind::Reorder,
            _ => TraceEventKind::OpExecute,
        }
    }
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::OpExecute => write!(f, "OpExecute"),
            TraceEventKind::Transfer => write!(f, "Transfer"),
            TraceEventKind::Reorder => write!(f, "Reorder"),
            TraceEventKind::Sync => write!(f, "Sync"),
        }
    }
}

/// Execution trace record for one step of the schedule.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// Position in the execution order.
    pub node_index: usize,
    pub node: NodeId,
    pub node_uuid: Uuid,
    pub node_desc: String,
    pub engine: String,
    pub kernel: String,
    /// Launch time; enqueue time on asynchronous engines. Zero without the
    /// `timer` option.
    pub micros: u64,
}

impl serde::Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 7)?;
        state.serialize_field("node_index", &self.node_index)?;
        state.serialize_field("node_uuid", &self.node_uuid)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("node", &self.node_desc)?;
        state.serialize_field("engine", &self.engine)?;
        state.serialize_field("kernel", &self.kernel)?;
        state.serialize_field("micros", &self.micros)?;
        state.end()
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} on {} ({}) {}us",
            self.node_index, self.kind, self.node_desc, self.engine, self.kernel, self.micros
        )
    }
}
