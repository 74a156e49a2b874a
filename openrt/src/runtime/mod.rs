//! Execution plans: compile, run, re-run with new shapes.
mod arena;
mod executor;
mod outputs;
mod plan;
mod reinfer;
mod state;
mod trace;

pub use outputs::{Fetchable, Outputs};
pub use plan::{compile, ExecutionPlan};
pub(crate) use plan::assemble;
pub use state::{PlanStats, RunState};
pub use trace::{TraceEvent, TraceEventKind};
