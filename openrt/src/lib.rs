//! Graph compilation and execution core for multi-backend inference.
//!
//! A [`Graph`] is optimized for an ordered list of engines by [`compile`],
//! which infers types and shapes, partitions nodes across engines, picks
//! layouts and kernels, and plans one arena for every intermediate tensor.
//! The resulting [`ExecutionPlan`] runs repeatedly and can be persisted with
//! [`serialize`] and [`deserialize`].
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
mod macros;
mod model_loader;
pub mod ops;
pub mod optimizer;
pub mod planner;
mod random;
pub mod registry;
pub mod runtime;
pub mod tensor;

pub use codec::{deserialize, load, save, serialize};
pub use config::{CompileOptions, PartitionMode};
pub use engine::stock as engines;
pub use engine::{AccelEngine, CpuEngine, Engine, EngineBuilder, EngineKind};
pub use error::{failed_node, ret_code, RetCode, RtError};
pub use graph::{
    AttrValue, Edge, EdgeId, EdgeRole, Graph, GraphDeserialize, GraphSerialize, Node, NodeId,
    OpAttr, OpAttrs, OpKind,
};
pub use model_loader::ModelLoader;
pub use optimizer::{AffinityPolicy, OptNode, PartitionContext, PartitionPolicy, PriorityPolicy};
pub use planner::MemoryPlan;
pub use random::{Random, RandomValue};
pub use runtime::{
    compile, ExecutionPlan, Fetchable, Outputs, PlanStats, RunState, TraceEvent, TraceEventKind,
};
pub use tensor::{DType, DataLayout, Dim, Tensor, TensorDesc, TensorElement, TensorValue};
