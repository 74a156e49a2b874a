#[path = "common/mod.rs"]
mod common;

#[path = "graph/graph_order.rs"]
mod graph_order;
#[path = "graph/model_loader.rs"]
mod model_loader;
#[path = "planner/inplace.rs"]
mod inplace;
#[path = "runtime/layouts.rs"]
mod layouts;
#[path = "runtime/norms.rs"]
mod norms;
#[path = "runtime/partition.rs"]
mod partition;
#[path = "runtime/reshape.rs"]
mod reshape;
#[path = "runtime/errors.rs"]
mod errors;
#[path = "runtime/async_engines.rs"]
mod async_engines;
#[path = "codec/plan_blob.rs"]
mod plan_blob;
