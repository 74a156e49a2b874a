mod ir;
mod node;
mod serde;
mod types;

pub use ir::Graph;
pub use node::{Edge, EdgeId, EdgeRole, Node, NodeId};
pub use serde::{GraphDeserialize, GraphSerialize};
pub use types::{AttrValue, OpAttr, OpAttrs, OpKind, ALL_OPS};
