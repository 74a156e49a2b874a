mod kernels;
mod op_attrs;
mod op_defs;

pub use kernels::{KernelEntry, KernelFn, KernelKey, KernelRegistry, ShapeClass};
pub use op_attrs::{OpAttrDef, OpAttrType, ScalarAttrKind};
pub use op_defs::{check_node, op_def, InputArity, OpDef, OPS};
