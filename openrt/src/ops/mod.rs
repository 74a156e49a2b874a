mod args;
pub mod cpu;
pub mod descriptor;

pub use args::{InView, KernelArgs, OutView, TensorArg};
pub use descriptor::{
    descriptor, LayerNormOperands, LayoutChoice, LayoutContext, OpDescriptor, TypeContext,
};
