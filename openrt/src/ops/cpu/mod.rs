//! Portable reference kernels shared by the stock CPU and accelerator engines.
pub mod cast;
pub mod elementwise;
pub mod movement;
pub mod norm;
pub mod registry;
pub mod reorder;

pub use registry::{reference_kernel, reference_layouts};
