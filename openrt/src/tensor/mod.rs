mod desc;
mod dtype;
mod layout;
mod shape;
mod tensor;
mod value;

pub use desc::{Dim, TensorDesc};
pub use dtype::{DType, TensorElement, ALL_DTYPES};
pub use layout::{blocked_offset, is_padding_lane, DataLayout, ALL_LAYOUTS};
pub use shape::{
    broadcast_offset, broadcast_shape, broadcast_strides, checked_numel, compute_strides,
    normalize_axis, numel, round_up,
};
pub use tensor::Tensor;
pub use value::TensorValue;
