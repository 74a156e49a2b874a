//! Kernel call arguments.
//!
//! A kernel gets raw views into the plan arena. Inputs and outputs may alias
//! when the memory plan runs a node in place, so element access goes through
//! raw pointer reads and writes instead of slices.
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::graph::{NodeId, OpAttrs};
use crate::tensor::{compute_strides, numel, DType, DataLayout, TensorDesc, TensorElement};

/// One tensor operand: a byte range in the arena plus its descriptor.
#[derive(Debug, Clone)]
pub struct TensorArg {
    ptr: *mut u8,
    pub bytes: usize,
    pub dims: Vec<usize>,
    pub dtype: DType,
    pub layout: DataLayout,
}

// The executor keeps the arena alive and unaliased (apart from planned in-place
// pairs) until every engine has synchronized.
unsafe impl Send for TensorArg {}
unsafe impl Sync for TensorArg {}

impl TensorArg {
    /// # Safety
    /// `ptr..ptr + bytes` must stay valid for the lifetime of the kernel call.
    pub unsafe fn new(ptr: *mut u8, bytes: usize, desc: &TensorDesc) -> Result<Self> {
        let needed = desc.bytes()?;
        if needed > bytes {
            return Err(anyhow!(
                "buffer of {} bytes too small for {} ({} bytes)",
                bytes,
                desc,
                needed
            ));
        }
        Ok(Self {
            ptr,
            bytes: needed,
            dims: desc.shape()?,
            dtype: desc.dtype()?,
            layout: desc.layout,
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Logical row-major strides; only meaningful for `NdArray`.
    pub fn strides(&self) -> Vec<usize> {
        compute_strides(&self.dims)
    }

    pub fn numel(&self) -> usize {
        numel(&self.dims)
    }

    /// Stored element count, padding lanes included.
    pub fn padded_numel(&self) -> usize {
        self.bytes / self.dtype.size()
    }

    pub fn same_buffer(&self, other: &TensorArg) -> bool {
        self.ptr == other.ptr
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn view<T: TensorElement>(&self) -> Result<InView<T>> {
        self.check::<T>()?;
        Ok(InView {
            ptr: self.ptr as *const T,
            len: self.padded_numel(),
            _marker: PhantomData,
        })
    }

    pub fn view_mut<T: TensorElement>(&self) -> Result<OutView<T>> {
        self.check::<T>()?;
        Ok(OutView {
            ptr: self.ptr as *mut T,
            len: self.padded_numel(),
            _marker: PhantomData,
        })
    }

    fn check<T: TensorElement>(&self) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(anyhow!(
                "kernel expects {} data, operand is {}",
                T::DTYPE,
                self.dtype
            ));
        }
        if (self.ptr as usize) % std::mem::align_of::<T>() != 0 {
            return Err(anyhow!("operand is not aligned for {}", self.dtype));
        }
        Ok(())
    }
}

/// Read-only element view.
pub struct InView<T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<T>,
}

/// Writable element view.
pub struct OutView<T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for InView<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for InView<T> {}
impl<T> Clone for OutView<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for OutView<T> {}

// Views are handed to rayon workers that touch disjoint index ranges.
unsafe impl<T: Send> Send for InView<T> {}
unsafe impl<T: Sync> Sync for InView<T> {}
unsafe impl<T: Send> Send for OutView<T> {}
unsafe impl<T: Sync> Sync for OutView<T> {}

impl<T: TensorElement> InView<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len, "read {} past operand of {}", index, self.len);
        unsafe { self.ptr.add(index).read() }
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len).map(|i| self.get(i)).collect()
    }
}

impl<T: TensorElement> OutView<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len, "read {} past operand of {}", index, self.len);
        unsafe { self.ptr.add(index).read() }
    }

    #[inline]
    pub fn set(&self, index: usize, value: T) {
        assert!(index < self.len, "write {} past operand of {}", index, self.len);
        unsafe { self.ptr.add(index).write(value) }
    }

    pub fn fill(&self, value: T) {
        for i in 0..self.len {
            self.set(i, value);
        }
    }
}

/// Everything a kernel sees for one node invocation.
#[derive(Debug, Clone)]
pub struct KernelArgs {
    pub node: NodeId,
    /// Run that submitted the launch; asynchronous engines report failures
    /// per ticket.
    pub ticket: u64,
    pub inputs: Vec<TensorArg>,
    pub outputs: Vec<TensorArg>,
    pub attrs: Arc<OpAttrs>,
}

impl KernelArgs {
    pub fn input(&self, index: usize) -> Result<&TensorArg> {
        self.inputs
            .get(index)
            .ok_or_else(|| anyhow!("node {} missing input {}", self.node, index))
    }

    pub fn output(&self, index: usize) -> Result<&TensorArg> {
        self.outputs
            .get(index)
            .ok_or_else(|| anyhow!("node {} missing output {}", self.node, index))
    }
}

/// Run `$body` with `$t` bound to the host type of `$dtype`.
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::tensor::DType::F32 => {
                type $t = f32;
                $body
            }
            $crate::tensor::DType::F64 => {
                type $t = f64;
                $body
            }
            $crate::tensor::DType::I32 => {
                type $t = i32;
                $body
            }
            $crate::tensor::DType::I64 => {
                type $t = i64;
                $body
            }
            $crate::tensor::DType::U8 => {
                type $t = u8;
                $body
            }
        }
    };
}
