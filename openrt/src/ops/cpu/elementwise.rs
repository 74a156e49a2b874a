use anyhow::{anyhow, Result};
use rayon::prelude::*;

use crate::ops::{InView, KernelArgs, OutView};
use crate::tensor::{
    broadcast_offset, broadcast_strides, is_padding_lane, DataLayout, TensorElement,
};

pub(crate) const MIN_SPLIT: usize = 4096;

/// `out = f(a, b)` with NumPy broadcasting in `NdArray`, identical shapes
/// in blocked layouts. `out` may alias `a`.
pub fn binary<T, F>(args: &KernelArgs, f: F) -> Result<()>
where
    T: TensorElement,
    F: Fn(T, T) -> T + Send + Sync,
{
    let a = args.input(0)?;
    let b = args.input(1)?;
    let out = args.output(0)?;
    let va: InView<T> = a.view()?;
    let vb: InView<T> = b.view()?;
    let vo: OutView<T> = out.view_mut()?;

    let same = a.dims == out.dims && b.dims == out.dims;
    if out.layout != DataLayout::NdArray || same {
        if !same || a.layout != out.layout || b.layout != out.layout {
            return Err(anyhow!(
                "blocked elementwise needs matching shapes and layouts, got {:?}/{} and {:?}/{}",
                a.dims,
                a.layout,
                b.dims,
                b.layout
            ));
        }
        let (channels, spatial) = channel_split(&out.dims);
        let layout = out.layout;
        (0..vo.len())
            .into_par_iter()
            .with_min_len(MIN_SPLIT)
            .for_each(|i| {
                if is_padding_lane(layout, channels, spatial, i) {
                    vo.set(i, T::default());
                } else {
                    vo.set(i, f(va.get(i), vb.get(i)));
                }
            });
        return Ok(());
    }

    let a_strides = broadcast_strides(&a.dims, &out.dims);
    let b_strides = broadcast_strides(&b.dims, &out.dims);
    let out_dims = &out.dims;
    (0..out.numel())
        .into_par_iter()
        .with_min_len(MIN_SPLIT)
        .for_each(|i| {
            let x = va.get(broadcast_offset(i, out_dims, &a_strides));
            let y = vb.get(broadcast_offset(i, out_dims, &b_strides));
            vo.set(i, f(x, y));
        });
    Ok(())
}

/// `(C, X)` of an `[N, C, X...]` shape; padding checks only run on blocked data.
pub(crate) fn channel_split(dims: &[usize]) -> (usize, usize) {
    let channels = dims.get(1).copied().unwrap_or(1);
    let spatial = dims.iter().skip(2).product::<usize>();
    (channels, spatial)
}

/// `out = f(a)` over every stored lane; padding lanes stay zero. `out` may
/// alias `a`.
pub fn unary<T, F>(args: &KernelArgs, f: F) -> Result<()>
where
    T: TensorElement,
    F: Fn(T) -> T + Send + Sync,
{
    let a = args.input(0)?;
    let out = args.output(0)?;
    if a.layout != out.layout || a.dims != out.dims {
        return Err(anyhow!("unary kernel needs identical input and output descriptors"));
    }
    let va: InView<T> = a.view()?;
    let vo: OutView<T> = out.view_mut()?;
    let (channels, spatial) = channel_split(&out.dims);
    let layout = out.layout;
    (0..vo.len())
        .into_par_iter()
        .with_min_len(MIN_SPLIT)
        .for_each(|i| {
            if is_padding_lane(layout, channels, spatial, i) {
                vo.set(i, T::default());
            } else {
                vo.set(i, f(va.get(i)));
            }
        });
    Ok(())
}

pub fn add<T: TensorElement + std::ops::Add<Output = T>>(args: &KernelArgs) -> Result<()> {
    binary::<T, _>(args, |x, y| x + y)
}

pub fn mul<T: TensorElement + std::ops::Mul<Output = T>>(args: &KernelArgs) -> Result<()> {
    binary::<T, _>(args, |x, y| x * y)
}

// Integer arithmetic wraps instead of panicking in debug builds.
macro_rules! wrapping_kernels {
    ($($add:ident, $mul:ident: $t:ty);* $(;)?) => {
        $(
            pub fn $add(args: &KernelArgs) -> Result<()> {
                binary::<$t, _>(args, <$t>::wrapping_add)
            }

            pub fn $mul(args: &KernelArgs) -> Result<()> {
                binary::<$t, _>(args, <$t>::wrapping_mul)
            }
        )*
    };
}

wrapping_kernels! {
    add_u8, mul_u8: u8;
    add_i32, mul_i32: i32;
    add_i64, mul_i64: i64;
}

pub fn relu<T: TensorElement + PartialOrd>(args: &KernelArgs) -> Result<()> {
    let zero = T::default();
    unary::<T, _>(args, move |x| if x > zero { x } else { zero })
}

pub fn sigmoid_f32(args: &KernelArgs) -> Result<()> {
    unary::<f32, _>(args, |x| 1.0 / (1.0 + (-x).exp()))
}

pub fn sigmoid_f64(args: &KernelArgs) -> Result<()> {
    unary::<f64, _>(args, |x| 1.0 / (1.0 + (-x).exp()))
}
