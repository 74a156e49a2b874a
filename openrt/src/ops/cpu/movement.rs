use anyhow::{anyhow, Result};
use rayon::prelude::*;

use crate::ops::{InView, KernelArgs, OutView};
use crate::tensor::{compute_strides, normalize_axis, numel, TensorElement};

use super::elementwise::MIN_SPLIT;

/// Byte copy for ops that only relabel the shape. A no-op when the memory
/// plan placed the output on top of the input.
pub fn copy_or_alias(args: &KernelArgs) -> Result<()> {
    let src = args.input(0)?;
    let dst = args.output(0)?;
    if src.same_buffer(dst) {
        return Ok(());
    }
    if src.bytes != dst.bytes {
        return Err(anyhow!(
            "copy size mismatch: {} bytes into {}",
            src.bytes,
            dst.bytes
        ));
    }
    // Distinct live buffers never overlap in the arena.
    unsafe {
        std::ptr::copy_nonoverlapping(src.as_ptr() as *const u8, dst.as_ptr(), src.bytes);
    }
    Ok(())
}

/// Permutation from the `perm` attribute, defaulting to reversed axes.
pub fn resolve_perm(perm: Option<Vec<i64>>, rank: usize) -> Result<Vec<usize>> {
    let perm = match perm {
        None => return Ok((0..rank).rev().collect()),
        Some(perm) => perm,
    };
    if perm.len() != rank {
        return Err(anyhow!("perm {:?} does not match rank {}", perm, rank));
    }
    let mut seen = vec![false; rank];
    let mut out = Vec::with_capacity(rank);
    for axis in perm {
        let axis = normalize_axis(axis, rank)?;
        if seen[axis] {
            return Err(anyhow!("perm repeats axis {}", axis));
        }
        seen[axis] = true;
        out.push(axis);
    }
    Ok(out)
}

pub fn transpose<T: TensorElement>(args: &KernelArgs) -> Result<()> {
    let a = args.input(0)?;
    let out = args.output(0)?;
    let perm = resolve_perm(args.attrs.int_list("perm")?, a.rank())?;
    let in_strides = compute_strides(&a.dims);
    let mapped: Vec<usize> = perm.iter().map(|p| in_strides[*p]).collect();
    let out_dims = out.dims.clone();
    let va: InView<T> = a.view()?;
    let vo: OutView<T> = out.view_mut()?;
    (0..numel(&out_dims))
        .into_par_iter()
        .with_min_len(MIN_SPLIT)
        .for_each(|i| {
            let mut rem = i;
            let mut offset = 0usize;
            for k in (0..out_dims.len()).rev() {
                offset += (rem % out_dims[k]) * mapped[k];
                rem /= out_dims[k];
            }
            vo.set(i, va.get(offset));
        });
    Ok(())
}

pub fn concat<T: TensorElement>(args: &KernelArgs) -> Result<()> {
    let out = args.output(0)?;
    let axis = normalize_axis(args.attrs.int("axis")?.unwrap_or(0), out.rank())?;
    let outer = numel(&out.dims[..axis]);
    let inner = numel(&out.dims[axis + 1..]);
    let out_row = out.dims[axis] * inner;
    let vo: OutView<T> = out.view_mut()?;
    let mut base = 0usize;
    for input in &args.inputs {
        let chunk = input.dims[axis] * inner;
        let vi: InView<T> = input.view()?;
        (0..outer).into_par_iter().for_each(|o| {
            for j in 0..chunk {
                vo.set(o * out_row + base + j, vi.get(o * chunk + j));
            }
        });
        base += chunk;
    }
    Ok(())
}
