use anyhow::Result;
use rayon::prelude::*;

use crate::dispatch_dtype;
use crate::ops::{InView, KernelArgs, OutView};
use crate::tensor::TensorElement;

use super::elementwise::MIN_SPLIT;

/// Convert every stored lane; padding lanes map zero to zero.
pub fn cast(args: &KernelArgs) -> Result<()> {
    let src = args.input(0)?.dtype;
    let dst = args.output(0)?.dtype;
    dispatch_dtype!(src, S => dispatch_dtype!(dst, D => cast_typed::<S, D>(args)))
}

fn cast_typed<S: TensorElement, D: TensorElement>(args: &KernelArgs) -> Result<()> {
    let a: InView<S> = args.input(0)?.view()?;
    let out: OutView<D> = args.output(0)?.view_mut()?;
    (0..out.len())
        .into_par_iter()
        .with_min_len(MIN_SPLIT)
        .for_each(|i| out.set(i, D::from_f64(a.get(i).to_f64())));
    Ok(())
}
