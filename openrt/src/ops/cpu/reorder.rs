use anyhow::{anyhow, Result};
use rayon::prelude::*;

use crate::ops::{InView, KernelArgs, OutView};
use crate::tensor::{blocked_offset, numel, round_up, DataLayout, TensorElement};

/// Convert between any two layouts of the same logical `[N, C, X...]` tensor.
/// Padding lanes of a blocked destination are zeroed.
pub fn reorder<T: TensorElement>(args: &KernelArgs) -> Result<()> {
    let src = args.input(0)?;
    let dst = args.output(0)?;
    if src.dims != dst.dims {
        return Err(anyhow!(
            "reorder cannot change shape {:?} -> {:?}",
            src.dims,
            dst.dims
        ));
    }
    let vs: InView<T> = src.view()?;
    let vd: OutView<T> = dst.view_mut()?;
    if src.layout == dst.layout {
        (0..vd.len()).for_each(|i| vd.set(i, vs.get(i)));
        return Ok(());
    }
    if src.rank() < 3 {
        return Err(anyhow!("blocked layouts need rank >= 3, got {:?}", src.dims));
    }
    let (batch, channels) = (src.dims[0], src.dims[1]);
    let spatial = numel(&src.dims[2..]);
    let (from, to) = (src.layout, dst.layout);
    (0..batch * channels).into_par_iter().for_each(|nc| {
        let (n, c) = (nc / channels, nc % channels);
        for s in 0..spatial {
            let v = vs.get(blocked_offset(from, channels, spatial, n, c, s));
            vd.set(blocked_offset(to, channels, spatial, n, c, s), v);
        }
    });
    zero_padding(&vd, to, batch, channels, spatial);
    Ok(())
}

pub(crate) fn zero_padding<T: TensorElement>(
    out: &OutView<T>,
    layout: DataLayout,
    batch: usize,
    channels: usize,
    spatial: usize,
) {
    let Some(block) = layout.block() else { return };
    let padded = round_up(channels, block);
    for n in 0..batch {
        for c in channels..padded {
            for s in 0..spatial {
                out.set(blocked_offset(layout, padded, spatial, n, c, s), T::default());
            }
        }
    }
}
