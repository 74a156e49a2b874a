use anyhow::{anyhow, Result};
use rayon::prelude::*;

use crate::ops::{InView, KernelArgs, LayerNormOperands, OutView};
use crate::tensor::{blocked_offset, normalize_axis, numel, TensorElement};

pub const DEFAULT_EPSILON: f64 = 1e-5;

fn epsilon(args: &KernelArgs) -> Result<f64> {
    Ok(args.attrs.float("epsilon")?.unwrap_or(DEFAULT_EPSILON))
}

/// Normalize over dims `[axis..]`, one row per rayon task. With
/// `skip_term` the residual is added to `x` first.
pub fn layer_norm<T: TensorElement>(args: &KernelArgs) -> Result<()> {
    let x = args.input(0)?;
    let out = args.output(0)?;
    let axis = normalize_axis(args.attrs.int("axis")?.unwrap_or(-1), x.rank())?;
    let eps = epsilon(args)?;
    let operands = LayerNormOperands::resolve(&args.attrs, args.inputs.len())?;
    let inner = numel(&x.dims[axis..]);
    if inner == 0 {
        return Ok(());
    }
    let rows = x.numel() / inner;
    let param = |slot: Option<usize>| -> Result<Option<InView<T>>> {
        slot.map(|i| args.input(i)?.view()).transpose()
    };
    let scale = param(operands.scale)?;
    let bias = param(operands.bias)?;
    let skip = param(operands.skip)?;
    for p in [&scale, &bias].into_iter().flatten() {
        if p.len() != inner {
            return Err(anyhow!(
                "layer_norm parameter has {} values, normalized size is {}",
                p.len(),
                inner
            ));
        }
    }
    if let Some(s) = &skip {
        if s.len() != x.numel() {
            return Err(anyhow!(
                "layer_norm residual has {} values, input has {}",
                s.len(),
                x.numel()
            ));
        }
    }
    let vx: InView<T> = x.view()?;
    let vo: OutView<T> = out.view_mut()?;
    (0..rows).into_par_iter().for_each(|r| {
        let base = r * inner;
        let value = |j: usize| {
            let v = vx.get(base + j).to_f64();
            match &skip {
                Some(s) => v + s.get(base + j).to_f64(),
                None => v,
            }
        };
        let mean = (0..inner).map(value).sum::<f64>() / inner as f64;
        let var = (0..inner)
            .map(|j| {
                let d = value(j) - mean;
                d * d
            })
            .sum::<f64>()
            / inner as f64;
        let inv = 1.0 / (var + eps).sqrt();
        for j in 0..inner {
            let mut v = (value(j) - mean) * inv;
            if let Some(s) = &scale {
                v *= s.get(j).to_f64();
            }
            if let Some(b) = &bias {
                v += b.get(j).to_f64();
            }
            vo.set(base + j, T::from_f64(v));
        }
    });
    Ok(())
}

/// Per-(batch, channel) normalization over the spatial extent. Reads and
/// writes through the layout's offset map, so blocked data works directly.
pub fn instance_norm<T: TensorElement>(args: &KernelArgs) -> Result<()> {
    let x = args.input(0)?;
    let out = args.output(0)?;
    if x.rank() < 3 {
        return Err(anyhow!("instance_norm needs rank >= 3, got {:?}", x.dims));
    }
    let eps = epsilon(args)?;
    let (batch, channels) = (x.dims[0], x.dims[1]);
    let spatial = numel(&x.dims[2..]);
    let scale: InView<T> = args.input(1)?.view()?;
    let bias: InView<T> = args.input(2)?.view()?;
    if scale.len() != channels || bias.len() != channels {
        return Err(anyhow!(
            "instance_norm parameters need {} values, got {} and {}",
            channels,
            scale.len(),
            bias.len()
        ));
    }
    let (in_layout, out_layout) = (x.layout, out.layout);
    let vx: InView<T> = x.view()?;
    let vo: OutView<T> = out.view_mut()?;
    (0..batch * channels).into_par_iter().for_each(|nc| {
        let (n, c) = (nc / channels, nc % channels);
        let at = |s: usize| blocked_offset(in_layout, channels, spatial, n, c, s);
        let mean = (0..spatial).map(|s| vx.get(at(s)).to_f64()).sum::<f64>() / spatial as f64;
        let var = (0..spatial)
            .map(|s| {
                let d = vx.get(at(s)).to_f64() - mean;
                d * d
            })
            .sum::<f64>()
            / spatial as f64;
        let inv = 1.0 / (var + eps).sqrt();
        let (g, b) = (scale.get(c).to_f64(), bias.get(c).to_f64());
        for s in 0..spatial {
            let v = (vx.get(at(s)).to_f64() - mean) * inv * g + b;
            vo.set(blocked_offset(out_layout, channels, spatial, n, c, s), T::from_f64(v));
        }
    });
    super::reorder::zero_padding(&vo, out_layout, batch, channels, spatial);
    Ok(())
}
