use anyhow::{anyhow, Result};

use crate::error::{rt_error, RetCode};

/// Element count; saturates instead of wrapping, so an oversized shape never
/// matches a real buffer length.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().fold(1usize, |acc, d| acc.saturating_mul(*d))
}

/// Element count, `RC_INVALID_VALUE` when it does not fit in `usize`.
pub fn checked_numel(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| overflow(shape))
}

pub(crate) fn overflow(shape: &[usize]) -> anyhow::Error {
    rt_error(
        RetCode::InvalidValue,
        format!("shape {:?} is too large to address", shape),
    )
}

pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1usize;
    for (idx, dim) in shape.iter().rev().enumerate() {
        let i = shape.len() - 1 - idx;
        strides[i] = stride;
        stride = stride.saturating_mul(*dim);
    }
    strides
}

pub fn round_up(value: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

/// Map a possibly negative axis into `0..rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let rank_i = rank as i64;
    let normalized = if axis < 0 { axis + rank_i } else { axis };
    if normalized < 0 || normalized >= rank_i {
        return Err(anyhow!("axis {} out of range for rank {}", axis, rank));
    }
    Ok(normalized as usize)
}

/// NumPy-style broadcast of two shapes.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        out[i] = if da == db {
            da
        } else if da == 1 {
            db
        } else if db == 1 {
            da
        } else {
            return Err(anyhow!("cannot broadcast {:?} with {:?}", a, b));
        };
    }
    Ok(out)
}

/// Strides of `shape` viewed through `out_shape`; broadcast dims get 0.
pub fn broadcast_strides(shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let strides = compute_strides(shape);
    let offset = out_shape.len() - shape.len();
    let mut out = vec![0usize; out_shape.len()];
    for (i, (dim, stride)) in shape.iter().zip(strides.iter()).enumerate() {
        if *dim != 1 {
            out[i + offset] = *stride;
        }
    }
    out
}

/// Offset into a broadcast operand for the flat output index `linear`.
pub fn broadcast_offset(linear: usize, out_shape: &[usize], strides: &[usize]) -> usize {
    let mut rem = linear;
    let mut offset = 0usize;
    for i in (0..out_shape.len()).rev() {
        let dim = out_shape[i];
        if dim == 0 {
            return 0;
        }
        offset += (rem % dim) * strides[i];
        rem /= dim;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_follows_trailing_dims() -> Result<()> {
        assert_eq!(broadcast_shape(&[2, 3, 4], &[4])?, vec![2, 3, 4]);
        assert_eq!(broadcast_shape(&[2, 1], &[1, 5])?, vec![2, 5]);
        assert!(broadcast_shape(&[2, 3], &[4]).is_err());
        Ok(())
    }

    #[test]
    fn broadcast_offset_repeats_rows() {
        let strides = broadcast_strides(&[3], &[2, 3]);
        let offsets: Vec<usize> = (0..6).map(|i| broadcast_offset(i, &[2, 3], &strides)).collect();
        assert_eq!(offsets, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn negative_axes_wrap() -> Result<()> {
        assert_eq!(normalize_axis(-1, 4)?, 3);
        assert_eq!(normalize_axis(0, 1)?, 0);
        assert!(normalize_axis(4, 4).is_err());
        Ok(())
    }
}
