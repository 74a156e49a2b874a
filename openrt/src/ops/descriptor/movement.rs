use anyhow::Result;

use crate::graph::{OpAttrs, OpKind};
use crate::ops::cpu::movement::resolve_perm;
use crate::tensor::{normalize_axis, numel};

use super::{invalid_value, OpDescriptor};

pub struct Squeeze;

impl OpDescriptor for Squeeze {
    fn kind(&self) -> OpKind {
        OpKind::Squeeze
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let shape = &inputs[0];
        let axes = attrs.int_list("axes").map_err(|e| invalid_value(e.to_string()))?;
        let out = match axes {
            None => shape.iter().copied().filter(|d| *d != 1).collect(),
            Some(axes) => {
                let mut drop = vec![false; shape.len()];
                for axis in axes {
                    let axis = normalize_axis(axis, shape.len())
                        .map_err(|e| invalid_value(format!("squeeze: {}", e)))?;
                    if shape[axis] != 1 {
                        return Err(invalid_value(format!(
                            "squeeze axis {} has size {}, expected 1",
                            axis, shape[axis]
                        )));
                    }
                    drop[axis] = true;
                }
                shape
                    .iter()
                    .zip(drop)
                    .filter(|(_, d)| !d)
                    .map(|(s, _)| *s)
                    .collect()
            }
        };
        Ok(vec![out])
    }
}

pub struct Unsqueeze;

impl OpDescriptor for Unsqueeze {
    fn kind(&self) -> OpKind {
        OpKind::Unsqueeze
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let shape = &inputs[0];
        let axes = attrs
            .int_list("axes")
            .map_err(|e| invalid_value(e.to_string()))?
            .ok_or_else(|| invalid_value("unsqueeze requires axes"))?;
        let rank = shape.len() + axes.len();
        let mut insert = vec![false; rank];
        for axis in axes {
            let axis = normalize_axis(axis, rank)
                .map_err(|e| invalid_value(format!("unsqueeze: {}", e)))?;
            if insert[axis] {
                return Err(invalid_value(format!("unsqueeze repeats axis {}", axis)));
            }
            insert[axis] = true;
        }
        let mut dims = shape.iter();
        let out = insert
            .into_iter()
            .map(|new| if new { 1 } else { dims.next().copied().unwrap_or(1) })
            .collect();
        Ok(vec![out])
    }
}

pub struct Reshape;

impl OpDescriptor for Reshape {
    fn kind(&self) -> OpKind {
        OpKind::Reshape
    }

    /// `0` copies the input dim at that index, one `-1` absorbs the rest.
    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let shape = &inputs[0];
        let target = attrs
            .int_list("shape")
            .map_err(|e| invalid_value(e.to_string()))?
            .ok_or_else(|| invalid_value("reshape requires shape"))?;
        let total = numel(shape);
        let mut out = Vec::with_capacity(target.len());
        let mut infer_at = None;
        for (i, dim) in target.iter().enumerate() {
            match *dim {
                -1 if infer_at.is_none() => {
                    infer_at = Some(i);
                    out.push(1);
                }
                -1 => return Err(invalid_value("reshape allows a single -1")),
                0 => out.push(*shape.get(i).ok_or_else(|| {
                    invalid_value(format!("reshape copies missing dim {}", i))
                })?),
                d if d > 0 => out.push(d as usize),
                d => return Err(invalid_value(format!("reshape dim {} is invalid", d))),
            }
        }
        let known = numel(&out);
        if let Some(i) = infer_at {
            if known == 0 || total % known != 0 {
                return Err(invalid_value(format!("cannot reshape {:?} into {:?}", shape, target)));
            }
            out[i] = total / known;
        }
        if numel(&out) != total {
            return Err(invalid_value(format!("cannot reshape {:?} into {:?}", shape, target)));
        }
        Ok(vec![out])
    }
}

pub struct Transpose;

impl OpDescriptor for Transpose {
    fn kind(&self) -> OpKind {
        OpKind::Transpose
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let shape = &inputs[0];
        let perm = attrs
            .int_list("perm")
            .and_then(|perm| resolve_perm(perm, shape.len()))
            .map_err(|e| invalid_value(format!("transpose: {}", e)))?;
        Ok(vec![perm.iter().map(|p| shape[*p]).collect()])
    }
}

pub struct Concat;

impl OpDescriptor for Concat {
    fn kind(&self) -> OpKind {
        OpKind::Concat
    }

    fn infer_shape(&self, attrs: &OpAttrs, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let first = &inputs[0];
        let axis = attrs
            .int("axis")
            .and_then(|axis| normalize_axis(axis.unwrap_or(0), first.len()))
            .map_err(|e| invalid_value(format!("concat: {}", e)))?;
        let mut out = first.clone();
        for shape in &inputs[1..] {
            let compatible = shape.len() == first.len()
                && shape
                    .iter()
                    .zip(first.iter())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(invalid_value(format!(
                    "concat along {} cannot join {:?} and {:?}",
                    axis, first, shape
                )));
            }
            out[axis] += shape[axis];
        }
        Ok(vec![out])
    }
}
