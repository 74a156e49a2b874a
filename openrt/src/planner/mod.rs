//! Arena layout for one execution plan.
//!
//! Pinned edges (graph inputs, outputs and constants) get dedicated slots at
//! the start of the arena. Everything else is packed greedily by first use:
//! a slot is reusable once its edge's last use lies strictly before the
//! current position, and the lowest gap that fits wins. Eligible operators
//! may write their output over their first input.
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::{rt_error, with_code, RetCode};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::optimizer::{opt_of, OptNode};
use crate::tensor::round_up;

mod lifetime;

pub use lifetime::Lifetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub offset: usize,
    pub size: usize,
}

impl Slot {
    fn end(&self) -> usize {
        self.offset + self.size
    }

    fn overlaps(&self, other: &Slot) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Dedicated slot of an input, output or constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedSlot {
    pub edge: EdgeId,
    pub name: String,
    pub offset: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryPlan {
    pub alignment: usize,
    /// Arena size in bytes.
    pub total: usize,
    slots: Vec<Option<Slot>>,
    lifetimes: Vec<Option<Lifetime>>,
    pinned: Vec<PinnedSlot>,
    /// `(input, output)` pairs sharing one slot.
    inplace: Vec<(EdgeId, EdgeId)>,
}

struct Active {
    edge: EdgeId,
    slot: Slot,
    last: usize,
}

fn edge_bytes(graph: &Graph, edge: EdgeId) -> Result<usize> {
    let e = graph.edge(edge)?;
    let desc = e
        .desc
        .as_ref()
        .ok_or_else(|| rt_error(RetCode::InvalidValue, format!("edge {} is not inferred", e.name)))?;
    desc.bytes().map_err(|err| with_code(err, RetCode::InvalidValue))
}

/// Plan the arena for `order`.
pub fn plan_memory(
    graph: &Graph,
    order: &[NodeId],
    opt: &[Option<OptNode>],
    engines: &[Arc<dyn Engine>],
    alignment: usize,
) -> Result<MemoryPlan> {
    let lifetimes = lifetime::lifetimes(graph, order, opt, engines)?;
    let slot_size = |bytes: usize| round_up(bytes.max(1), alignment);
    let mut slots: Vec<Option<Slot>> = vec![None; graph.edge_capacity()];

    let mut pinned = Vec::new();
    let mut cursor = 0;
    for edge in graph.edges().filter(|e| e.is_pinned()) {
        let bytes = edge_bytes(graph, edge.id)?;
        let slot = Slot {
            offset: cursor,
            size: slot_size(bytes),
        };
        slots[edge.id.0] = Some(slot);
        pinned.push(PinnedSlot {
            edge: edge.id,
            name: edge.name.clone(),
            offset: slot.offset,
            bytes,
        });
        cursor = slot.end();
    }
    let base = cursor;

    let mut shared: Vec<(Lifetime, EdgeId)> = graph
        .edges()
        .filter(|e| !e.is_pinned())
        .filter_map(|e| lifetimes[e.id.0].map(|life| (life, e.id)))
        .collect();
    shared.sort_by_key(|(life, edge)| (life.first, *edge));

    let mut inplace = Vec::new();
    let mut active: Vec<Active> = Vec::new();
    let mut total = base;
    for (life, edge) in shared {
        active.retain(|a| a.last >= life.first);
        let size = slot_size(edge_bytes(graph, edge)?);
        if let Some(src) = inplace_source(graph, opt, edge, &lifetimes, life)? {
            if let Some(entry) = active.iter_mut().find(|a| a.edge == src && a.slot.size >= size) {
                entry.edge = edge;
                entry.last = life.last;
                slots[edge.0] = Some(entry.slot);
                inplace.push((src, edge));
                continue;
            }
        }
        active.sort_by_key(|a| a.slot.offset);
        let mut offset = base;
        for a in &active {
            if a.slot.offset >= offset + size {
                break;
            }
            offset = offset.max(a.slot.end());
        }
        let slot = Slot { offset, size };
        total = total.max(slot.end());
        slots[edge.0] = Some(slot);
        active.push(Active {
            edge,
            slot,
            last: life.last,
        });
    }

    let plan = MemoryPlan {
        alignment,
        total: round_up(total, alignment),
        slots,
        lifetimes,
        pinned,
        inplace,
    };
    crate::trace!(
        "memory: {} bytes ({} pinned), {} in-place pairs",
        plan.total,
        base,
        plan.inplace.len()
    );
    Ok(plan)
}

/// First input of the producer of `edge` when the output may overwrite it.
fn inplace_source(
    graph: &Graph,
    opt: &[Option<OptNode>],
    edge: EdgeId,
    lifetimes: &[Option<Lifetime>],
    life: Lifetime,
) -> Result<Option<EdgeId>> {
    let Some(producer) = graph.edge(edge)?.producer else {
        return Ok(None);
    };
    let Some(placed) = opt_of(opt, producer) else {
        return Ok(None);
    };
    let node = graph.node(producer)?;
    if !placed.inplace || node.outputs.first() != Some(&edge) {
        return Ok(None);
    }
    let Some(src) = node.inputs.first().copied() else {
        return Ok(None);
    };
    let src_edge = graph.edge(src)?;
    if src_edge.is_pinned() || lifetimes[src.0].map(|l| l.last) != Some(life.first) {
        return Ok(None);
    }
    let same = match (&src_edge.desc, &graph.edge(edge)?.desc) {
        (Some(a), Some(b)) => {
            a.layout == b.layout && a.dtype == b.dtype && a.bytes()? == b.bytes()?
        }
        _ => false,
    };
    Ok(same.then_some(src))
}

impl MemoryPlan {
    pub fn slot(&self, edge: EdgeId) -> Result<Slot> {
        self.slots
            .get(edge.0)
            .copied()
            .flatten()
            .ok_or_else(|| rt_error(RetCode::RuntimeError, format!("edge {} has no arena slot", edge)))
    }

    pub fn lifetime(&self, edge: EdgeId) -> Option<Lifetime> {
        self.lifetimes.get(edge.0).copied().flatten()
    }

    pub fn pinned(&self) -> &[PinnedSlot] {
        &self.pinned
    }

    pub fn inplace_pairs(&self) -> &[(EdgeId, EdgeId)] {
        &self.inplace
    }

    fn is_inplace_pair(&self, a: EdgeId, b: EdgeId) -> bool {
        self.inplace
            .iter()
            .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    }

    /// No two simultaneously live edges share bytes unless they form a
    /// recorded in-place pair.
    pub fn verify(&self, graph: &Graph) -> Result<()> {
        let end = usize::MAX;
        let mut placed: Vec<(EdgeId, Slot, Lifetime)> = Vec::new();
        for edge in graph.edges() {
            let slot = self.slot(edge.id)?;
            if slot.end() > self.total {
                return Err(rt_error(
                    RetCode::RuntimeError,
                    format!("slot of {} ends past the arena", edge.name),
                ));
            }
            let life = if edge.is_pinned() {
                Lifetime { first: 0, last: end }
            } else {
                self.lifetime(edge.id).ok_or_else(|| {
                    rt_error(RetCode::RuntimeError, format!("{} has no lifetime", edge.name))
                })?
            };
            placed.push((edge.id, slot, life));
        }
        for (i, (a, sa, la)) in placed.iter().enumerate() {
            for (b, sb, lb) in &placed[i + 1..] {
                if sa.overlaps(sb) && la.overlaps(lb) && !self.is_inplace_pair(*a, *b) {
                    return Err(rt_error(
                        RetCode::RuntimeError,
                        format!("edges {} and {} overlap while both live", a, b),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether new descriptors still fit the existing layout. Refreshes the
    /// pinned byte counts when they do.
    pub fn absorb(&mut self, graph: &Graph) -> Result<bool> {
        for edge in graph.edges() {
            let Some(slot) = self.slots.get(edge.id.0).copied().flatten() else {
                return Ok(false);
            };
            if edge_bytes(graph, edge.id)? > slot.size {
                return Ok(false);
            }
        }
        for (src, dst) in &self.inplace {
            if edge_bytes(graph, *src)? != edge_bytes(graph, *dst)? {
                return Ok(false);
            }
        }
        for pinned in self.pinned.iter_mut() {
            pinned.bytes = edge_bytes(graph, pinned.edge)?;
        }
        Ok(true)
    }
}
