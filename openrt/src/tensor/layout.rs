use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Physical arrangement of a tensor's elements.
///
/// `NdArray` is plain row-major. The `N{b}cx` layouts pack channels
/// (dimension 1) into blocks of `b` lanes: `[N][ceil(C/b)][X][b]`, where `X`
/// is the product of all spatial dimensions. Lanes past `C` in the last
/// channel block are padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayout {
    NdArray,
    N4cx,
    N8cx,
    N16cx,
}

pub const ALL_LAYOUTS: &[DataLayout] = &[
    DataLayout::NdArray,
    DataLayout::N4cx,
    DataLayout::N8cx,
    DataLayout::N16cx,
];

impl DataLayout {
    /// Channel block width, `None` for plain layouts.
    pub fn block(self) -> Option<usize> {
        match self {
            DataLayout::NdArray => None,
            DataLayout::N4cx => Some(4),
            DataLayout::N8cx => Some(8),
            DataLayout::N16cx => Some(16),
        }
    }

    pub fn is_blocked(self) -> bool {
        self.block().is_some()
    }

    /// Blocked layouts need a batch, a channel and at least one spatial dim.
    pub fn supports_rank(self, rank: usize) -> bool {
        !self.is_blocked() || rank >= 3
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataLayout::NdArray => "ndarray",
            DataLayout::N4cx => "n4cx",
            DataLayout::N8cx => "n8cx",
            DataLayout::N16cx => "n16cx",
        }
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataLayout {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "ndarray" => Ok(DataLayout::NdArray),
            "n4cx" => Ok(DataLayout::N4cx),
            "n8cx" => Ok(DataLayout::N8cx),
            "n16cx" => Ok(DataLayout::N16cx),
            other => Err(anyhow!("unknown layout {}", other)),
        }
    }
}

/// Offset of logical element `(n, c, x)` for an `[N, C, X...]` tensor.
pub fn blocked_offset(layout: DataLayout, channels: usize, spatial: usize, n: usize, c: usize, x: usize) -> usize {
    match layout.block() {
        None => (n * channels + c) * spatial + x,
        Some(b) => {
            let blocks = channels.div_ceil(b);
            ((n * blocks + c / b) * spatial + x) * b + c % b
        }
    }
}

/// True when stored element `index` of a blocked `[N, C, X...]` buffer is a
/// padding lane past `C`.
pub fn is_padding_lane(layout: DataLayout, channels: usize, spatial: usize, index: usize) -> bool {
    match layout.block() {
        None => false,
        Some(b) => {
            let blocks = channels.div_ceil(b);
            let lane = index % b;
            let block = (index / b / spatial.max(1)) % blocks.max(1);
            block * b + lane >= channels
        }
    }
}
