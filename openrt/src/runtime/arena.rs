use anyhow::Result;

use crate::error::{rt_error, RetCode};

/// One contiguous allocation holding every tensor of a plan.
///
/// Backed by `u64` words so element views of any supported type are aligned;
/// the usable region starts at the first `alignment` boundary.
pub struct Arena {
    words: Vec<u64>,
    base: usize,
    len: usize,
    alignment: usize,
}

impl Arena {
    pub fn new(len: usize, alignment: usize) -> Result<Self> {
        let total = len + alignment;
        let count = total.div_ceil(8);
        let mut words: Vec<u64> = Vec::new();
        words.try_reserve_exact(count).map_err(|err| {
            rt_error(
                RetCode::OutOfMemory,
                format!("cannot allocate a {} byte arena: {}", len, err),
            )
        })?;
        words.resize(count, 0);
        let addr = words.as_ptr() as usize;
        let base = (alignment - addr % alignment) % alignment;
        Ok(Self {
            words,
            base,
            len,
            alignment,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the usable region.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // `base < alignment` and the vector holds `len + alignment` bytes.
        unsafe { (self.words.as_mut_ptr() as *mut u8).add(self.base) }
    }

    fn as_bytes(&self) -> &[u8] {
        let bytes: &[u8] = bytemuck::cast_slice(&self.words);
        &bytes[self.base..self.base + self.len]
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        let (base, len) = (self.base, self.len);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words);
        &mut bytes[base..base + len]
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        if offset + len > self.len {
            return Err(rt_error(
                RetCode::RuntimeError,
                format!(
                    "range {}..{} outside the {} byte arena",
                    offset,
                    offset + len,
                    self.len
                ),
            ));
        }
        Ok(())
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check(offset, len)?;
        Ok(&self.as_bytes()[offset..offset + len])
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        self.as_bytes_mut()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Clone for Arena {
    // A fresh allocation may land on a different alignment offset.
    fn clone(&self) -> Self {
        let mut words = vec![0u64; self.words.len()];
        let addr = words.as_ptr() as usize;
        let base = (self.alignment - addr % self.alignment) % self.alignment;
        let src = self.as_bytes();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);
        bytes[base..base + self.len].copy_from_slice(src);
        Self {
            words,
            base,
            len: self.len,
            alignment: self.alignment,
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}
