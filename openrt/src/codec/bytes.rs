//! Little-endian cursor reads and an 8-byte aligned writer.
use anyhow::Result;

use crate::error::{rt_error, RetCode};

pub(crate) fn malformed(message: impl Into<String>) -> anyhow::Error {
    rt_error(
        RetCode::InvalidValue,
        format!("malformed plan blob: {}", message.into()),
    )
}

pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

pub(crate) fn read_bytes<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| malformed("unexpected EOF"))?;
    let out = &data[*cursor..end];
    *cursor = end;
    Ok(out)
}

pub(crate) fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8> {
    Ok(read_bytes(data, cursor, 1)?[0])
}

pub(crate) fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(read_bytes(data, cursor, 4)?);
    Ok(u32::from_le_bytes(raw))
}

pub(crate) fn read_u64(data: &[u8], cursor: &mut usize) -> Result<u64> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(read_bytes(data, cursor, 8)?);
    Ok(u64::from_le_bytes(raw))
}

pub(crate) fn read_usize(data: &[u8], cursor: &mut usize) -> Result<usize> {
    usize::try_from(read_u64(data, cursor)?).map_err(|_| malformed("length overflows usize"))
}

/// Skip to the next 8-byte boundary.
pub(crate) fn skip_padding(data: &[u8], cursor: &mut usize) -> Result<()> {
    let aligned = align_up(*cursor, 8);
    read_bytes(data, cursor, aligned - *cursor)?;
    Ok(())
}

/// `u32` length, UTF-8 bytes, zero padding to 8 bytes.
pub(crate) fn read_string(data: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u32(data, cursor)? as usize;
    let bytes = read_bytes(data, cursor, len)?;
    let s = std::str::from_utf8(bytes).map_err(|_| malformed("invalid UTF-8 string"))?;
    skip_padding(data, cursor)?;
    Ok(s.to_string())
}

#[derive(Debug, Default)]
pub(crate) struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn pad(&mut self) {
        let aligned = align_up(self.buf.len(), 8);
        self.buf.resize(aligned, 0);
    }

    pub(crate) fn put_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| rt_error(RetCode::InvalidValue, "string too long for plan blob"))?;
        self.put_u32(len);
        self.put_bytes(value.as_bytes());
        self.pad();
        Ok(())
    }

    /// Overwrite a previously reserved `u64`.
    pub(crate) fn patch_u64(&mut self, at: usize, value: u64) {
        self.buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
