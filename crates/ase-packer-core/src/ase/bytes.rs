//! Little-endian readers and writers for the sprite file layout.
//!
//! The writer supports the reserve/backpatch pattern every length-prefixed section of the
//! format needs: reserve a `u32` placeholder, emit the body, then patch in the span.

use crate::error::{AsePackerError, Result};

/// Bounds-checked cursor over an in-memory byte slice.
///
/// Positions are relative to the reader's own slice; error offsets are absolute within the
/// original file so that sub-readers report useful locations.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Reader confined to `start..end` of this reader's data.
    pub fn sub(&self, start: usize, end: usize) -> Result<ByteReader<'a>> {
        if start > end || end > self.data.len() {
            return Err(self.error(format!(
                "section {start}..{end} exceeds {} available bytes",
                self.data.len()
            )));
        }
        Ok(ByteReader {
            data: &self.data[start..end],
            pos: 0,
            base: self.base + start,
        })
    }

    /// Format error located at the current absolute offset.
    pub fn error(&self, reason: impl Into<String>) -> AsePackerError {
        AsePackerError::format(self.offset(), reason)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Cursor position within the original file.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Everything from the cursor to the end of this reader.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    /// Moves the cursor to an absolute offset. Seeking to the very end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(self.error(format!(
                "seek to {pos} past end of data ({} bytes)",
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error(format!("unexpected end of data reading {n} bytes")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// `STRING`: u16 byte length followed by UTF-8 bytes.
    pub fn string(&mut self) -> Result<String> {
        let start = self.offset();
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| AsePackerError::format(start, "string is not valid UTF-8"))
    }
}

/// Placeholder for a `u32` length written before its body is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation(usize);

/// Growable little-endian output buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    pub fn string(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| AsePackerError::Encode(format!("string too long: {} bytes", s.len())))?;
        self.u16(len);
        self.bytes(s.as_bytes());
        Ok(())
    }

    /// Writes a zeroed `u32` placeholder at the current offset.
    pub fn reserve_u32(&mut self) -> Reservation {
        let at = self.buf.len();
        self.u32(0);
        Reservation(at)
    }

    /// Overwrites `res` with the number of bytes written since it was reserved (placeholder
    /// included).
    pub fn patch_span(&mut self, res: Reservation) -> Result<()> {
        let span = u32::try_from(self.buf.len() - res.0)
            .map_err(|_| AsePackerError::Encode("section longer than 4 GiB".into()))?;
        self.buf[res.0..res.0 + 4].copy_from_slice(&span.to_le_bytes());
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
