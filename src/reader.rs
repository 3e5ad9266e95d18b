//! Bounds-checked big-endian reads over a byte slice.
//!
//! Every box and element parser in this crate goes through [`ByteReader`];
//! a read past the end is always an [`Error::OutOfBounds`], never a panic
//! or a wrapped value.

use crate::{Error, Result};

/// Cursor over a borrowed byte slice with big-endian integer reads.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over the full slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the reader has consumed the whole slice.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::OutOfBounds {
                need: n as u64,
                have: self.remaining() as u64,
            });
        }
        Ok(())
    }

    /// Take the next `n` bytes as a subslice.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a fixed-width big-endian unsigned integer of 1..=8 bytes.
    pub fn read_be(&mut self, n_bytes: usize) -> Result<u64> {
        debug_assert!(n_bytes >= 1 && n_bytes <= 8);
        let bytes = self.take(n_bytes)?;
        let mut value = 0u64;
        for &b in bytes {
            value = (value << 8) | u64::from(b);
        }
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_be(1)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_be(2)? as u16)
    }

    /// Read a 24-bit big-endian value (FullBox flags).
    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(self.read_be(3)? as u32)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_be(4)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_be(8)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Read a fixed-width big-endian unsigned integer at an offset without a
/// cursor.
pub fn read_fixed_be(buf: &[u8], offset: usize, n_bytes: usize) -> Result<u64> {
    let end = offset.checked_add(n_bytes).ok_or(Error::OutOfBounds {
        need: u64::MAX,
        have: buf.len() as u64,
    })?;
    if end > buf.len() {
        return Err(Error::OutOfBounds {
            need: end as u64,
            have: buf.len() as u64,
        });
    }
    let mut value = 0u64;
    for &b in &buf[offset..end] {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_reads_advance_cursor() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xff];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_u24().unwrap(), 0x030405);
        assert_eq!(r.read_u8().unwrap(), 0x06);
        assert_eq!(r.remaining(), 3);
        assert_eq!(r.read_be(3).unwrap(), 0x0708ff);
        assert!(r.is_empty());
    }

    #[test]
    fn test_out_of_bounds_is_error() {
        let mut r = ByteReader::new(&[0x01, 0x02]);
        assert_matches!(r.read_u32(), Err(crate::Error::OutOfBounds { need: 4, have: 2 }));
        // A failed read must not move the cursor.
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_read_fixed_be() {
        let buf = [0x00, 0x00, 0x12, 0x34];
        assert_eq!(read_fixed_be(&buf, 0, 4).unwrap(), 0x1234);
        assert_eq!(read_fixed_be(&buf, 2, 2).unwrap(), 0x1234);
        assert_matches!(
            read_fixed_be(&buf, 2, 4),
            Err(crate::Error::OutOfBounds { .. })
        );
    }

    #[test]
    fn test_read_array() {
        let buf = [1u8, 2, 3, 4, 5];
        let mut r = ByteReader::new(&buf);
        let a: [u8; 4] = r.read_array().unwrap();
        assert_eq!(a, [1, 2, 3, 4]);
        assert_eq!(r.remaining(), 1);
    }
}
