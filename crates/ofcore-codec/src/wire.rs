//! Bounds-checked big-endian cursor used by the version modules.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

pub(crate) struct WireReader {
    buf: Bytes,
    what: &'static str,
}

impl WireReader {
    pub(crate) fn new(buf: Bytes, what: &'static str) -> Self {
        Self { buf, what }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn need(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                what: self.what,
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    /// NUL-padded fixed-width string.
    pub(crate) fn string(&mut self, width: usize) -> Result<String> {
        let raw = self.bytes(width)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub(crate) fn rest(&mut self) -> Bytes {
        let len = self.buf.remaining();
        self.buf.split_to(len)
    }

    /// Split off a sub-reader over the next `n` bytes.
    pub(crate) fn sub(&mut self, n: usize, what: &'static str) -> Result<WireReader> {
        Ok(WireReader::new(self.bytes(n)?, what))
    }
}

/// Write `value` NUL-padded (or truncated) to `width` bytes.
pub(crate) fn put_string(dst: &mut BytesMut, value: &str, width: usize) {
    let raw = value.as_bytes();
    let len = raw.len().min(width);
    dst.put_slice(&raw[..len]);
    dst.put_bytes(0, width - len);
}

/// Round `len` up to the next multiple of 8.
pub(crate) fn pad8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_reports_truncation() {
        let mut reader = WireReader::new(Bytes::from_static(&[0, 1, 0, 0, 0, 2]), "test");
        assert_eq!(reader.u16().unwrap(), 1);
        assert_eq!(reader.u32().unwrap(), 2);
        let err = reader.u8().unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                what: "test",
                needed: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn strings_stop_at_nul() {
        let mut reader = WireReader::new(Bytes::from_static(b"eth0\0\0\0\0"), "name");
        assert_eq!(reader.string(8).unwrap(), "eth0");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn put_string_pads_and_truncates() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "ab", 4);
        put_string(&mut buf, "abcdef", 3);
        assert_eq!(buf.as_ref(), b"ab\0\0abc");
    }

    #[test]
    fn pad8_rounds_up() {
        assert_eq!(pad8(0), 0);
        assert_eq!(pad8(4), 8);
        assert_eq!(pad8(8), 8);
        assert_eq!(pad8(9), 16);
    }
}
