use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Header size: version (1) + type (1) + length (2) + xid (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// The common OpenFlow message header.
///
/// ```text
/// ┌──────────┬──────────┬──────────────┬──────────────────┐
/// │ Version  │ Type     │ Length       │ Xid              │
/// │ (1B)     │ (1B)     │ (2B BE)      │ (4B BE)          │
/// └──────────┴──────────┴──────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub fn new(version: u8, msg_type: u8, length: u16, xid: u32) -> Self {
        Self {
            version,
            msg_type,
            length,
            xid,
        }
    }

    /// Parse the first 8 bytes of `src`. The version byte is not checked here.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                available: src.len(),
            });
        }
        Ok(Self {
            version: src[0],
            msg_type: src[1],
            length: u16::from_be_bytes([src[2], src[3]]),
            xid: u32::from_be_bytes([src[4], src[5], src[6], src[7]]),
        })
    }

    /// Append the header in wire order.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type);
        dst.put_u16(self.length);
        dst.put_u32(self.xid);
    }

    /// Payload length implied by the length field.
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_big_endian_fields() {
        let raw = [0x04, 0x05, 0x00, 0x08, 0x00, 0x00, 0x01, 0x02];
        let header = Header::parse(&raw).unwrap();
        assert_eq!(header, Header::new(0x04, 5, 8, 0x0102));
        assert_eq!(header.body_len(), 0);
    }

    #[test]
    fn parse_rejects_short_input() {
        let err = Header::parse(&[0x04, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                needed: 8,
                available: 3
            }
        ));
    }

    #[test]
    fn write_matches_parse() {
        let header = Header::new(0x01, 2, 16, 0xdead_beef);
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0x00, 0x10, 0xde, 0xad, 0xbe, 0xef]);
    }
}
