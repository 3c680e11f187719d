//! Version-agnostic hello handling.
//!
//! The first frame on a connection is decoded before any version is agreed, so this
//! path only trusts the common header and the hello element layout shared by every
//! OpenFlow version.

use bytes::{BufMut, BytesMut};
use ofcore_frame::{Frame, HEADER_SIZE};

use crate::error::{CodecError, Result};
use crate::types::{MessageType, HELLO_ELEM_VERSIONBITMAP};
use crate::wire::{pad8, WireReader};

/// A hello decoded without committing to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericHello {
    pub version: u8,
    pub xid: u32,
    /// Versions advertised in a version-bitmap element, ascending.
    pub bitmap: Option<Vec<u8>>,
}

impl GenericHello {
    /// Decode `frame` as a hello of any version.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let header = frame.header()?;
        let hello_code = MessageType::Hello.code(ofcore_frame::OFP_1_0).unwrap_or(0);
        if header.msg_type != hello_code {
            return Err(CodecError::Malformed {
                what: "hello",
                reason: format!("expected type {hello_code}, got {}", header.msg_type),
            });
        }
        if (header.length as usize) < HEADER_SIZE {
            return Err(CodecError::Malformed {
                what: "hello",
                reason: format!("length {} shorter than header", header.length),
            });
        }

        let mut body = WireReader::new(frame.body(), "hello element");
        Ok(Self {
            version: header.version,
            xid: header.xid,
            bitmap: decode_elements(&mut body)?,
        })
    }
}

/// Walk hello elements and return the first version bitmap, if any.
pub(crate) fn decode_elements(body: &mut WireReader) -> Result<Option<Vec<u8>>> {
    let mut bitmap = None;
    while body.remaining() >= 4 {
        let elem_type = body.u16()?;
        let elem_len = body.u16()? as usize;
        if elem_len < 4 {
            return Err(CodecError::Malformed {
                what: "hello element",
                reason: format!("element length {elem_len}"),
            });
        }
        let mut elem = body.sub(elem_len - 4, "hello element")?;
        if elem_type == HELLO_ELEM_VERSIONBITMAP && bitmap.is_none() {
            let mut versions = Vec::new();
            let mut word_index = 0u32;
            while elem.remaining() >= 4 {
                let word = elem.u32()?;
                for bit in 0..32u32 {
                    if word & (1 << bit) != 0 {
                        if let Ok(version) = u8::try_from(word_index * 32 + bit) {
                            versions.push(version);
                        }
                    }
                }
                word_index += 1;
            }
            bitmap = Some(versions);
        }
        // Elements are padded to 8 bytes; tolerate peers that omit trailing padding.
        let padding = pad8(elem_len) - elem_len;
        body.skip(padding.min(body.remaining()))?;
    }
    Ok(bitmap)
}

/// Append a version-bitmap element advertising `versions`.
pub(crate) fn encode_bitmap(versions: &[u8], dst: &mut BytesMut) {
    let max = versions.iter().copied().max().unwrap_or(0) as usize;
    let words = max / 32 + 1;
    let mut bitmap = vec![0u32; words];
    for version in versions {
        let v = *version as usize;
        bitmap[v / 32] |= 1 << (v % 32);
    }

    let elem_len = 4 + 4 * words;
    dst.put_u16(HELLO_ELEM_VERSIONBITMAP);
    dst.put_u16(elem_len as u16);
    for word in bitmap {
        dst.put_u32(word);
    }
    dst.put_bytes(0, pad8(elem_len) - elem_len);
}
