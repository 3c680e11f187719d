use bytes::Bytes;
use tracing::trace;

use crate::error::Result;
use crate::header::{Header, HEADER_SIZE};
use crate::version::is_known_version;

/// Bytes needed before the slicer can read a version and a length.
const PREFIX_SIZE: usize = 4;

/// One complete OpenFlow message exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap raw bytes. No validation beyond what the slicer already did.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Version byte, 0 for an empty frame.
    pub fn version(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Parse the full 8-byte header. Fails for frames whose declared length is below 8.
    pub fn header(&self) -> Result<Header> {
        Header::parse(&self.data)
    }

    /// Bytes after the header; empty for short frames.
    pub fn body(&self) -> Bytes {
        if self.data.len() <= HEADER_SIZE {
            return Bytes::new();
        }
        self.data.slice(HEADER_SIZE..)
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of slicing a buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sliced {
    /// Complete frames, in stream order.
    pub frames: Vec<Frame>,
    /// Undigested tail: a partial frame, or fewer than 4 bytes.
    pub leftover: Bytes,
}

/// Cut `buffer` into complete frames.
///
/// While at least 4 bytes remain, byte 0 is read as the version and bytes 2-3 as the
/// big-endian total length. An unknown version or a zero length drops exactly 4 bytes
/// and the scan retries, which lets a stream resync after garbage. A frame is emitted
/// once all of its declared bytes are present; otherwise slicing stops and the rest is
/// returned as leftover.
///
/// Stateless: slicing `a ++ b` yields the same frames as slicing `a`, then slicing
/// `leftover(a) ++ b`.
pub fn slice(buffer: Bytes) -> Sliced {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    while buffer.len() - offset >= PREFIX_SIZE {
        let version = buffer[offset];
        let length = u16::from_be_bytes([buffer[offset + 2], buffer[offset + 3]]) as usize;

        if !is_known_version(version) || length == 0 {
            trace!(version, length, offset, "dropping unframeable prefix");
            offset += PREFIX_SIZE;
            continue;
        }

        if buffer.len() - offset < length {
            break;
        }

        frames.push(Frame::new(buffer.slice(offset..offset + length)));
        offset += length;
    }

    Sliced {
        frames,
        leftover: buffer.slice(offset..),
    }
}
