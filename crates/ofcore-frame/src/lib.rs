//! OpenFlow framing.
//!
//! Every OpenFlow message starts with the same 8-byte header:
//! - 1 byte protocol version (0x01 through 0x06)
//! - 1 byte message type
//! - 2 byte big-endian total length, header included
//! - 4 byte big-endian transaction id (xid)
//!
//! The [`slice`] function cuts a raw TCP byte stream into whole frames and hands back
//! whatever is left over, so callers never deal with partial reads.

pub mod error;
pub mod header;
pub mod slicer;
pub mod version;
#[cfg(feature = "async")]
pub mod writer;

pub use error::{FrameError, Result};
pub use header::{Header, HEADER_SIZE, MAX_FRAME_SIZE};
pub use slicer::{slice, Frame, Sliced};
pub use version::{is_known_version, version_label, KNOWN_VERSIONS, OFP_1_0, OFP_1_3};
#[cfg(feature = "async")]
pub use writer::FrameWriter;
