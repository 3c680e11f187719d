use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ofcore_frame::{Frame, FrameError, Header, HEADER_SIZE, MAX_FRAME_SIZE, OFP_1_0, OFP_1_3};
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::message::{Message, OfpMessage};
use crate::registry::ExperimenterRegistry;
use crate::{v0x01, v0x04};

/// Versions with a full codec.
pub const CODEC_VERSIONS: [u8; 2] = [OFP_1_0, OFP_1_3];

/// Version-dispatched message codec.
///
/// Cheap to clone; the experimenter registry is shared.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    experimenters: Arc<ExperimenterRegistry>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that decodes experimenter payloads through `registry`.
    pub fn with_experimenters(registry: ExperimenterRegistry) -> Self {
        Self {
            experimenters: Arc::new(registry),
        }
    }

    pub fn experimenters(&self) -> &ExperimenterRegistry {
        &self.experimenters
    }

    /// Whether `version` has a codec.
    pub fn supports(version: u8) -> bool {
        CODEC_VERSIONS.contains(&version)
    }

    /// Decode one frame.
    pub fn decode(&self, frame: &Frame) -> Result<OfpMessage> {
        let header = frame.header()?;
        let declared = header.length as usize;
        if declared < HEADER_SIZE || declared != frame.len() {
            return Err(CodecError::Frame(FrameError::LengthMismatch {
                declared,
                actual: frame.len(),
            }));
        }

        let body = frame.body();
        let message = match header.version {
            OFP_1_0 => v0x01::unpack(&header, body, &self.experimenters)?,
            OFP_1_3 => v0x04::unpack(&header, body, &self.experimenters)?,
            other => return Err(CodecError::UnsupportedVersion(other)),
        };
        trace!(
            version = header.version,
            xid = header.xid,
            msg_type = message.msg_type().wire_name(header.version),
            "decoded message"
        );
        Ok(OfpMessage { header, message })
    }

    /// Encode `message` as a complete frame for `version` with transaction id `xid`.
    pub fn encode(&self, version: u8, xid: u32, message: &Message) -> Result<Bytes> {
        let msg_type = message.msg_type();
        let code = msg_type.code(version).ok_or_else(|| {
            if Self::supports(version) {
                CodecError::Unencodable {
                    version,
                    msg_type: msg_type.wire_name(version),
                }
            } else {
                CodecError::UnsupportedVersion(version)
            }
        })?;

        let mut body = BytesMut::new();
        match version {
            OFP_1_0 => v0x01::pack(message, &mut body)?,
            OFP_1_3 => v0x04::pack(message, &mut body)?,
            other => return Err(CodecError::UnsupportedVersion(other)),
        }

        let total = HEADER_SIZE + body.len();
        if total > MAX_FRAME_SIZE {
            return Err(CodecError::Frame(FrameError::TooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            }));
        }

        let mut out = BytesMut::with_capacity(total);
        Header::new(version, code, total as u16, xid).write(&mut out);
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }
}
