use ofcore_frame::FrameError;

/// Errors that can occur while decoding or encoding OpenFlow messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame itself was unusable (short header, bad length).
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No codec exists for this wire version.
    #[error("no codec for OpenFlow version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// The type code is not defined for this version.
    #[error("unknown message type {code} for version 0x{version:02x}")]
    UnknownType { version: u8, code: u8 },

    /// The multipart kind code is not defined for this version.
    #[error("unknown multipart kind {code} for version 0x{version:02x}")]
    UnknownMultipartKind { version: u8, code: u16 },

    /// A structure ran past the end of the message body.
    #[error("truncated {what} (needed {needed} bytes, have {available})")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Internally inconsistent message.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// The message exists but this version cannot express it.
    #[error("{msg_type} cannot be encoded for version 0x{version:02x}")]
    Unencodable {
        version: u8,
        msg_type: &'static str,
    },

    /// An experimenter decoder rejected the payload.
    #[error("experimenter 0x{experimenter:08x} payload rejected: {reason}")]
    Experimenter { experimenter: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;
