/// Errors that can occur while parsing or writing OpenFlow frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes were available than the structure needs.
    #[error("truncated frame (needed {needed} bytes, have {available})")]
    Truncated { needed: usize, available: usize },

    /// The header carries a version byte outside 0x01..=0x06.
    #[error("unsupported OpenFlow version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// The header length field disagrees with the bytes supplied.
    #[error("length mismatch (header says {declared}, frame has {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The frame would not fit the 16-bit length field.
    #[error("frame too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream mid-write.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
