use ofcore_transport::ConnectionId;

/// Errors that can occur in controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ofcore_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ofcore_frame::FrameError),

    /// Message decode or encode failure.
    #[error("codec error: {0}")]
    Codec(#[from] ofcore_codec::CodecError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Version negotiation failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// No switch is registered under this datapath id.
    #[error("unknown switch {0:016x}")]
    UnknownSwitch(u64),

    /// The connection is gone.
    #[error("connection {0} closed")]
    ConnectionClosed(ConnectionId),

    /// The connection has not negotiated a version yet.
    #[error("connection {0} has no negotiated version")]
    NotNegotiated(ConnectionId),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
