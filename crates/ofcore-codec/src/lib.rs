//! Typed OpenFlow messages.
//!
//! [`MessageCodec`] turns a [`Frame`](ofcore_frame::Frame) into an [`OfpMessage`]
//! and back, dispatching on the header version. OpenFlow 1.0 and 1.3 have full
//! codecs; hellos of any version can be read with [`GenericHello`] before a version
//! has been negotiated.

pub mod codec;
pub mod error;
pub mod hello;
pub mod message;
pub mod registry;
pub mod stats;
pub mod types;
mod v0x01;
mod v0x04;
mod wire;

pub use codec::{MessageCodec, CODEC_VERSIONS};
pub use error::{CodecError, Result};
pub use hello::GenericHello;
pub use message::{
    ErrorMsg, EthernetHeader, Experimenter, FlowStatsRequest, Hello, Message, MultipartReply,
    MultipartReplyBody, MultipartRequest, MultipartRequestBody, OfpMessage, PacketIn, PortReason,
    PortStatus, SwitchConfig,
};
pub use registry::{ExperimenterDecoder, ExperimenterRegistry};
pub use stats::{FlowStats, PortDesc, PortStats, SwitchDesc, SwitchFeatures, TableStats};
pub use types::{MessageType, MultipartKind};
