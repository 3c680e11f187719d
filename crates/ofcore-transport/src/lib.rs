//! TCP transport for switch-facing OpenFlow connections.
//!
//! This is the lowest layer of ofcore. It accepts switch sessions, assigns each
//! one an opaque [`ConnectionId`], and hands out raw byte chunks. It knows nothing
//! about OpenFlow framing; that is the job of `ofcore-frame`.

pub mod error;
pub mod listener;
pub mod stream;

pub use error::{Result, TransportError};
pub use listener::SwitchListener;
pub use stream::{ConnectionId, SwitchReader, SwitchStream, SwitchWriter};
