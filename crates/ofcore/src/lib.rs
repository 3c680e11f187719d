//! OpenFlow controller protocol core.
//!
//! ofcore owns switch-facing TCP connections, slices byte streams into OpenFlow
//! frames, negotiates versions, drives the features handshake and correlates
//! multipart statistics replies.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener, switch streams, connection ids
//! - [`frame`]: OpenFlow header, frame slicer, frame writer
//! - [`codec`]: typed messages for OpenFlow 1.0 and 1.3
//! - [`controller`]: negotiation, reactor, per-switch state and events (behind the
//!   `controller` feature)

/// Re-export transport types.
pub mod transport {
    pub use ofcore_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ofcore_frame::*;
}

/// Re-export codec types.
pub mod codec {
    pub use ofcore_codec::*;
}

/// Re-export controller types (requires `controller` feature).
#[cfg(feature = "controller")]
pub mod controller {
    pub use ofcore_controller::*;
}
