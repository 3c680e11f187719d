//! Decoded switch state: features, ports, descriptions and statistics entries.
//!
//! These are the domain objects the controller stores on a switch and publishes in
//! events, so they are plain data with serde derives.

use serde::{Deserialize, Serialize};

use crate::types::{port_no, port_state};

/// Features reply contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    /// Always 0 for OpenFlow 1.0.
    pub auxiliary_id: u8,
    pub capabilities: u32,
    /// 1.0 supported actions bitmap, 1.3 reserved word.
    pub reserved: u32,
    /// Only OpenFlow 1.0 carries ports in the features reply.
    pub ports: Vec<PortDesc>,
}

impl SwitchFeatures {
    pub fn has_capability(&self, bit: u32) -> bool {
        self.capabilities & bit != 0
    }
}

/// One port as described by a features reply, port-desc reply or port-status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    /// kbps; 0 for OpenFlow 1.0.
    pub curr_speed: u32,
    /// kbps; 0 for OpenFlow 1.0.
    pub max_speed: u32,
}

impl PortDesc {
    /// Live ports and the local port count as active.
    pub fn is_active(&self) -> bool {
        self.state == port_state::LIVE || self.port_no == port_no::LOCAL
    }

    pub fn is_link_down(&self) -> bool {
        self.state & port_state::LINK_DOWN != 0
    }

    /// Colon-separated hardware address.
    pub fn hw_addr_string(&self) -> String {
        format_mac(&self.hw_addr)
    }
}

/// Render a MAC as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(addr: &[u8; 6]) -> String {
    addr.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Switch description strings (multipart DESC).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchDesc {
    pub manufacturer: String,
    pub hardware: String,
    pub software: String,
    pub serial: String,
    pub datapath: String,
}

/// One flow stats entry.
///
/// Match and instructions (1.0: match and actions) stay in wire form; interpreting
/// them belongs to the flow mapping layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub flags: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub match_raw: Vec<u8>,
    pub instructions_raw: Vec<u8>,
}

/// One table stats entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table_id: u8,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

/// One port stats entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    pub port_no: u32,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
    /// 0 for OpenFlow 1.0.
    pub duration_sec: u32,
    pub duration_nsec: u32,
}
