//! Message type and multipart kind enums plus the wire constants the controller needs.

use ofcore_frame::{OFP_1_0, OFP_1_3};
use serde::{Deserialize, Serialize};

/// Every OpenFlow message type known to the 1.0 and 1.3 codecs.
///
/// Type codes differ between versions; use [`MessageType::code`] and
/// [`MessageType::from_code`] to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Hello,
    Error,
    EchoRequest,
    EchoReply,
    Experimenter,
    FeaturesRequest,
    FeaturesReply,
    GetConfigRequest,
    GetConfigReply,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    GroupMod,
    PortMod,
    TableMod,
    MultipartRequest,
    MultipartReply,
    BarrierRequest,
    BarrierReply,
    QueueGetConfigRequest,
    QueueGetConfigReply,
    RoleRequest,
    RoleReply,
    GetAsyncRequest,
    GetAsyncReply,
    SetAsync,
    MeterMod,
}

const V0X01_TYPES: [MessageType; 22] = [
    MessageType::Hello,
    MessageType::Error,
    MessageType::EchoRequest,
    MessageType::EchoReply,
    MessageType::Experimenter,
    MessageType::FeaturesRequest,
    MessageType::FeaturesReply,
    MessageType::GetConfigRequest,
    MessageType::GetConfigReply,
    MessageType::SetConfig,
    MessageType::PacketIn,
    MessageType::FlowRemoved,
    MessageType::PortStatus,
    MessageType::PacketOut,
    MessageType::FlowMod,
    MessageType::PortMod,
    MessageType::MultipartRequest,
    MessageType::MultipartReply,
    MessageType::BarrierRequest,
    MessageType::BarrierReply,
    MessageType::QueueGetConfigRequest,
    MessageType::QueueGetConfigReply,
];

const V0X04_TYPES: [MessageType; 30] = [
    MessageType::Hello,
    MessageType::Error,
    MessageType::EchoRequest,
    MessageType::EchoReply,
    MessageType::Experimenter,
    MessageType::FeaturesRequest,
    MessageType::FeaturesReply,
    MessageType::GetConfigRequest,
    MessageType::GetConfigReply,
    MessageType::SetConfig,
    MessageType::PacketIn,
    MessageType::FlowRemoved,
    MessageType::PortStatus,
    MessageType::PacketOut,
    MessageType::FlowMod,
    MessageType::GroupMod,
    MessageType::PortMod,
    MessageType::TableMod,
    MessageType::MultipartRequest,
    MessageType::MultipartReply,
    MessageType::BarrierRequest,
    MessageType::BarrierReply,
    MessageType::QueueGetConfigRequest,
    MessageType::QueueGetConfigReply,
    MessageType::RoleRequest,
    MessageType::RoleReply,
    MessageType::GetAsyncRequest,
    MessageType::GetAsyncReply,
    MessageType::SetAsync,
    MessageType::MeterMod,
];

fn type_table(version: u8) -> Option<&'static [MessageType]> {
    match version {
        OFP_1_0 => Some(&V0X01_TYPES),
        OFP_1_3 => Some(&V0X04_TYPES),
        _ => None,
    }
}

impl MessageType {
    /// Resolve a wire type code for `version`.
    pub fn from_code(version: u8, code: u8) -> Option<Self> {
        type_table(version)?.get(code as usize).copied()
    }

    /// Wire type code for `version`, if the type exists there.
    pub fn code(self, version: u8) -> Option<u8> {
        type_table(version)?
            .iter()
            .position(|t| *t == self)
            .map(|pos| pos as u8)
    }

    /// Protocol name used in event names, e.g. `ofpt_features_reply`.
    ///
    /// OpenFlow 1.0 spells a few types differently (`ofpt_vendor`, `ofpt_stats_*`).
    pub fn wire_name(self, version: u8) -> &'static str {
        if version == OFP_1_0 {
            match self {
                Self::Experimenter => return "ofpt_vendor",
                Self::MultipartRequest => return "ofpt_stats_request",
                Self::MultipartReply => return "ofpt_stats_reply",
                _ => {}
            }
        }
        match self {
            Self::Hello => "ofpt_hello",
            Self::Error => "ofpt_error",
            Self::EchoRequest => "ofpt_echo_request",
            Self::EchoReply => "ofpt_echo_reply",
            Self::Experimenter => "ofpt_experimenter",
            Self::FeaturesRequest => "ofpt_features_request",
            Self::FeaturesReply => "ofpt_features_reply",
            Self::GetConfigRequest => "ofpt_get_config_request",
            Self::GetConfigReply => "ofpt_get_config_reply",
            Self::SetConfig => "ofpt_set_config",
            Self::PacketIn => "ofpt_packet_in",
            Self::FlowRemoved => "ofpt_flow_removed",
            Self::PortStatus => "ofpt_port_status",
            Self::PacketOut => "ofpt_packet_out",
            Self::FlowMod => "ofpt_flow_mod",
            Self::GroupMod => "ofpt_group_mod",
            Self::PortMod => "ofpt_port_mod",
            Self::TableMod => "ofpt_table_mod",
            Self::MultipartRequest => "ofpt_multipart_request",
            Self::MultipartReply => "ofpt_multipart_reply",
            Self::BarrierRequest => "ofpt_barrier_request",
            Self::BarrierReply => "ofpt_barrier_reply",
            Self::QueueGetConfigRequest => "ofpt_queue_get_config_request",
            Self::QueueGetConfigReply => "ofpt_queue_get_config_reply",
            Self::RoleRequest => "ofpt_role_request",
            Self::RoleReply => "ofpt_role_reply",
            Self::GetAsyncRequest => "ofpt_get_async_request",
            Self::GetAsyncReply => "ofpt_get_async_reply",
            Self::SetAsync => "ofpt_set_async",
            Self::MeterMod => "ofpt_meter_mod",
        }
    }
}

/// Multipart (1.0: stats) request/reply kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipartKind {
    Desc,
    Flow,
    Aggregate,
    Table,
    PortStats,
    Queue,
    Group,
    GroupDesc,
    GroupFeatures,
    Meter,
    MeterConfig,
    MeterFeatures,
    TableFeatures,
    PortDesc,
    Experimenter,
}

const MULTIPART_EXPERIMENTER: u16 = 0xffff;

impl MultipartKind {
    pub fn from_code(version: u8, code: u16) -> Option<Self> {
        let kind = match code {
            0 => Self::Desc,
            1 => Self::Flow,
            2 => Self::Aggregate,
            3 => Self::Table,
            4 => Self::PortStats,
            5 => Self::Queue,
            MULTIPART_EXPERIMENTER => Self::Experimenter,
            _ if version != OFP_1_3 => return None,
            6 => Self::Group,
            7 => Self::GroupDesc,
            8 => Self::GroupFeatures,
            9 => Self::Meter,
            10 => Self::MeterConfig,
            11 => Self::MeterFeatures,
            12 => Self::TableFeatures,
            13 => Self::PortDesc,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(self, version: u8) -> Option<u16> {
        let code = match self {
            Self::Desc => 0,
            Self::Flow => 1,
            Self::Aggregate => 2,
            Self::Table => 3,
            Self::PortStats => 4,
            Self::Queue => 5,
            Self::Experimenter => MULTIPART_EXPERIMENTER,
            _ if version != OFP_1_3 => return None,
            Self::Group => 6,
            Self::GroupDesc => 7,
            Self::GroupFeatures => 8,
            Self::Meter => 9,
            Self::MeterConfig => 10,
            Self::MeterFeatures => 11,
            Self::TableFeatures => 12,
            Self::PortDesc => 13,
        };
        Some(code)
    }
}

/// Multipart flag: more fragments follow for this xid.
pub const MULTIPART_MORE: u16 = 1;

/// Error type `OFPET_HELLO_FAILED`.
pub const ERROR_TYPE_HELLO_FAILED: u16 = 0;
/// Error code `OFPHFC_INCOMPATIBLE`.
pub const HELLO_FAILED_INCOMPATIBLE: u16 = 0;

/// Hello element type carrying the version bitmap.
pub const HELLO_ELEM_VERSIONBITMAP: u16 = 1;

/// Port numbers (32-bit form; 1.0 ports are widened on decode).
pub mod port_no {
    /// Highest physical port number.
    pub const MAX: u32 = 0xffff_ff00;
    /// Local openflow "port".
    pub const LOCAL: u32 = 0xffff_fffe;
    /// Wildcard port used in stats requests.
    pub const ANY: u32 = 0xffff_ffff;
}

/// Wildcard group used in flow stats requests.
pub const GROUP_ANY: u32 = 0xffff_ffff;

/// All tables, for flow stats requests.
pub const TABLE_ALL: u8 = 0xff;

/// Port config bits.
pub mod port_config {
    pub const PORT_DOWN: u32 = 1 << 0;
    pub const NO_RECV: u32 = 1 << 2;
    pub const NO_FWD: u32 = 1 << 5;
    pub const NO_PACKET_IN: u32 = 1 << 6;
}

/// Port state bits.
pub mod port_state {
    pub const LINK_DOWN: u32 = 1 << 0;
    pub const BLOCKED: u32 = 1 << 1;
    pub const LIVE: u32 = 1 << 2;
}

/// Switch capability bits.
pub mod capabilities {
    pub const FLOW_STATS: u32 = 1 << 0;
    pub const TABLE_STATS: u32 = 1 << 1;
    pub const PORT_STATS: u32 = 1 << 2;
}

/// `miss_send_len` asking the switch to send whole packets.
pub const NO_BUFFER: u16 = 0xffff;

/// Ethertypes the controller looks at in packet-in payloads.
pub mod ether_type {
    pub const IPV6: u16 = 0x86dd;
    pub const LLDP: u16 = 0x88cc;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88a8;
}
