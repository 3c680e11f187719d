use bytes::Bytes;
use ofcore_frame::Header;

use crate::stats::{FlowStats, PortDesc, PortStats, SwitchDesc, SwitchFeatures, TableStats};
use crate::types::{
    ether_type, port_no, MessageType, MultipartKind, GROUP_ANY, MULTIPART_MORE, TABLE_ALL,
};

/// A decoded message with its header.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpMessage {
    pub header: Header,
    pub message: Message,
}

impl OfpMessage {
    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn xid(&self) -> u32 {
        self.header.xid
    }

    pub fn msg_type(&self) -> MessageType {
        self.message.msg_type()
    }

    /// Event-style type name, e.g. `ofpt_echo_request`.
    pub fn type_name(&self) -> &'static str {
        self.msg_type().wire_name(self.header.version)
    }
}

/// Typed message body.
///
/// Messages whose contents belong to collaborators (flow-mod, packet-out, ...) are
/// carried as [`Message::Opaque`] with their raw body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Bytes),
    EchoReply(Bytes),
    Experimenter(Experimenter),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PortStatus(PortStatus),
    PacketIn(PacketIn),
    MultipartRequest(MultipartRequest),
    MultipartReply(MultipartReply),
    BarrierRequest,
    BarrierReply,
    Opaque { msg_type: MessageType, body: Bytes },
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::Error(_) => MessageType::Error,
            Self::EchoRequest(_) => MessageType::EchoRequest,
            Self::EchoReply(_) => MessageType::EchoReply,
            Self::Experimenter(_) => MessageType::Experimenter,
            Self::FeaturesRequest => MessageType::FeaturesRequest,
            Self::FeaturesReply(_) => MessageType::FeaturesReply,
            Self::GetConfigRequest => MessageType::GetConfigRequest,
            Self::GetConfigReply(_) => MessageType::GetConfigReply,
            Self::SetConfig(_) => MessageType::SetConfig,
            Self::PortStatus(_) => MessageType::PortStatus,
            Self::PacketIn(_) => MessageType::PacketIn,
            Self::MultipartRequest(_) => MessageType::MultipartRequest,
            Self::MultipartReply(_) => MessageType::MultipartReply,
            Self::BarrierRequest => MessageType::BarrierRequest,
            Self::BarrierReply => MessageType::BarrierReply,
            Self::Opaque { msg_type, .. } => *msg_type,
        }
    }

    /// Hello advertising `versions` in a bitmap element (1.3 and later encodings only).
    pub fn hello(versions: &[u8]) -> Self {
        Self::Hello(Hello {
            versions: versions.to_vec(),
        })
    }

    pub fn error(err_type: u16, code: u16, data: Bytes) -> Self {
        Self::Error(ErrorMsg {
            err_type,
            code,
            data,
        })
    }

    pub fn multipart_request(body: MultipartRequestBody) -> Self {
        Self::MultipartRequest(MultipartRequest { flags: 0, body })
    }
}

/// Hello. `versions` is the bitmap content; empty means no bitmap element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hello {
    pub versions: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Bytes,
}

/// Experimenter (1.0: vendor) message or multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Experimenter {
    pub experimenter: u32,
    /// Always 0 for OpenFlow 1.0 vendor messages.
    pub exp_type: u32,
    pub data: Bytes,
    /// Set when a decoder is registered for `experimenter`.
    pub decoded: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortReason {
    Add,
    Delete,
    Modify,
}

impl PortReason {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Delete),
            2 => Some(Self::Modify),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Delete => 1,
            Self::Modify => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

/// Packet handed to the controller. Match fields other than the ingress port are
/// not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u32,
    pub reason: u8,
    /// 0 for OpenFlow 1.0.
    pub table_id: u8,
    /// 0 for OpenFlow 1.0.
    pub cookie: u64,
    pub data: Bytes,
}

impl PacketIn {
    /// Ethernet header of the carried frame, looking through VLAN tags.
    ///
    /// `None` when the data is too short to hold one.
    pub fn ethernet(&self) -> Option<EthernetHeader> {
        let data = self.data.as_ref();
        let dst: [u8; 6] = data.get(0..6)?.try_into().ok()?;
        let src: [u8; 6] = data.get(6..12)?.try_into().ok()?;
        let mut offset = 12;
        let mut kind = read_u16(data, offset)?;
        while kind == ether_type::VLAN || kind == ether_type::QINQ {
            offset += 4;
            kind = read_u16(data, offset)?;
        }
        Some(EthernetHeader {
            dst,
            src,
            ether_type: kind,
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    /// Innermost ethertype.
    pub ether_type: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartRequest {
    pub flags: u16,
    pub body: MultipartRequestBody,
}

impl MultipartRequest {
    pub fn kind(&self) -> MultipartKind {
        self.body.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartRequestBody {
    Desc,
    Flow(FlowStatsRequest),
    Table,
    PortStats { port_no: u32 },
    PortDesc,
    Experimenter(Experimenter),
    Other { kind: MultipartKind, body: Bytes },
}

impl MultipartRequestBody {
    pub fn kind(&self) -> MultipartKind {
        match self {
            Self::Desc => MultipartKind::Desc,
            Self::Flow(_) => MultipartKind::Flow,
            Self::Table => MultipartKind::Table,
            Self::PortStats { .. } => MultipartKind::PortStats,
            Self::PortDesc => MultipartKind::PortDesc,
            Self::Experimenter(_) => MultipartKind::Experimenter,
            Self::Other { kind, .. } => *kind,
        }
    }

    /// Port stats for every port.
    pub fn all_port_stats() -> Self {
        Self::PortStats {
            port_no: port_no::ANY,
        }
    }
}

/// Flow stats filter. The default matches every flow in every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatsRequest {
    pub table_id: u8,
    pub out_port: u32,
    pub out_group: u32,
    pub cookie: u64,
    pub cookie_mask: u64,
}

impl Default for FlowStatsRequest {
    fn default() -> Self {
        Self {
            table_id: TABLE_ALL,
            out_port: port_no::ANY,
            out_group: GROUP_ANY,
            cookie: 0,
            cookie_mask: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartReply {
    pub flags: u16,
    pub body: MultipartReplyBody,
}

impl MultipartReply {
    /// More fragments follow under the same xid.
    pub fn more(&self) -> bool {
        self.flags & MULTIPART_MORE != 0
    }

    pub fn kind(&self) -> MultipartKind {
        self.body.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartReplyBody {
    Desc(SwitchDesc),
    Flow(Vec<FlowStats>),
    Table(Vec<TableStats>),
    PortStats(Vec<PortStats>),
    PortDesc(Vec<PortDesc>),
    Experimenter(Experimenter),
    Other { kind: MultipartKind, body: Bytes },
}

impl MultipartReplyBody {
    pub fn kind(&self) -> MultipartKind {
        match self {
            Self::Desc(_) => MultipartKind::Desc,
            Self::Flow(_) => MultipartKind::Flow,
            Self::Table(_) => MultipartKind::Table,
            Self::PortStats(_) => MultipartKind::PortStats,
            Self::PortDesc(_) => MultipartKind::PortDesc,
            Self::Experimenter(_) => MultipartKind::Experimenter,
            Self::Other { kind, .. } => *kind,
        }
    }
}
