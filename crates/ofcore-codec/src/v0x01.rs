//! OpenFlow 1.0 (wire version 0x01) bodies.
//!
//! Port numbers are widened to the 32-bit form on decode so the rest of the
//! controller deals with a single numbering. Port state is normalized the same way:
//! a port whose link is up carries the LIVE bit.

use bytes::{BufMut, Bytes, BytesMut};
use ofcore_frame::{Header, OFP_1_0};

use crate::error::{CodecError, Result};
use crate::hello::decode_elements;
use crate::message::{
    ErrorMsg, Experimenter, FlowStatsRequest, Hello, Message, MultipartReply, MultipartReplyBody,
    MultipartRequest, MultipartRequestBody, PacketIn, PortReason, PortStatus, SwitchConfig,
};
use crate::registry::ExperimenterRegistry;
use crate::stats::{FlowStats, PortDesc, SwitchFeatures, TableStats};
use crate::types::{port_state, MessageType, MultipartKind};
use crate::v0x04::{read_desc, read_port_counters, write_desc, write_port_counters};
use crate::wire::{put_string, WireReader};

const PHY_PORT_LEN: usize = 48;
const MATCH_LEN: usize = 40;
const FLOW_STATS_FIXED_LEN: usize = 88;
const TABLE_STATS_LEN: usize = 64;
const PORT_STATS_LEN: usize = 104;
const PORT_NAME_LEN: usize = 16;
const TABLE_NAME_LEN: usize = 32;
const OFPP_MAX: u16 = 0xff00;
const OFPFW_ALL: u32 = (1 << 22) - 1;

/// 16-bit port number to the 32-bit numbering.
fn widen_port(port: u16) -> u32 {
    if port >= OFPP_MAX {
        0xffff_0000 | port as u32
    } else {
        port as u32
    }
}

fn narrow_port(port: u32) -> Result<u16> {
    if port >= 0xffff_0000 | OFPP_MAX as u32 {
        return Ok((port & 0xffff) as u16);
    }
    u16::try_from(port)
        .ok()
        .filter(|p| *p < OFPP_MAX)
        .ok_or_else(|| CodecError::Malformed {
            what: "port number",
            reason: format!("{port} does not fit OpenFlow 1.0"),
        })
}

pub(crate) fn unpack(
    header: &Header,
    body: Bytes,
    registry: &ExperimenterRegistry,
) -> Result<Message> {
    let msg_type =
        MessageType::from_code(OFP_1_0, header.msg_type).ok_or(CodecError::UnknownType {
            version: OFP_1_0,
            code: header.msg_type,
        })?;
    let mut r = WireReader::new(body, "v0x01 body");

    let message = match msg_type {
        MessageType::Hello => Message::Hello(Hello {
            versions: decode_elements(&mut r)?.unwrap_or_default(),
        }),
        MessageType::Error => Message::Error(ErrorMsg {
            err_type: r.u16()?,
            code: r.u16()?,
            data: r.rest(),
        }),
        MessageType::EchoRequest => Message::EchoRequest(r.rest()),
        MessageType::EchoReply => Message::EchoReply(r.rest()),
        MessageType::Experimenter => Message::Experimenter(read_vendor(&mut r, registry)?),
        MessageType::FeaturesRequest => Message::FeaturesRequest,
        MessageType::FeaturesReply => Message::FeaturesReply(read_features(&mut r)?),
        MessageType::GetConfigRequest => Message::GetConfigRequest,
        MessageType::GetConfigReply => Message::GetConfigReply(read_config(&mut r)?),
        MessageType::SetConfig => Message::SetConfig(read_config(&mut r)?),
        MessageType::PortStatus => {
            let code = r.u8()?;
            let reason = PortReason::from_code(code).ok_or_else(|| CodecError::Malformed {
                what: "port status",
                reason: format!("unknown reason {code}"),
            })?;
            r.skip(7)?;
            Message::PortStatus(PortStatus {
                reason,
                desc: read_phy_port(&mut r)?,
            })
        }
        MessageType::PacketIn => Message::PacketIn(read_packet_in(&mut r)?),
        MessageType::MultipartRequest => Message::MultipartRequest(read_request(&mut r, registry)?),
        MessageType::MultipartReply => Message::MultipartReply(read_reply(&mut r, registry)?),
        MessageType::BarrierRequest => Message::BarrierRequest,
        MessageType::BarrierReply => Message::BarrierReply,
        other => Message::Opaque {
            msg_type: other,
            body: r.rest(),
        },
    };
    Ok(message)
}

pub(crate) fn pack(message: &Message, dst: &mut BytesMut) -> Result<()> {
    match message {
        // 1.0 hellos carry no elements.
        Message::Hello(_)
        | Message::FeaturesRequest
        | Message::GetConfigRequest
        | Message::BarrierRequest
        | Message::BarrierReply => {}
        Message::Error(err) => {
            dst.put_u16(err.err_type);
            dst.put_u16(err.code);
            dst.put_slice(&err.data);
        }
        Message::EchoRequest(data) | Message::EchoReply(data) => dst.put_slice(data),
        Message::Experimenter(exp) => write_vendor(exp, dst),
        Message::FeaturesReply(features) => {
            dst.put_u64(features.datapath_id);
            dst.put_u32(features.n_buffers);
            dst.put_u8(features.n_tables);
            dst.put_bytes(0, 3);
            dst.put_u32(features.capabilities);
            dst.put_u32(features.reserved);
            for port in &features.ports {
                write_phy_port(port, dst)?;
            }
        }
        Message::GetConfigReply(config) | Message::SetConfig(config) => {
            dst.put_u16(config.flags);
            dst.put_u16(config.miss_send_len);
        }
        Message::PortStatus(status) => {
            dst.put_u8(status.reason.code());
            dst.put_bytes(0, 7);
            write_phy_port(&status.desc, dst)?;
        }
        Message::PacketIn(packet) => {
            dst.put_u32(packet.buffer_id);
            dst.put_u16(packet.total_len);
            dst.put_u16(narrow_port(packet.in_port)?);
            dst.put_u8(packet.reason);
            dst.put_u8(0);
            dst.put_slice(&packet.data);
        }
        Message::MultipartRequest(req) => write_request(req, dst)?,
        Message::MultipartReply(reply) => write_reply(reply, dst)?,
        Message::Opaque { msg_type, body } => {
            if msg_type.code(OFP_1_0).is_none() {
                return Err(CodecError::Unencodable {
                    version: OFP_1_0,
                    msg_type: msg_type.wire_name(OFP_1_0),
                });
            }
            dst.put_slice(body);
        }
    }
    Ok(())
}

fn read_packet_in(r: &mut WireReader) -> Result<PacketIn> {
    let buffer_id = r.u32()?;
    let total_len = r.u16()?;
    let in_port = widen_port(r.u16()?);
    let reason = r.u8()?;
    r.skip(1)?;
    Ok(PacketIn {
        buffer_id,
        total_len,
        in_port,
        reason,
        table_id: 0,
        cookie: 0,
        data: r.rest(),
    })
}

fn read_vendor(r: &mut WireReader, registry: &ExperimenterRegistry) -> Result<Experimenter> {
    let experimenter = r.u32()?;
    let data = r.rest();
    let decoded = registry.decode(experimenter, 0, &data)?;
    Ok(Experimenter {
        experimenter,
        exp_type: 0,
        data,
        decoded,
    })
}

fn write_vendor(exp: &Experimenter, dst: &mut BytesMut) {
    dst.put_u32(exp.experimenter);
    dst.put_slice(&exp.data);
}

fn read_features(r: &mut WireReader) -> Result<SwitchFeatures> {
    let datapath_id = r.u64()?;
    let n_buffers = r.u32()?;
    let n_tables = r.u8()?;
    r.skip(3)?;
    let capabilities = r.u32()?;
    let reserved = r.u32()?;
    let mut ports = Vec::new();
    while r.remaining() > 0 {
        let mut e = r.sub(PHY_PORT_LEN, "phy port")?;
        ports.push(read_phy_port(&mut e)?);
    }
    Ok(SwitchFeatures {
        datapath_id,
        n_buffers,
        n_tables,
        auxiliary_id: 0,
        capabilities,
        reserved,
        ports,
    })
}

fn read_config(r: &mut WireReader) -> Result<SwitchConfig> {
    Ok(SwitchConfig {
        flags: r.u16()?,
        miss_send_len: r.u16()?,
    })
}

fn read_phy_port(r: &mut WireReader) -> Result<PortDesc> {
    r.need(PHY_PORT_LEN)?;
    let port_no = widen_port(r.u16()?);
    let hw_addr = r.array::<6>()?;
    let name = r.string(PORT_NAME_LEN)?;
    let config = r.u32()?;
    let raw_state = r.u32()?;
    let state = if raw_state & port_state::LINK_DOWN != 0 {
        port_state::LINK_DOWN
    } else {
        port_state::LIVE
    };
    Ok(PortDesc {
        port_no,
        hw_addr,
        name,
        config,
        state,
        curr: r.u32()?,
        advertised: r.u32()?,
        supported: r.u32()?,
        peer: r.u32()?,
        curr_speed: 0,
        max_speed: 0,
    })
}

fn write_phy_port(port: &PortDesc, dst: &mut BytesMut) -> Result<()> {
    dst.put_u16(narrow_port(port.port_no)?);
    dst.put_slice(&port.hw_addr);
    put_string(dst, &port.name, PORT_NAME_LEN);
    dst.put_u32(port.config);
    dst.put_u32(port.state & port_state::LINK_DOWN);
    dst.put_u32(port.curr);
    dst.put_u32(port.advertised);
    dst.put_u32(port.supported);
    dst.put_u32(port.peer);
    Ok(())
}

fn read_kind(r: &mut WireReader) -> Result<(MultipartKind, u16)> {
    let code = r.u16()?;
    let kind = MultipartKind::from_code(OFP_1_0, code).ok_or(CodecError::UnknownMultipartKind {
        version: OFP_1_0,
        code,
    })?;
    Ok((kind, r.u16()?))
}

fn write_kind(kind: MultipartKind, flags: u16, dst: &mut BytesMut) -> Result<()> {
    let code = kind.code(OFP_1_0).ok_or(CodecError::Unencodable {
        version: OFP_1_0,
        msg_type: "stats kind",
    })?;
    dst.put_u16(code);
    dst.put_u16(flags);
    Ok(())
}

fn read_request(r: &mut WireReader, registry: &ExperimenterRegistry) -> Result<MultipartRequest> {
    let (kind, flags) = read_kind(r)?;
    let body = match kind {
        MultipartKind::Desc => MultipartRequestBody::Desc,
        MultipartKind::Table => MultipartRequestBody::Table,
        MultipartKind::PortStats => {
            let port_no = widen_port(r.u16()?);
            r.skip(6)?;
            MultipartRequestBody::PortStats { port_no }
        }
        MultipartKind::Flow => {
            r.skip(MATCH_LEN)?;
            let table_id = r.u8()?;
            r.skip(1)?;
            let out_port = widen_port(r.u16()?);
            MultipartRequestBody::Flow(FlowStatsRequest {
                table_id,
                out_port,
                ..FlowStatsRequest::default()
            })
        }
        MultipartKind::Experimenter => MultipartRequestBody::Experimenter(read_vendor(r, registry)?),
        other => MultipartRequestBody::Other {
            kind: other,
            body: r.rest(),
        },
    };
    Ok(MultipartRequest { flags, body })
}

fn write_request(req: &MultipartRequest, dst: &mut BytesMut) -> Result<()> {
    write_kind(req.kind(), req.flags, dst)?;
    match &req.body {
        MultipartRequestBody::Desc | MultipartRequestBody::Table => {}
        MultipartRequestBody::PortDesc => {
            return Err(CodecError::Unencodable {
                version: OFP_1_0,
                msg_type: "port desc request",
            })
        }
        MultipartRequestBody::PortStats { port_no } => {
            dst.put_u16(narrow_port(*port_no)?);
            dst.put_bytes(0, 6);
        }
        MultipartRequestBody::Flow(flow) => {
            dst.put_u32(OFPFW_ALL);
            dst.put_bytes(0, MATCH_LEN - 4);
            dst.put_u8(flow.table_id);
            dst.put_u8(0);
            dst.put_u16(narrow_port(flow.out_port)?);
        }
        MultipartRequestBody::Experimenter(exp) => write_vendor(exp, dst),
        MultipartRequestBody::Other { body, .. } => dst.put_slice(body),
    }
    Ok(())
}

fn read_reply(r: &mut WireReader, registry: &ExperimenterRegistry) -> Result<MultipartReply> {
    let (kind, flags) = read_kind(r)?;
    let body = match kind {
        MultipartKind::Desc => MultipartReplyBody::Desc(read_desc(r)?),
        MultipartKind::Flow => {
            let mut entries = Vec::new();
            while r.remaining() > 0 {
                entries.push(read_flow_stats(r)?);
            }
            MultipartReplyBody::Flow(entries)
        }
        MultipartKind::Table => {
            let mut entries = Vec::new();
            while r.remaining() > 0 {
                let mut e = r.sub(TABLE_STATS_LEN, "table stats")?;
                let table_id = e.u8()?;
                e.skip(3 + TABLE_NAME_LEN + 8)?;
                entries.push(TableStats {
                    table_id,
                    active_count: e.u32()?,
                    lookup_count: e.u64()?,
                    matched_count: e.u64()?,
                });
            }
            MultipartReplyBody::Table(entries)
        }
        MultipartKind::PortStats => {
            let mut entries = Vec::new();
            while r.remaining() > 0 {
                let mut e = r.sub(PORT_STATS_LEN, "port stats")?;
                let port_no = widen_port(e.u16()?);
                e.skip(6)?;
                entries.push(read_port_counters(&mut e, port_no)?);
            }
            MultipartReplyBody::PortStats(entries)
        }
        MultipartKind::Experimenter => MultipartReplyBody::Experimenter(read_vendor(r, registry)?),
        other => MultipartReplyBody::Other {
            kind: other,
            body: r.rest(),
        },
    };
    Ok(MultipartReply { flags, body })
}

fn read_flow_stats(r: &mut WireReader) -> Result<FlowStats> {
    let length = r.u16()? as usize;
    if length < FLOW_STATS_FIXED_LEN {
        return Err(CodecError::Malformed {
            what: "flow stats",
            reason: format!("entry length {length}"),
        });
    }
    let mut e = r.sub(length - 2, "flow stats")?;
    let table_id = e.u8()?;
    e.skip(1)?;
    let match_raw = e.bytes(MATCH_LEN)?.to_vec();
    let duration_sec = e.u32()?;
    let duration_nsec = e.u32()?;
    let priority = e.u16()?;
    let idle_timeout = e.u16()?;
    let hard_timeout = e.u16()?;
    e.skip(6)?;
    Ok(FlowStats {
        table_id,
        duration_sec,
        duration_nsec,
        priority,
        idle_timeout,
        hard_timeout,
        flags: 0,
        cookie: e.u64()?,
        packet_count: e.u64()?,
        byte_count: e.u64()?,
        match_raw,
        instructions_raw: e.rest().to_vec(),
    })
}

fn write_reply(reply: &MultipartReply, dst: &mut BytesMut) -> Result<()> {
    write_kind(reply.kind(), reply.flags, dst)?;
    match &reply.body {
        MultipartReplyBody::Desc(desc) => write_desc(desc, dst),
        MultipartReplyBody::Flow(entries) => {
            for flow in entries {
                let mut match_raw = flow.match_raw.clone();
                match_raw.resize(MATCH_LEN, 0);
                let length = FLOW_STATS_FIXED_LEN + flow.instructions_raw.len();
                let length = u16::try_from(length).map_err(|_| CodecError::Malformed {
                    what: "flow stats",
                    reason: format!("entry length {length} exceeds 16 bits"),
                })?;
                dst.put_u16(length);
                dst.put_u8(flow.table_id);
                dst.put_u8(0);
                dst.put_slice(&match_raw);
                dst.put_u32(flow.duration_sec);
                dst.put_u32(flow.duration_nsec);
                dst.put_u16(flow.priority);
                dst.put_u16(flow.idle_timeout);
                dst.put_u16(flow.hard_timeout);
                dst.put_bytes(0, 6);
                dst.put_u64(flow.cookie);
                dst.put_u64(flow.packet_count);
                dst.put_u64(flow.byte_count);
                dst.put_slice(&flow.instructions_raw);
            }
        }
        MultipartReplyBody::Table(entries) => {
            for table in entries {
                dst.put_u8(table.table_id);
                dst.put_bytes(0, 3 + TABLE_NAME_LEN + 8);
                dst.put_u32(table.active_count);
                dst.put_u64(table.lookup_count);
                dst.put_u64(table.matched_count);
            }
        }
        MultipartReplyBody::PortStats(entries) => {
            for stats in entries {
                dst.put_u16(narrow_port(stats.port_no)?);
                dst.put_bytes(0, 6);
                write_port_counters(stats, dst);
            }
        }
        MultipartReplyBody::PortDesc(_) => {
            return Err(CodecError::Unencodable {
                version: OFP_1_0,
                msg_type: "port desc reply",
            })
        }
        MultipartReplyBody::Experimenter(exp) => write_vendor(exp, dst),
        MultipartReplyBody::Other { body, .. } => dst.put_slice(body),
    }
    Ok(())
}
