//! OpenFlow 1.3 (wire version 0x04) bodies.

use bytes::{BufMut, Bytes, BytesMut};
use ofcore_frame::{Header, OFP_1_3};

use crate::error::{CodecError, Result};
use crate::hello::{decode_elements, encode_bitmap};
use crate::message::{
    ErrorMsg, Experimenter, FlowStatsRequest, Hello, Message, MultipartReply, MultipartReplyBody,
    MultipartRequest, MultipartRequestBody, PacketIn, PortReason, PortStatus, SwitchConfig,
};
use crate::registry::ExperimenterRegistry;
use crate::stats::{FlowStats, PortDesc, PortStats, SwitchDesc, SwitchFeatures, TableStats};
use crate::types::{MessageType, MultipartKind};
use crate::wire::{pad8, put_string, WireReader};

const PORT_DESC_LEN: usize = 64;
const PORT_STATS_LEN: usize = 112;
const TABLE_STATS_LEN: usize = 24;
const FLOW_STATS_FIXED_LEN: usize = 48;
const DESC_STR_LEN: usize = 256;
const SERIAL_NUM_LEN: usize = 32;
const PORT_NAME_LEN: usize = 16;
const OFPMT_OXM: u16 = 1;
const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;
const OFPXMT_OFB_IN_PORT: u8 = 0;

pub(crate) fn unpack(
    header: &Header,
    body: Bytes,
    registry: &ExperimenterRegistry,
) -> Result<Message> {
    let msg_type =
        MessageType::from_code(OFP_1_3, header.msg_type).ok_or(CodecError::UnknownType {
            version: OFP_1_3,
            code: header.msg_type,
        })?;
    let mut r = WireReader::new(body, "v0x04 body");

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
        MessageType::Experimenter => Message::Experimenter(read_experimenter(&mut r, registry)?),
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
                desc: read_port(&mut r)?,
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
        Message::Hello(hello) => {
            if !hello.versions.is_empty() {
                encode_bitmap(&hello.versions, dst);
            }
        }
        Message::Error(err) => {
            dst.put_u16(err.err_type);
            dst.put_u16(err.code);
            dst.put_slice(&err.data);
        }
        Message::EchoRequest(data) | Message::EchoReply(data) => dst.put_slice(data),
        Message::Experimenter(exp) => write_experimenter(exp, dst),
        Message::FeaturesRequest
        | Message::GetConfigRequest
        | Message::BarrierRequest
        | Message::BarrierReply => {}
        Message::FeaturesReply(features) => {
            dst.put_u64(features.datapath_id);
            dst.put_u32(features.n_buffers);
            dst.put_u8(features.n_tables);
            dst.put_u8(features.auxiliary_id);
            dst.put_bytes(0, 2);
            dst.put_u32(features.capabilities);
            dst.put_u32(features.reserved);
        }
        Message::GetConfigReply(config) | Message::SetConfig(config) => {
            dst.put_u16(config.flags);
            dst.put_u16(config.miss_send_len);
        }
        Message::PortStatus(status) => {
            dst.put_u8(status.reason.code());
            dst.put_bytes(0, 7);
            write_port(&status.desc, dst);
        }
        Message::PacketIn(packet) => write_packet_in(packet, dst),
        Message::MultipartRequest(req) => write_request(req, dst)?,
        Message::MultipartReply(reply) => write_reply(reply, dst)?,
        Message::Opaque { body, .. } => dst.put_slice(body),
    }
    Ok(())
}

fn read_packet_in(r: &mut WireReader) -> Result<PacketIn> {
    let buffer_id = r.u32()?;
    let total_len = r.u16()?;
    let reason = r.u8()?;
    let table_id = r.u8()?;
    let cookie = r.u64()?;
    // ofp_match: type, length (unpadded), OXM fields, padding to 8.
    r.skip(2)?;
    let match_len = r.u16()? as usize;
    if match_len < 4 {
        return Err(CodecError::Malformed {
            what: "packet-in match",
            reason: format!("match length {match_len}"),
        });
    }
    let fields = r.bytes(match_len - 4)?;
    r.skip(pad8(match_len) - match_len)?;
    r.skip(2)?;
    Ok(PacketIn {
        buffer_id,
        total_len,
        in_port: oxm_in_port(&fields).unwrap_or(0),
        reason,
        table_id,
        cookie,
        data: r.rest(),
    })
}

/// IN_PORT value of an OXM field list.
fn oxm_in_port(mut fields: &[u8]) -> Option<u32> {
    while fields.len() >= 4 {
        let class = u16::from_be_bytes([fields[0], fields[1]]);
        let field = fields[2] >> 1;
        let len = fields[3] as usize;
        let value = fields.get(4..4 + len)?;
        if class == OFPXMC_OPENFLOW_BASIC && field == OFPXMT_OFB_IN_PORT && len == 4 {
            return Some(u32::from_be_bytes([value[0], value[1], value[2], value[3]]));
        }
        fields = &fields[4 + len..];
    }
    None
}

fn write_packet_in(packet: &PacketIn, dst: &mut BytesMut) {
    dst.put_u32(packet.buffer_id);
    dst.put_u16(packet.total_len);
    dst.put_u8(packet.reason);
    dst.put_u8(packet.table_id);
    dst.put_u64(packet.cookie);
    // Match holding only IN_PORT: 4 + 8 bytes, padded to 16.
    dst.put_u16(OFPMT_OXM);
    dst.put_u16(12);
    dst.put_u16(OFPXMC_OPENFLOW_BASIC);
    dst.put_u8(OFPXMT_OFB_IN_PORT << 1);
    dst.put_u8(4);
    dst.put_u32(packet.in_port);
    dst.put_bytes(0, 4);
    dst.put_bytes(0, 2);
    dst.put_slice(&packet.data);
}

fn read_experimenter(r: &mut WireReader, registry: &ExperimenterRegistry) -> Result<Experimenter> {
    let experimenter = r.u32()?;
    let exp_type = r.u32()?;
    let data = r.rest();
    let decoded = registry.decode(experimenter, exp_type, &data)?;
    Ok(Experimenter {
        experimenter,
        exp_type,
        data,
        decoded,
    })
}

fn write_experimenter(exp: &Experimenter, dst: &mut BytesMut) {
    dst.put_u32(exp.experimenter);
    dst.put_u32(exp.exp_type);
    dst.put_slice(&exp.data);
}

fn read_features(r: &mut WireReader) -> Result<SwitchFeatures> {
    let datapath_id = r.u64()?;
    let n_buffers = r.u32()?;
    let n_tables = r.u8()?;
    let auxiliary_id = r.u8()?;
    r.skip(2)?;
    Ok(SwitchFeatures {
        datapath_id,
        n_buffers,
        n_tables,
        auxiliary_id,
        capabilities: r.u32()?,
        reserved: r.u32()?,
        ports: Vec::new(),
    })
}

fn read_config(r: &mut WireReader) -> Result<SwitchConfig> {
    Ok(SwitchConfig {
        flags: r.u16()?,
        miss_send_len: r.u16()?,
    })
}

pub(crate) fn read_port(r: &mut WireReader) -> Result<PortDesc> {
    r.need(PORT_DESC_LEN)?;
    let port_no = r.u32()?;
    r.skip(4)?;
    let hw_addr = r.array::<6>()?;
    r.skip(2)?;
    Ok(PortDesc {
        port_no,
        hw_addr,
        name: r.string(PORT_NAME_LEN)?,
        config: r.u32()?,
        state: r.u32()?,
        curr: r.u32()?,
        advertised: r.u32()?,
        supported: r.u32()?,
        peer: r.u32()?,
        curr_speed: r.u32()?,
        max_speed: r.u32()?,
    })
}

fn write_port(port: &PortDesc, dst: &mut BytesMut) {
    dst.put_u32(port.port_no);
    dst.put_bytes(0, 4);
    dst.put_slice(&port.hw_addr);
    dst.put_bytes(0, 2);
    put_string(dst, &port.name, PORT_NAME_LEN);
    for word in [
        port.config,
        port.state,
        port.curr,
        port.advertised,
        port.supported,
        port.peer,
        port.curr_speed,
        port.max_speed,
    ] {
        dst.put_u32(word);
    }
}

fn read_kind(r: &mut WireReader) -> Result<(MultipartKind, u16)> {
    let code = r.u16()?;
    let kind = MultipartKind::from_code(OFP_1_3, code).ok_or(CodecError::UnknownMultipartKind {
        version: OFP_1_3,
        code,
    })?;
    let flags = r.u16()?;
    r.skip(4)?;
    Ok((kind, flags))
}

fn write_kind(kind: MultipartKind, flags: u16, dst: &mut BytesMut) -> Result<()> {
    let code = kind.code(OFP_1_3).ok_or(CodecError::Unencodable {
        version: OFP_1_3,
        msg_type: "multipart kind",
    })?;
    dst.put_u16(code);
    dst.put_u16(flags);
    dst.put_bytes(0, 4);
    Ok(())
}

fn read_request(r: &mut WireReader, registry: &ExperimenterRegistry) -> Result<MultipartRequest> {
    let (kind, flags) = read_kind(r)?;
    let body = match kind {
        MultipartKind::Desc => MultipartRequestBody::Desc,
        MultipartKind::Table => MultipartRequestBody::Table,
        MultipartKind::PortDesc => MultipartRequestBody::PortDesc,
        MultipartKind::PortStats => {
            let port_no = r.u32()?;
            r.skip(4)?;
            MultipartRequestBody::PortStats { port_no }
        }
        MultipartKind::Flow => {
            let table_id = r.u8()?;
            r.skip(3)?;
            let out_port = r.u32()?;
            let out_group = r.u32()?;
            r.skip(4)?;
            let cookie = r.u64()?;
            let cookie_mask = r.u64()?;
            // Trailing match is not interpreted here.
            let _ = r.rest();
            MultipartRequestBody::Flow(FlowStatsRequest {
                table_id,
                out_port,
                out_group,
                cookie,
                cookie_mask,
            })
        }
        MultipartKind::Experimenter => {
            MultipartRequestBody::Experimenter(read_experimenter(r, registry)?)
        }
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
        MultipartRequestBody::Desc | MultipartRequestBody::Table | MultipartRequestBody::PortDesc => {}
        MultipartRequestBody::PortStats { port_no } => {
            dst.put_u32(*port_no);
            dst.put_bytes(0, 4);
        }
        MultipartRequestBody::Flow(flow) => {
            dst.put_u8(flow.table_id);
            dst.put_bytes(0, 3);
            dst.put_u32(flow.out_port);
            dst.put_u32(flow.out_group);
            dst.put_bytes(0, 4);
            dst.put_u64(flow.cookie);
            dst.put_u64(flow.cookie_mask);
            // Empty OXM match: type, length 4, padded to 8.
            dst.put_u16(OFPMT_OXM);
            dst.put_u16(4);
            dst.put_bytes(0, 4);
        }
        MultipartRequestBody::Experimenter(exp) => write_experimenter(exp, dst),
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
                e.skip(3)?;
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
                let port_no = e.u32()?;
                e.skip(4)?;
                entries.push(read_port_counters(&mut e, port_no)?);
            }
            MultipartReplyBody::PortStats(entries)
        }
        MultipartKind::PortDesc => {
            let mut entries = Vec::new();
            while r.remaining() > 0 {
                let mut e = r.sub(PORT_DESC_LEN, "port desc")?;
                entries.push(read_port(&mut e)?);
            }
            MultipartReplyBody::PortDesc(entries)
        }
        MultipartKind::Experimenter => {
            MultipartReplyBody::Experimenter(read_experimenter(r, registry)?)
        }
        other => MultipartReplyBody::Other {
            kind: other,
            body: r.rest(),
        },
    };
    Ok(MultipartReply { flags, body })
}

pub(crate) fn read_desc(r: &mut WireReader) -> Result<SwitchDesc> {
    Ok(SwitchDesc {
        manufacturer: r.string(DESC_STR_LEN)?,
        hardware: r.string(DESC_STR_LEN)?,
        software: r.string(DESC_STR_LEN)?,
        serial: r.string(SERIAL_NUM_LEN)?,
        datapath: r.string(DESC_STR_LEN)?,
    })
}

pub(crate) fn write_desc(desc: &SwitchDesc, dst: &mut BytesMut) {
    put_string(dst, &desc.manufacturer, DESC_STR_LEN);
    put_string(dst, &desc.hardware, DESC_STR_LEN);
    put_string(dst, &desc.software, DESC_STR_LEN);
    put_string(dst, &desc.serial, SERIAL_NUM_LEN);
    put_string(dst, &desc.datapath, DESC_STR_LEN);
}

/// The twelve counters shared by 1.0 and 1.3 port stats; 1.3 adds a duration.
pub(crate) fn read_port_counters(e: &mut WireReader, port_no: u32) -> Result<PortStats> {
    let mut stats = PortStats {
        port_no,
        rx_packets: e.u64()?,
        tx_packets: e.u64()?,
        rx_bytes: e.u64()?,
        tx_bytes: e.u64()?,
        rx_dropped: e.u64()?,
        tx_dropped: e.u64()?,
        rx_errors: e.u64()?,
        tx_errors: e.u64()?,
        rx_frame_err: e.u64()?,
        rx_over_err: e.u64()?,
        rx_crc_err: e.u64()?,
        collisions: e.u64()?,
        duration_sec: 0,
        duration_nsec: 0,
    };
    if e.remaining() >= 8 {
        stats.duration_sec = e.u32()?;
        stats.duration_nsec = e.u32()?;
    }
    Ok(stats)
}

pub(crate) fn write_port_counters(stats: &PortStats, dst: &mut BytesMut) {
    for counter in [
        stats.rx_packets,
        stats.tx_packets,
        stats.rx_bytes,
        stats.tx_bytes,
        stats.rx_dropped,
        stats.tx_dropped,
        stats.rx_errors,
        stats.tx_errors,
        stats.rx_frame_err,
        stats.rx_over_err,
        stats.rx_crc_err,
        stats.collisions,
    ] {
        dst.put_u64(counter);
    }
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
    let duration_sec = e.u32()?;
    let duration_nsec = e.u32()?;
    let priority = e.u16()?;
    let idle_timeout = e.u16()?;
    let hard_timeout = e.u16()?;
    let flags = e.u16()?;
    e.skip(4)?;
    let cookie = e.u64()?;
    let packet_count = e.u64()?;
    let byte_count = e.u64()?;

    // ofp_match: type, length (unpadded), fields, padding to 8.
    e.need(4)?;
    let match_head = e.bytes(4)?;
    let match_len = u16::from_be_bytes([match_head[2], match_head[3]]) as usize;
    if match_len < 4 {
        return Err(CodecError::Malformed {
            what: "flow stats match",
            reason: format!("match length {match_len}"),
        });
    }
    let match_rest = e.bytes(pad8(match_len) - 4)?;
    let mut match_raw = match_head.to_vec();
    match_raw.extend_from_slice(&match_rest[..match_len - 4]);

    Ok(FlowStats {
        table_id,
        duration_sec,
        duration_nsec,
        priority,
        idle_timeout,
        hard_timeout,
        flags,
        cookie,
        packet_count,
        byte_count,
        match_raw,
        instructions_raw: e.rest().to_vec(),
    })
}

fn write_flow_stats(flow: &FlowStats, dst: &mut BytesMut) -> Result<()> {
    let match_raw: &[u8] = if flow.match_raw.len() >= 4 {
        &flow.match_raw
    } else {
        &[0, 1, 0, 4]
    };
    let match_padded = pad8(match_raw.len());
    let length = FLOW_STATS_FIXED_LEN + match_padded + flow.instructions_raw.len();
    let length = u16::try_from(length).map_err(|_| CodecError::Malformed {
        what: "flow stats",
        reason: format!("entry length {length} exceeds 16 bits"),
    })?;

    dst.put_u16(length);
    dst.put_u8(flow.table_id);
    dst.put_u8(0);
    dst.put_u32(flow.duration_sec);
    dst.put_u32(flow.duration_nsec);
    dst.put_u16(flow.priority);
    dst.put_u16(flow.idle_timeout);
    dst.put_u16(flow.hard_timeout);
    dst.put_u16(flow.flags);
    dst.put_bytes(0, 4);
    dst.put_u64(flow.cookie);
    dst.put_u64(flow.packet_count);
    dst.put_u64(flow.byte_count);
    dst.put_slice(&match_raw[..2]);
    dst.put_u16(match_raw.len() as u16);
    dst.put_slice(&match_raw[4..]);
    dst.put_bytes(0, match_padded - match_raw.len());
    dst.put_slice(&flow.instructions_raw);
    Ok(())
}

fn write_reply(reply: &MultipartReply, dst: &mut BytesMut) -> Result<()> {
    write_kind(reply.kind(), reply.flags, dst)?;
    match &reply.body {
        MultipartReplyBody::Desc(desc) => write_desc(desc, dst),
        MultipartReplyBody::Flow(entries) => {
            for flow in entries {
                write_flow_stats(flow, dst)?;
            }
        }
        MultipartReplyBody::Table(entries) => {
            for table in entries {
                dst.put_u8(table.table_id);
                dst.put_bytes(0, 3);
                dst.put_u32(table.active_count);
                dst.put_u64(table.lookup_count);
                dst.put_u64(table.matched_count);
            }
        }
        MultipartReplyBody::PortStats(entries) => {
            for stats in entries {
                dst.put_u32(stats.port_no);
                dst.put_bytes(0, 4);
                write_port_counters(stats, dst);
                dst.put_u32(stats.duration_sec);
                dst.put_u32(stats.duration_nsec);
            }
        }
        MultipartReplyBody::PortDesc(entries) => {
            for port in entries {
                write_port(port, dst);
            }
        }
        MultipartReplyBody::Experimenter(exp) => write_experimenter(exp, dst),
        MultipartReplyBody::Other { body, .. } => dst.put_slice(body),
    }
    Ok(())
}
