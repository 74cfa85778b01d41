//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;
use velo_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use velo_utils::ip::Ipv4AddrExt;

use crate::packet::{
    DecodeError, DecodeResult, GroupRecord, Leave, Packet, PacketVersion,
    Query, QuerySsm, RecordType, Report, ReportSsm,
};
use crate::version::Igmp;

//
// The common IGMP message format is:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |      Type     | Max Resp Time |           Checksum            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Group Address                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// An IGMPv3 Query continues with the Resv/S/QRV and QQIC octets, the number
// of sources and the source list. An IGMPv3 Report replaces the fixed group
// address with a sequence of group records.
//

// IGMP message types.
pub const MSG_MEMBERSHIP_QUERY: u8 = 0x11;
pub const MSG_V1_MEMBERSHIP_REPORT: u8 = 0x12;
pub const MSG_DVMRP: u8 = 0x13;
pub const MSG_PIM_V1: u8 = 0x14;
pub const MSG_V2_MEMBERSHIP_REPORT: u8 = 0x16;
pub const MSG_V2_LEAVE_GROUP: u8 = 0x17;
pub const MSG_MTRACE_RESPONSE: u8 = 0x1e;
pub const MSG_MTRACE_QUERY: u8 = 0x1f;
pub const MSG_V3_MEMBERSHIP_REPORT: u8 = 0x22;

const CKSUM_RANGE: std::ops::Range<usize> = 2..4;

// ===== impl Igmp =====

impl PacketVersion<Self> for Igmp {
    const MSG_MIN_LEN: usize = 8;
    const QUERY_SSM_MIN_LEN: usize = 12;
    const QUERY_OVERHEAD: usize = 12;

    fn decode_packet(
        data: &[u8],
        _src: &Ipv4Addr,
        _dst: &Ipv4Addr,
    ) -> DecodeResult<Packet<Self>> {
        // Validate the message length.
        if data.len() < Self::MSG_MIN_LEN {
            return Err(DecodeError::LengthTooShort(data.len()));
        }

        // Verify the checksum over the whole IGMP message.
        if internet_checksum::checksum(data) != [0, 0] {
            return Err(DecodeError::ChecksumMismatch);
        }

        let mut buf = Bytes::copy_from_slice(data);
        let msg_type = buf.get_u8();
        match msg_type {
            MSG_MEMBERSHIP_QUERY => decode_query(data.len(), &mut buf),
            MSG_V1_MEMBERSHIP_REPORT | MSG_V2_MEMBERSHIP_REPORT => {
                let _ = buf.get_u8();
                let _cksum = buf.get_u16();
                let group_addr = buf.get_ipv4();
                let version = if msg_type == MSG_V1_MEMBERSHIP_REPORT {
                    1
                } else {
                    2
                };
                Ok(Packet::Report(Report {
                    version,
                    group_addr,
                }))
            }
            MSG_V2_LEAVE_GROUP => {
                let _ = buf.get_u8();
                let _cksum = buf.get_u16();
                let group_addr = buf.get_ipv4();
                Ok(Packet::Leave(Leave { group_addr }))
            }
            MSG_V3_MEMBERSHIP_REPORT => decode_report_ssm(&mut buf),
            // DVMRP, PIMv1 and mtrace messages share the IGMP protocol
            // number but belong to other components.
            _ => Err(DecodeError::UnsupportedMessageType(msg_type)),
        }
    }

    fn encode_packet(
        packet: &Packet<Self>,
        _src: &Ipv4Addr,
        _dst: &Ipv4Addr,
    ) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            match packet {
                Packet::Query(query) => encode_query(&mut buf, query),
                Packet::Report(report) => {
                    let msg_type = if report.version == 1 {
                        MSG_V1_MEMBERSHIP_REPORT
                    } else {
                        MSG_V2_MEMBERSHIP_REPORT
                    };
                    buf.put_u8(msg_type);
                    buf.put_u8(0);
                    buf.put_u16(0);
                    buf.put_ipv4(&report.group_addr);
                }
                Packet::ReportSsm(report) => {
                    encode_report_ssm(&mut buf, report)
                }
                Packet::Leave(leave) => {
                    buf.put_u8(MSG_V2_LEAVE_GROUP);
                    buf.put_u8(0);
                    buf.put_u16(0);
                    buf.put_ipv4(&leave.group_addr);
                }
            }

            // Compute and insert the checksum.
            let cksum = internet_checksum::checksum(&buf);
            buf[CKSUM_RANGE].copy_from_slice(&cksum);

            buf.clone()
        })
    }
}

// ===== helper functions =====

fn decode_query(
    msg_len: usize,
    buf: &mut Bytes,
) -> DecodeResult<Packet<Igmp>> {
    let max_resp_code = buf.get_u8() as u16;
    let _cksum = buf.get_u16();
    let group_addr = buf.get_ipv4();

    //
    // The version of a Membership Query is determined by its size and
    // Max Resp Code (RFC 3376, Section 7.1):
    // - 8 octets with a zero code: IGMPv1.
    // - 8 octets with a non-zero code: IGMPv2.
    // - 12 octets or more: IGMPv3.
    //
    if msg_len == Igmp::MSG_MIN_LEN {
        let version = if max_resp_code == 0 { 1 } else { 2 };
        return Ok(Packet::Query(Query {
            version,
            max_resp_code,
            group_addr,
            ssm: None,
        }));
    }
    if msg_len < Igmp::QUERY_SSM_MIN_LEN {
        return Err(DecodeError::LengthTooShort(msg_len));
    }

    let flags = buf.get_u8();
    let s_flag = flags & 0x08 != 0;
    let qrv = flags & 0x07;
    let qqic = buf.get_u8();
    let sources_cnt = buf.get_u16();
    if buf.remaining() < sources_cnt as usize * Ipv4Addr::LENGTH {
        return Err(DecodeError::LengthTooShort(msg_len));
    }
    let mut sources = Vec::with_capacity(sources_cnt as usize);
    for _ in 0..sources_cnt {
        sources.push(buf.get_ipv4());
    }

    Ok(Packet::Query(Query {
        version: 3,
        max_resp_code,
        group_addr,
        ssm: Some(QuerySsm {
            s_flag,
            qrv,
            qqic,
            sources,
        }),
    }))
}

fn decode_report_ssm(buf: &mut Bytes) -> DecodeResult<Packet<Igmp>> {
    let _ = buf.get_u8();
    let _cksum = buf.get_u16();
    let _ = buf.get_u16();
    let records_cnt = buf.get_u16();

    let mut records = vec![];
    for _ in 0..records_cnt {
        if buf.remaining() < 8 {
            return Err(DecodeError::LengthTooShort(buf.remaining()));
        }
        let record_type = buf.get_u8();
        let aux_len = buf.get_u8() as usize * 4;
        let sources_cnt = buf.get_u16() as usize;
        let group_addr = buf.get_ipv4();
        if buf.remaining() < sources_cnt * Ipv4Addr::LENGTH + aux_len {
            return Err(DecodeError::LengthTooShort(buf.remaining()));
        }
        let mut sources = Vec::with_capacity(sources_cnt);
        for _ in 0..sources_cnt {
            sources.push(buf.get_ipv4());
        }
        // Skip the auxiliary data.
        buf.advance(aux_len);

        // Records of unknown type are ignored, the others in the message
        // are still processed.
        let Some(record_type) = RecordType::from_u8(record_type) else {
            continue;
        };
        records.push(GroupRecord {
            record_type,
            group_addr,
            sources,
        });
    }

    Ok(Packet::ReportSsm(ReportSsm { records }))
}

fn encode_query(buf: &mut BytesMut, query: &Query<Igmp>) {
    buf.put_u8(MSG_MEMBERSHIP_QUERY);
    // An IGMPv1 Query carries a zero Max Resp Time.
    if query.version == 1 {
        buf.put_u8(0);
    } else {
        buf.put_u8(query.max_resp_code as u8);
    }
    buf.put_u16(0);
    buf.put_ipv4(&query.group_addr);

    if let Some(ssm) = &query.ssm {
        let mut flags = ssm.qrv & 0x07;
        if ssm.s_flag {
            flags |= 0x08;
        }
        buf.put_u8(flags);
        buf.put_u8(ssm.qqic);
        buf.put_u16(ssm.sources.len() as u16);
        for source in &ssm.sources {
            buf.put_ipv4(source);
        }
    }
}

fn encode_report_ssm(buf: &mut BytesMut, report: &ReportSsm<Igmp>) {
    buf.put_u8(MSG_V3_MEMBERSHIP_REPORT);
    buf.put_u8(0);
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u16(report.records.len() as u16);
    for record in &report.records {
        buf.put_u8(record.record_type as u8);
        buf.put_u8(0);
        buf.put_u16(record.sources.len() as u16);
        buf.put_ipv4(&record.group_addr);
        for source in &record.sources {
            buf.put_ipv4(source);
        }
    }
}
