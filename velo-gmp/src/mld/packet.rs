//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_traits::FromPrimitive;
use velo_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use velo_utils::ip::Ipv6AddrExt;

use crate::packet::{
    DecodeError, DecodeResult, GroupRecord, Leave, Packet, PacketVersion,
    Query, QuerySsm, RecordType, Report, ReportSsm,
};
use crate::version::Mld;

//
// The MLDv1 message format is:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Type      |     Code      |          Checksum             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Maximum Response Delay    |          Reserved             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// ~                       Multicast Address                       ~
// |                                                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// An MLDv2 Query continues with the Resv/S/QRV and QQIC octets, the number
// of sources and the source list. The checksum is the ICMPv6 checksum and
// covers the IPv6 pseudo-header (RFC 2460, Section 8.1).
//

// MLD message types (ICMPv6).
pub const MSG_LISTENER_QUERY: u8 = 130;
pub const MSG_LISTENER_REPORT: u8 = 131;
pub const MSG_LISTENER_DONE: u8 = 132;
pub const MSG_LISTENER_REPORT_V2: u8 = 143;

const CKSUM_RANGE: std::ops::Range<usize> = 2..4;

// IPv6 Next Header value of ICMPv6.
const IP_PROTO_ICMPV6: u8 = 58;

// ===== impl Mld =====

impl PacketVersion<Self> for Mld {
    const MSG_MIN_LEN: usize = 24;
    const QUERY_SSM_MIN_LEN: usize = 28;
    const QUERY_OVERHEAD: usize = 28;

    fn decode_packet(
        data: &[u8],
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
    ) -> DecodeResult<Packet<Self>> {
        // Validate the message length.
        if data.len() < Self::MSG_MIN_LEN {
            return Err(DecodeError::LengthTooShort(data.len()));
        }

        // Verify the ICMPv6 checksum, including the pseudo-header.
        if checksum(data, src, dst) != [0, 0] {
            return Err(DecodeError::ChecksumMismatch);
        }

        let mut buf = Bytes::copy_from_slice(data);
        let msg_type = buf.get_u8();
        match msg_type {
            MSG_LISTENER_QUERY => decode_query(data.len(), &mut buf),
            MSG_LISTENER_REPORT => {
                let _ = buf.get_u8();
                let _cksum = buf.get_u16();
                let _ = buf.get_u16();
                let _ = buf.get_u16();
                let group_addr = buf.get_ipv6();
                Ok(Packet::Report(Report {
                    version: 1,
                    group_addr,
                }))
            }
            MSG_LISTENER_DONE => {
                let _ = buf.get_u8();
                let _cksum = buf.get_u16();
                let _ = buf.get_u16();
                let _ = buf.get_u16();
                let group_addr = buf.get_ipv6();
                Ok(Packet::Leave(Leave { group_addr }))
            }
            MSG_LISTENER_REPORT_V2 => decode_report_ssm(&mut buf),
            _ => Err(DecodeError::UnsupportedMessageType(msg_type)),
        }
    }

    fn encode_packet(
        packet: &Packet<Self>,
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
    ) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            match packet {
                Packet::Query(query) => encode_query(&mut buf, query),
                Packet::Report(report) => {
                    buf.put_u8(MSG_LISTENER_REPORT);
                    buf.put_u8(0);
                    buf.put_u16(0);
                    buf.put_u16(0);
                    buf.put_u16(0);
                    buf.put_ipv6(&report.group_addr);
                }
                Packet::ReportSsm(report) => {
                    encode_report_ssm(&mut buf, report)
                }
                Packet::Leave(leave) => {
                    buf.put_u8(MSG_LISTENER_DONE);
                    buf.put_u8(0);
                    buf.put_u16(0);
                    buf.put_u16(0);
                    buf.put_u16(0);
                    buf.put_ipv6(&leave.group_addr);
                }
            }

            // Compute and insert the ICMPv6 checksum.
            let cksum = checksum(&buf, src, dst);
            buf[CKSUM_RANGE].copy_from_slice(&cksum);

            buf.clone()
        })
    }
}

// ===== helper functions =====

// Computes the ICMPv6 checksum of an MLD message, covering the IPv6
// pseudo-header.
fn checksum(data: &[u8], src: &Ipv6Addr, dst: &Ipv6Addr) -> [u8; 2] {
    let mut cksum = Checksum::new();
    cksum.add_bytes(&src.octets());
    cksum.add_bytes(&dst.octets());
    cksum.add_bytes(&(data.len() as u32).to_be_bytes());
    cksum.add_bytes(&[0, 0, 0, IP_PROTO_ICMPV6]);
    cksum.add_bytes(data);
    cksum.checksum()
}

fn decode_query(msg_len: usize, buf: &mut Bytes) -> DecodeResult<Packet<Mld>> {
    let _ = buf.get_u8();
    let _cksum = buf.get_u16();
    let max_resp_code = buf.get_u16();
    let _ = buf.get_u16();
    let group_addr = buf.get_ipv6();

    //
    // The version of a Listener Query is determined by its size
    // (RFC 3810, Section 8.1):
    // - 24 octets: MLDv1.
    // - 28 octets or more: MLDv2.
    //
    if msg_len == Mld::MSG_MIN_LEN {
        return Ok(Packet::Query(Query {
            version: 1,
            max_resp_code,
            group_addr,
            ssm: None,
        }));
    }
    if msg_len < Mld::QUERY_SSM_MIN_LEN {
        return Err(DecodeError::LengthTooShort(msg_len));
    }

    let flags = buf.get_u8();
    let s_flag = flags & 0x08 != 0;
    let qrv = flags & 0x07;
    let qqic = buf.get_u8();
    let sources_cnt = buf.get_u16();
    if buf.remaining() < sources_cnt as usize * Ipv6Addr::LENGTH {
        return Err(DecodeError::LengthTooShort(msg_len));
    }
    let mut sources = Vec::with_capacity(sources_cnt as usize);
    for _ in 0..sources_cnt {
        sources.push(buf.get_ipv6());
    }

    Ok(Packet::Query(Query {
        version: 2,
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

fn decode_report_ssm(buf: &mut Bytes) -> DecodeResult<Packet<Mld>> {
    let _ = buf.get_u8();
    let _cksum = buf.get_u16();
    let _ = buf.get_u16();
    let records_cnt = buf.get_u16();

    let mut records = vec![];
    for _ in 0..records_cnt {
        if buf.remaining() < 20 {
            return Err(DecodeError::LengthTooShort(buf.remaining()));
        }
        let record_type = buf.get_u8();
        let aux_len = buf.get_u8() as usize * 4;
        let sources_cnt = buf.get_u16() as usize;
        let group_addr = buf.get_ipv6();
        if buf.remaining() < sources_cnt * Ipv6Addr::LENGTH + aux_len {
            return Err(DecodeError::LengthTooShort(buf.remaining()));
        }
        let mut sources = Vec::with_capacity(sources_cnt);
        for _ in 0..sources_cnt {
            sources.push(buf.get_ipv6());
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

fn encode_query(buf: &mut BytesMut, query: &Query<Mld>) {
    buf.put_u8(MSG_LISTENER_QUERY);
    buf.put_u8(0);
    buf.put_u16(0);
    buf.put_u16(query.max_resp_code);
    buf.put_u16(0);
    buf.put_ipv6(&query.group_addr);

    if let Some(ssm) = &query.ssm {
        let mut flags = ssm.qrv & 0x07;
        if ssm.s_flag {
            flags |= 0x08;
        }
        buf.put_u8(flags);
        buf.put_u8(ssm.qqic);
        buf.put_u16(ssm.sources.len() as u16);
        for source in &ssm.sources {
            buf.put_ipv6(source);
        }
    }
}

fn encode_report_ssm(buf: &mut BytesMut, report: &ReportSsm<Mld>) {
    buf.put_u8(MSG_LISTENER_REPORT_V2);
    buf.put_u8(0);
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u16(report.records.len() as u16);
    for record in &report.records {
        buf.put_u8(record.record_type as u8);
        buf.put_u8(0);
        buf.put_u16(record.sources.len() as u16);
        buf.put_ipv6(&record.group_addr);
        for source in &record.sources {
            buf.put_ipv6(source);
        }
    }
}
