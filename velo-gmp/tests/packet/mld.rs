//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;
use std::sync::LazyLock as Lazy;

use const_addrs::ip6;
use velo_gmp::packet::{
    DecodeError, DecodeResult, GroupRecord, Leave, Packet, Query, QuerySsm,
    RecordType, Report, ReportSsm,
};
use velo_gmp::version::Mld;

//
// Helper functions.
//

// The MLD checksum covers the IPv6 pseudo-header, so every test vector
// fixes its source and destination addresses.
fn test_encode_packet(
    bytes_expected: &[u8],
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    packet: &DecodeResult<Packet<Mld>>,
) {
    let bytes_actual = packet.as_ref().unwrap().encode(src, dst);
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(
    bytes: &[u8],
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    packet_expected: &DecodeResult<Packet<Mld>>,
) {
    let packet_actual = Packet::decode(bytes, src, dst);
    assert_eq!(*packet_expected, packet_actual);
}

//
// Test packets.
//

type TestMsg = (Vec<u8>, Ipv6Addr, Ipv6Addr, DecodeResult<Packet<Mld>>);

static REPORT: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![
            0x83, 0x00, 0x5b, 0xb1, 0x00, 0x00, 0x00, 0x00, 0xff, 0x08,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x12, 0x34,
        ],
        ip6!("fe80::1"),
        ip6!("ff08::1234"),
        Ok(Packet::Report(Report {
            version: 1,
            group_addr: ip6!("ff08::1234"),
        })),
    )
});

static DONE: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![
            0x84, 0x00, 0x6c, 0xe9, 0x00, 0x00, 0x00, 0x00, 0xff, 0x08,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x12, 0x34,
        ],
        ip6!("fe80::1"),
        ip6!("ff02::2"),
        Ok(Packet::Leave(Leave {
            group_addr: ip6!("ff08::1234"),
        })),
    )
});

static QUERY_V1: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![
            0x82, 0x00, 0x59, 0x17, 0x27, 0x10, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ],
        ip6!("fe80::1"),
        ip6!("ff02::1"),
        Ok(Packet::Query(Query {
            version: 1,
            max_resp_code: 10000,
            group_addr: ip6!("::"),
            ssm: None,
        })),
    )
});

static QUERY_V2: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![
            0x82, 0x00, 0x56, 0x96, 0x27, 0x10, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x02, 0x7d, 0x00, 0x00,
        ],
        ip6!("fe80::1"),
        ip6!("ff02::1"),
        Ok(Packet::Query(Query {
            version: 2,
            max_resp_code: 10000,
            group_addr: ip6!("::"),
            ssm: Some(QuerySsm {
                s_flag: false,
                qrv: 2,
                qqic: 125,
                sources: vec![],
            }),
        })),
    )
});

static REPORT_V2: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![
            0x8f, 0x00, 0x5f, 0xd0, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00,
            0x00, 0x00, 0xff, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34,
        ],
        ip6!("fe80::1"),
        ip6!("ff02::16"),
        Ok(Packet::ReportSsm(ReportSsm {
            records: vec![GroupRecord {
                record_type: RecordType::ModeIsExclude,
                group_addr: ip6!("ff08::1234"),
                sources: vec![],
            }],
        })),
    )
});

static BAD_CHECKSUM: Lazy<TestMsg> = Lazy::new(|| {
    (
        // The REPORT vector with a different destination address: the
        // pseudo-header no longer matches.
        vec![
            0x83, 0x00, 0x5b, 0xb1, 0x00, 0x00, 0x00, 0x00, 0xff, 0x08,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x12, 0x34,
        ],
        ip6!("fe80::1"),
        ip6!("ff02::1"),
        Err(DecodeError::ChecksumMismatch),
    )
});

static TOO_SHORT: Lazy<TestMsg> = Lazy::new(|| {
    (
        vec![0x83, 0x00, 0x00, 0x00],
        ip6!("fe80::1"),
        ip6!("ff02::1"),
        Err(DecodeError::LengthTooShort(4)),
    )
});

//
// Tests.
//

#[test]
fn test_encode_report() {
    let (ref bytes, ref src, ref dst, ref packet) = *REPORT;
    test_encode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_report() {
    let (ref bytes, ref src, ref dst, ref packet) = *REPORT;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_encode_done() {
    let (ref bytes, ref src, ref dst, ref packet) = *DONE;
    test_encode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_done() {
    let (ref bytes, ref src, ref dst, ref packet) = *DONE;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_encode_query_v1() {
    let (ref bytes, ref src, ref dst, ref packet) = *QUERY_V1;
    test_encode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_query_v1() {
    let (ref bytes, ref src, ref dst, ref packet) = *QUERY_V1;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_encode_query_v2() {
    let (ref bytes, ref src, ref dst, ref packet) = *QUERY_V2;
    test_encode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_query_v2() {
    let (ref bytes, ref src, ref dst, ref packet) = *QUERY_V2;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_encode_report_v2() {
    let (ref bytes, ref src, ref dst, ref packet) = *REPORT_V2;
    test_encode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_report_v2() {
    let (ref bytes, ref src, ref dst, ref packet) = *REPORT_V2;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_bad_checksum() {
    let (ref bytes, ref src, ref dst, ref packet) = *BAD_CHECKSUM;
    test_decode_packet(bytes, src, dst, packet);
}

#[test]
fn test_decode_too_short() {
    let (ref bytes, ref src, ref dst, ref packet) = *TOO_SHORT;
    test_decode_packet(bytes, src, dst, packet);
}
