//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use const_addrs::ip4;
use velo_gmp::packet::{
    DecodeError, DecodeResult, GroupRecord, Leave, Packet, Query, QuerySsm,
    RecordType, Report, ReportSsm,
};
use velo_gmp::version::Igmp;

//
// Helper functions.
//

fn test_encode_packet(
    bytes_expected: &[u8],
    packet: &DecodeResult<Packet<Igmp>>,
) {
    // The IGMP checksum does not cover a pseudo-header; the addresses are
    // ignored.
    let bytes_actual = packet
        .as_ref()
        .unwrap()
        .encode(&ip4!("10.0.0.2"), &ip4!("224.0.0.1"));
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(
    bytes: &[u8],
    packet_expected: &DecodeResult<Packet<Igmp>>,
) {
    let packet_actual =
        Packet::decode(bytes, &ip4!("10.0.0.2"), &ip4!("224.0.0.1"));
    assert_eq!(*packet_expected, packet_actual);
}

//
// Test packets.
//

static V2_REPORT: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x16, 0x00, 0xf9, 0xfc, 0xef, 0x01, 0x01, 0x01],
            Ok(Packet::Report(Report {
                version: 2,
                group_addr: ip4!("239.1.1.1"),
            })),
        )
    });

static V1_REPORT: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x12, 0x00, 0xfd, 0xfc, 0xef, 0x01, 0x01, 0x01],
            Ok(Packet::Report(Report {
                version: 1,
                group_addr: ip4!("239.1.1.1"),
            })),
        )
    });

static V2_LEAVE: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x17, 0x00, 0xf8, 0xfc, 0xef, 0x01, 0x01, 0x01],
            Ok(Packet::Leave(Leave {
                group_addr: ip4!("239.1.1.1"),
            })),
        )
    });

static V1_QUERY: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x11, 0x00, 0xee, 0xff, 0x00, 0x00, 0x00, 0x00],
            Ok(Packet::Query(Query {
                version: 1,
                max_resp_code: 0,
                group_addr: ip4!("0.0.0.0"),
                ssm: None,
            })),
        )
    });

static V2_QUERY: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x11, 0x64, 0xee, 0x9b, 0x00, 0x00, 0x00, 0x00],
            Ok(Packet::Query(Query {
                version: 2,
                max_resp_code: 100,
                group_addr: ip4!("0.0.0.0"),
                ssm: None,
            })),
        )
    });

static V3_QUERY: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![
                0x11, 0x64, 0xec, 0x1e, 0x00, 0x00, 0x00, 0x00, 0x02, 0x7d,
                0x00, 0x00,
            ],
            Ok(Packet::Query(Query {
                version: 3,
                max_resp_code: 100,
                group_addr: ip4!("0.0.0.0"),
                ssm: Some(QuerySsm {
                    s_flag: false,
                    qrv: 2,
                    qqic: 125,
                    sources: vec![],
                }),
            })),
        )
    });

static V3_QUERY_SOURCES: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![
                0x11, 0x0a, 0xe8, 0x68, 0xef, 0x01, 0x01, 0x01, 0x02, 0x7d,
                0x00, 0x02, 0x0a, 0x00, 0x00, 0x05, 0x0a, 0x00, 0x00, 0x06,
            ],
            Ok(Packet::Query(Query {
                version: 3,
                max_resp_code: 10,
                group_addr: ip4!("239.1.1.1"),
                ssm: Some(QuerySsm {
                    s_flag: false,
                    qrv: 2,
                    qqic: 125,
                    sources: vec![ip4!("10.0.0.5"), ip4!("10.0.0.6")],
                }),
            })),
        )
    });

static V3_REPORT: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![
                0x22, 0x00, 0xeb, 0xef, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00,
                0x00, 0x00, 0xef, 0x01, 0x01, 0x01, 0x05, 0x00, 0x00, 0x01,
                0xef, 0x02, 0x02, 0x02, 0x0a, 0x00, 0x00, 0x05,
            ],
            Ok(Packet::ReportSsm(ReportSsm {
                records: vec![
                    GroupRecord {
                        record_type: RecordType::ModeIsExclude,
                        group_addr: ip4!("239.1.1.1"),
                        sources: vec![],
                    },
                    GroupRecord {
                        record_type: RecordType::AllowNewSources,
                        group_addr: ip4!("239.2.2.2"),
                        sources: vec![ip4!("10.0.0.5")],
                    },
                ],
            })),
        )
    });

static TOO_SHORT: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x16, 0x00, 0xf9],
            Err(DecodeError::LengthTooShort(3)),
        )
    });

static BAD_CHECKSUM: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> =
    Lazy::new(|| {
        (
            vec![0x16, 0x00, 0xde, 0xad, 0xef, 0x01, 0x01, 0x01],
            Err(DecodeError::ChecksumMismatch),
        )
    });

static DVMRP: Lazy<(Vec<u8>, DecodeResult<Packet<Igmp>>)> = Lazy::new(|| {
    (
        // DVMRP Ask Neighbors2, recognized but not processed.
        vec![0x13, 0x05, 0xec, 0xfa, 0x00, 0x00, 0x00, 0x00],
        Err(DecodeError::UnsupportedMessageType(0x13)),
    )
});

//
// Tests.
//

#[test]
fn test_encode_v2_report() {
    let (ref bytes, ref packet) = *V2_REPORT;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v2_report() {
    let (ref bytes, ref packet) = *V2_REPORT;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v1_report() {
    let (ref bytes, ref packet) = *V1_REPORT;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v1_report() {
    let (ref bytes, ref packet) = *V1_REPORT;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v2_leave() {
    let (ref bytes, ref packet) = *V2_LEAVE;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v2_leave() {
    let (ref bytes, ref packet) = *V2_LEAVE;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v1_query() {
    let (ref bytes, ref packet) = *V1_QUERY;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v1_query() {
    let (ref bytes, ref packet) = *V1_QUERY;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v2_query() {
    let (ref bytes, ref packet) = *V2_QUERY;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v2_query() {
    let (ref bytes, ref packet) = *V2_QUERY;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v3_query() {
    let (ref bytes, ref packet) = *V3_QUERY;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v3_query() {
    let (ref bytes, ref packet) = *V3_QUERY;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v3_query_sources() {
    let (ref bytes, ref packet) = *V3_QUERY_SOURCES;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v3_query_sources() {
    let (ref bytes, ref packet) = *V3_QUERY_SOURCES;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_v3_report() {
    let (ref bytes, ref packet) = *V3_REPORT;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_v3_report() {
    let (ref bytes, ref packet) = *V3_REPORT;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_decode_too_short() {
    let (ref bytes, ref packet) = *TOO_SHORT;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_decode_bad_checksum() {
    let (ref bytes, ref packet) = *BAD_CHECKSUM;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_decode_dvmrp() {
    let (ref bytes, ref packet) = *DVMRP;
    test_decode_packet(bytes, packet);
}
