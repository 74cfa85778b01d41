//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use const_addrs::ip4;
use velo_olsr::packet::{
    DecodeError, DecodeResult, HelloMessage, LinkCode, LinkType, Message,
    MessageBody, MessageHdr, MidMessage, NeighborType, Packet, TcMessage,
    UnknownMessage,
};

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &DecodeResult<Packet>) {
    let bytes_actual = packet.as_ref().unwrap().encode();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &DecodeResult<Packet>) {
    let packet_actual = Packet::decode(bytes);
    assert_eq!(*packet_expected, packet_actual);
}

//
// Test packets.
//

static HELLO: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            // Packet header.
            0x00, 0x1c, 0x00, 0x01,
            // Message header.
            0x01, 0x86, 0x00, 0x18, 0xc0, 0x00, 0x02, 0x02, 0x01, 0x00,
            0x00, 0x01,
            // HELLO body.
            0x00, 0x00, 0x05, 0x03,
            // Link group: symmetric neighbor over a symmetric link.
            0x06, 0x00, 0x00, 0x08, 0xc0, 0x00, 0x02, 0x01,
        ],
        Ok(Packet {
            seqno: 1,
            messages: vec![Message {
                hdr: MessageHdr {
                    vtime: 0x86,
                    origin: ip4!("192.0.2.2"),
                    ttl: 1,
                    hops: 0,
                    seqno: 1,
                },
                body: MessageBody::Hello(HelloMessage {
                    htime: 0x05,
                    willingness: 3,
                    links: vec![(
                        LinkCode {
                            neighbor_type: NeighborType::Sym,
                            link_type: LinkType::Sym,
                        },
                        vec![ip4!("192.0.2.1")],
                    )],
                }),
            }],
        }),
    )
});

static HELLO_EMPTY: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x14, 0x00, 0x02,
            0x01, 0x86, 0x00, 0x10, 0xc0, 0x00, 0x02, 0x02, 0x01, 0x00,
            0x00, 0x02,
            0x00, 0x00, 0x05, 0x03,
        ],
        Ok(Packet {
            seqno: 2,
            messages: vec![Message {
                hdr: MessageHdr {
                    vtime: 0x86,
                    origin: ip4!("192.0.2.2"),
                    ttl: 1,
                    hops: 0,
                    seqno: 2,
                },
                body: MessageBody::Hello(HelloMessage {
                    htime: 0x05,
                    willingness: 3,
                    links: vec![],
                }),
            }],
        }),
    )
});

static TC: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x18, 0x00, 0x03,
            0x02, 0xe7, 0x00, 0x14, 0xc0, 0x00, 0x02, 0x02, 0xff, 0x00,
            0x00, 0x03,
            // TC body: ANSN and one advertised neighbor.
            0x00, 0x01, 0x00, 0x00, 0xc0, 0x00, 0x02, 0x03,
        ],
        Ok(Packet {
            seqno: 3,
            messages: vec![Message {
                hdr: MessageHdr {
                    vtime: 0xe7,
                    origin: ip4!("192.0.2.2"),
                    ttl: 255,
                    hops: 0,
                    seqno: 3,
                },
                body: MessageBody::Tc(TcMessage {
                    ansn: 1,
                    neighbors: vec![ip4!("192.0.2.3")],
                }),
            }],
        }),
    )
});

static MID: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x14, 0x00, 0x04,
            0x03, 0xe7, 0x00, 0x10, 0xc0, 0x00, 0x02, 0x02, 0xff, 0x00,
            0x00, 0x04,
            // MID body: one additional interface address.
            0x0a, 0x00, 0x01, 0x01,
        ],
        Ok(Packet {
            seqno: 4,
            messages: vec![Message {
                hdr: MessageHdr {
                    vtime: 0xe7,
                    origin: ip4!("192.0.2.2"),
                    ttl: 255,
                    hops: 0,
                    seqno: 4,
                },
                body: MessageBody::Mid(MidMessage {
                    interfaces: vec![ip4!("10.0.1.1")],
                }),
            }],
        }),
    )
});

static UNKNOWN: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x14, 0x00, 0x05,
            // HNA message, carried opaquely.
            0x04, 0xe7, 0x00, 0x10, 0xc0, 0x00, 0x02, 0x02, 0xff, 0x01,
            0x00, 0x05,
            0x0a, 0x00, 0x02, 0x00,
        ],
        Ok(Packet {
            seqno: 5,
            messages: vec![Message {
                hdr: MessageHdr {
                    vtime: 0xe7,
                    origin: ip4!("192.0.2.2"),
                    ttl: 255,
                    hops: 1,
                    seqno: 5,
                },
                body: MessageBody::Unknown(UnknownMessage {
                    msg_type: 4,
                    body: Bytes::from_static(&[0x0a, 0x00, 0x02, 0x00]),
                }),
            }],
        }),
    )
});

static BAD_LENGTH: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![0x00, 0xff, 0x00, 0x01],
        Err(DecodeError::InvalidPacketLength(255)),
    )
});

static BAD_MSG_SIZE: Lazy<(Vec<u8>, DecodeResult<Packet>)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x10, 0x00, 0x01,
            // The message claims more data than the packet carries.
            0x01, 0x86, 0x00, 0x40, 0xc0, 0x00, 0x02, 0x02, 0x01, 0x00,
            0x00, 0x01,
        ],
        Err(DecodeError::InvalidMessageSize(0x40)),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello() {
    let (ref bytes, ref packet) = *HELLO;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_hello() {
    let (ref bytes, ref packet) = *HELLO;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_hello_empty() {
    let (ref bytes, ref packet) = *HELLO_EMPTY;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_hello_empty() {
    let (ref bytes, ref packet) = *HELLO_EMPTY;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_tc() {
    let (ref bytes, ref packet) = *TC;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_tc() {
    let (ref bytes, ref packet) = *TC;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_mid() {
    let (ref bytes, ref packet) = *MID;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_mid() {
    let (ref bytes, ref packet) = *MID;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_unknown() {
    let (ref bytes, ref packet) = *UNKNOWN;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_unknown() {
    let (ref bytes, ref packet) = *UNKNOWN;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_decode_bad_length() {
    let (ref bytes, ref packet) = *BAD_LENGTH;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_decode_bad_msg_size() {
    let (ref bytes, ref packet) = *BAD_MSG_SIZE;
    test_decode_packet(bytes, packet);
}
