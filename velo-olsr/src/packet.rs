//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::{Deserialize, Serialize};
use velo_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

//
// The OLSR packet format is (RFC 3626, Section 3.3):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Packet Length         |    Packet Sequence Number     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Message Type |     Vtime     |         Message Size          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      Originator Address                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Time To Live |   Hop Count   |    Message Sequence Number    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                            MESSAGE                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Packet {
    pub seqno: u16,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Message {
    pub hdr: MessageHdr,
    pub body: MessageBody,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MessageHdr {
    pub vtime: u8,
    pub origin: Ipv4Addr,
    pub ttl: u8,
    pub hops: u8,
    pub seqno: u16,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MessageBody {
    Hello(HelloMessage),
    Tc(TcMessage),
    Mid(MidMessage),
    // Messages of unrecognized types are carried opaquely so the default
    // forwarding rule still applies to them.
    Unknown(UnknownMessage),
}

//
// A HELLO body lists the local link state grouped by link code
// (RFC 3626, Section 6.1):
//
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Reserved             |     Htime     |  Willingness  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Link Code   |   Reserved    |       Link Message Size       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                  Neighbor Interface Address                   |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct HelloMessage {
    pub htime: u8,
    pub willingness: u8,
    pub links: Vec<(LinkCode, Vec<Ipv4Addr>)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TcMessage {
    pub ansn: u16,
    pub neighbors: Vec<Ipv4Addr>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MidMessage {
    pub interfaces: Vec<Ipv4Addr>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct UnknownMessage {
    pub msg_type: u8,
    pub body: Bytes,
}

// Link and neighbor type pair carried in HELLO link groups
// (RFC 3626, Section 6.1.1).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LinkCode {
    pub neighbor_type: NeighborType,
    pub link_type: LinkType,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LinkType {
    Unspec = 0,
    Asym = 1,
    Sym = 2,
    Lost = 3,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum NeighborType {
    Not = 0,
    Sym = 1,
    Mpr = 2,
}

// Decode errors.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DecodeError {
    IncompletePacket(usize),
    InvalidPacketLength(u16),
    InvalidMessageSize(u16),
}

// Message type values.
pub const MSG_TYPE_HELLO: u8 = 1;
pub const MSG_TYPE_TC: u8 = 2;
pub const MSG_TYPE_MID: u8 = 3;

// Maximum TTL of flooded messages.
pub const MAX_TTL: u8 = 255;

// Willingness bounds (RFC 3626, Section 18.8).
pub const WILL_NEVER: u8 = 0;
pub const WILL_LOW: u8 = 1;
pub const WILL_DEFAULT: u8 = 3;
pub const WILL_HIGH: u8 = 6;
pub const WILL_ALWAYS: u8 = 7;

// Scaling factor of the mantissa/exponent time encoding (seconds).
const VTIME_SCALE: f64 = 1.0 / 16.0;

// ===== impl Packet =====

impl Packet {
    pub const HDR_LENGTH: usize = 4;

    /// Encodes the packet into a bytes buffer.
    pub fn encode(&self) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            // The packet length field is rewritten once the messages have
            // been appended.
            buf.put_u16(0);
            buf.put_u16(self.seqno);
            for message in &self.messages {
                message.encode(&mut buf);
            }

            let pkt_len = buf.len() as u16;
            buf[0..2].copy_from_slice(&pkt_len.to_be_bytes());

            buf.clone()
        })
    }

    /// Decodes a packet from a bytes buffer.
    pub fn decode(data: &[u8]) -> DecodeResult<Packet> {
        let mut buf = Bytes::copy_from_slice(data);

        if data.len() < Self::HDR_LENGTH {
            return Err(DecodeError::IncompletePacket(data.len()));
        }
        let pkt_len = buf.get_u16();
        if pkt_len as usize != data.len() {
            return Err(DecodeError::InvalidPacketLength(pkt_len));
        }
        let seqno = buf.get_u16();

        let mut messages = vec![];
        while buf.remaining() >= Message::HDR_LENGTH {
            messages.push(Message::decode(&mut buf)?);
        }

        Ok(Packet { seqno, messages })
    }
}

// ===== impl Message =====

impl Message {
    pub const HDR_LENGTH: usize = 12;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let msg_type = match &self.body {
            MessageBody::Hello(_) => MSG_TYPE_HELLO,
            MessageBody::Tc(_) => MSG_TYPE_TC,
            MessageBody::Mid(_) => MSG_TYPE_MID,
            MessageBody::Unknown(unknown) => unknown.msg_type,
        };

        let start = buf.len();
        buf.put_u8(msg_type);
        buf.put_u8(self.hdr.vtime);
        // The message size field is rewritten below.
        buf.put_u16(0);
        buf.put_ipv4(&self.hdr.origin);
        buf.put_u8(self.hdr.ttl);
        buf.put_u8(self.hdr.hops);
        buf.put_u16(self.hdr.seqno);

        match &self.body {
            MessageBody::Hello(hello) => hello.encode(buf),
            MessageBody::Tc(tc) => tc.encode(buf),
            MessageBody::Mid(mid) => mid.encode(buf),
            MessageBody::Unknown(unknown) => {
                buf.put_slice(&unknown.body);
            }
        }

        let msg_size = (buf.len() - start) as u16;
        buf[start + 2..start + 4].copy_from_slice(&msg_size.to_be_bytes());
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Message> {
        let msg_type = buf.get_u8();
        let vtime = buf.get_u8();
        let msg_size = buf.get_u16();
        let origin = buf.get_ipv4();
        let ttl = buf.get_u8();
        let hops = buf.get_u8();
        let seqno = buf.get_u16();

        if (msg_size as usize) < Self::HDR_LENGTH
            || buf.remaining() < msg_size as usize - Self::HDR_LENGTH
        {
            return Err(DecodeError::InvalidMessageSize(msg_size));
        }
        let mut body_buf =
            buf.split_to(msg_size as usize - Self::HDR_LENGTH);

        let body = match msg_type {
            MSG_TYPE_HELLO => {
                MessageBody::Hello(HelloMessage::decode(&mut body_buf)?)
            }
            MSG_TYPE_TC => MessageBody::Tc(TcMessage::decode(&mut body_buf)?),
            MSG_TYPE_MID => {
                MessageBody::Mid(MidMessage::decode(&mut body_buf)?)
            }
            _ => MessageBody::Unknown(UnknownMessage {
                msg_type,
                body: body_buf,
            }),
        };

        Ok(Message {
            hdr: MessageHdr {
                vtime,
                origin,
                ttl,
                hops,
                seqno,
            },
            body,
        })
    }

    // Returns the validity time carried in the message header.
    pub(crate) fn vtime(&self) -> Duration {
        decode_vtime(self.hdr.vtime)
    }
}

// ===== impl HelloMessage =====

impl HelloMessage {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(0);
        buf.put_u8(self.htime);
        buf.put_u8(self.willingness);
        for (link_code, addrs) in &self.links {
            buf.put_u8(link_code.encode());
            buf.put_u8(0);
            buf.put_u16((4 + addrs.len() * 4) as u16);
            for addr in addrs {
                buf.put_ipv4(addr);
            }
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<HelloMessage> {
        if buf.remaining() < 4 {
            return Err(DecodeError::IncompletePacket(buf.remaining()));
        }
        let _ = buf.get_u16();
        let htime = buf.get_u8();
        let willingness = buf.get_u8();

        let mut links = vec![];
        while buf.remaining() >= 4 {
            let link_code = buf.get_u8();
            let _ = buf.get_u8();
            let size = buf.get_u16() as usize;
            if size < 4 || buf.remaining() < size - 4 {
                return Err(DecodeError::InvalidMessageSize(size as u16));
            }
            let mut addrs = vec![];
            for _ in 0..(size - 4) / 4 {
                addrs.push(buf.get_ipv4());
            }
            // Link groups with an invalid code are skipped; their
            // addresses have already been consumed.
            let Some(link_code) = LinkCode::decode(link_code) else {
                continue;
            };
            links.push((link_code, addrs));
        }

        Ok(HelloMessage {
            htime,
            willingness,
            links,
        })
    }

    // Iterates over all advertised (link code, address) pairs.
    pub(crate) fn iter_links(
        &self,
    ) -> impl Iterator<Item = (LinkCode, &Ipv4Addr)> + '_ {
        self.links
            .iter()
            .flat_map(|(code, addrs)| addrs.iter().map(|addr| (*code, addr)))
    }
}

// ===== impl TcMessage =====

impl TcMessage {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.ansn);
        buf.put_u16(0);
        for addr in &self.neighbors {
            buf.put_ipv4(addr);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<TcMessage> {
        if buf.remaining() < 4 {
            return Err(DecodeError::IncompletePacket(buf.remaining()));
        }
        let ansn = buf.get_u16();
        let _ = buf.get_u16();
        let mut neighbors = vec![];
        while buf.remaining() >= 4 {
            neighbors.push(buf.get_ipv4());
        }

        Ok(TcMessage { ansn, neighbors })
    }
}

// ===== impl MidMessage =====

impl MidMessage {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        for addr in &self.interfaces {
            buf.put_ipv4(addr);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<MidMessage> {
        let mut interfaces = vec![];
        while buf.remaining() >= 4 {
            interfaces.push(buf.get_ipv4());
        }

        Ok(MidMessage { interfaces })
    }
}

// ===== impl LinkCode =====

impl LinkCode {
    pub(crate) fn new(
        neighbor_type: NeighborType,
        link_type: LinkType,
    ) -> LinkCode {
        LinkCode {
            neighbor_type,
            link_type,
        }
    }

    pub(crate) fn encode(&self) -> u8 {
        ((self.neighbor_type as u8) << 2) | self.link_type as u8
    }

    pub(crate) fn decode(code: u8) -> Option<LinkCode> {
        let link_type = LinkType::from_u8(code & 0x03)?;
        let neighbor_type = NeighborType::from_u8((code >> 2) & 0x03)?;

        // A symmetric link to a non-neighbor cannot exist
        // (RFC 3626, Section 6.1.1).
        if neighbor_type == NeighborType::Not && link_type == LinkType::Sym {
            return None;
        }

        Some(LinkCode {
            neighbor_type,
            link_type,
        })
    }

    pub(crate) fn is_sym_link(&self) -> bool {
        self.link_type == LinkType::Sym
    }

    pub(crate) fn is_asym_link(&self) -> bool {
        self.link_type == LinkType::Asym
    }

    pub(crate) fn is_lost_link(&self) -> bool {
        self.link_type == LinkType::Lost
    }

    pub(crate) fn is_mpr_neighbor(&self) -> bool {
        self.neighbor_type == NeighborType::Mpr
    }
}

// ===== global functions =====

//
// RFC 3626 Section 18.3: validity and emission intervals are carried as a
// mantissa/exponent pair in a single octet:
//
//   time = C * (1 + a/16) * 2^b
//
// with the mantissa in the four highest bits, the exponent in the four
// lowest, and C = 1/16 second.
//

/// Decodes a mantissa/exponent encoded time value.
pub fn decode_vtime(code: u8) -> Duration {
    let mant = ((code >> 4) & 0x0f) as f64;
    let exp = (code & 0x0f) as u32;
    let secs = VTIME_SCALE * (1.0 + mant / 16.0) * (1u64 << exp) as f64;
    Duration::from_secs_f64(secs)
}

/// Encodes a time value in the mantissa/exponent format, rounding to the
/// nearest representable value.
pub fn encode_vtime(time: Duration) -> u8 {
    let t = time.as_secs_f64();
    if t < VTIME_SCALE {
        return 0;
    }

    // Largest exponent such that C * 2^b <= t.
    let mut exp = 0u32;
    while (VTIME_SCALE * (1u64 << (exp + 1)) as f64) <= t && exp < 14 {
        exp += 1;
    }

    // Rounded mantissa in [0, 16].
    let mut mant =
        (16.0 * (t / (VTIME_SCALE * (1u64 << exp) as f64) - 1.0)).round()
            as u32;
    if mant >= 16 {
        mant = 0;
        exp += 1;
    }
    if exp > 15 {
        return 0xff;
    }

    ((mant as u8) << 4) | exp as u8
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompletePacket(len) => {
                write!(f, "incomplete packet: {} bytes", len)
            }
            DecodeError::InvalidPacketLength(len) => {
                write!(f, "invalid packet length: {}", len)
            }
            DecodeError::InvalidMessageSize(size) => {
                write!(f, "invalid message size: {}", size)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vtime_round_trip() {
        for (code, secs) in [
            (0x00u8, 0.0625),
            (0x02, 0.25),
            (0x05, 2.0),
            (0x86, 6.0),
        ] {
            let time = decode_vtime(code);
            assert!(
                (time.as_secs_f64() - secs).abs() < 1e-9,
                "code={:#x}",
                code
            );
            assert_eq!(encode_vtime(time), code);
        }
    }

    #[test]
    fn vtime_common_intervals() {
        // Encoding then decoding a value stays within the precision of the
        // mantissa/exponent grid (1/16 relative error).
        for secs in [2.0f64, 5.0, 6.0, 15.0, 30.0] {
            let code = encode_vtime(Duration::from_secs_f64(secs));
            let decoded = decode_vtime(code).as_secs_f64();
            assert!(
                (decoded - secs).abs() / secs < 1.0 / 16.0,
                "secs={} code={:#x} decoded={}",
                secs,
                code,
                decoded
            );
        }
    }
}
