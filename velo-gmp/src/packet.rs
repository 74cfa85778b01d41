//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use bytes::BytesMut;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::version::Version;

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// A decoded group-membership protocol message.
//
// The message version is carried explicitly where the wire format is
// ambiguous: a Query's version is derived from its length and Max Resp Code
// during decoding, and a Report's version from its message type.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub enum Packet<V: Version> {
    Query(Query<V>),
    Report(Report<V>),
    ReportSsm(ReportSsm<V>),
    Leave(Leave<V>),
}

// Membership Query (all versions). The source-specific part is present only
// for IGMPv3/MLDv2 queries.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct Query<V: Version> {
    pub version: u8,
    // Raw Max Resp Code, in protocol code units.
    pub max_resp_code: u16,
    // Group address; unspecified for a General Query.
    pub group_addr: V::IpAddr,
    pub ssm: Option<QuerySsm<V>>,
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct QuerySsm<V: Version> {
    pub s_flag: bool,
    pub qrv: u8,
    pub qqic: u8,
    pub sources: Vec<V::IpAddr>,
}

// Older-version Membership Report (IGMPv1/v2, MLDv1).
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct Report<V: Version> {
    pub version: u8,
    pub group_addr: V::IpAddr,
}

// Source-specific aggregated Membership Report (IGMPv3, MLDv2).
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct ReportSsm<V: Version> {
    pub records: Vec<GroupRecord<V>>,
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct GroupRecord<V: Version> {
    pub record_type: RecordType,
    pub group_addr: V::IpAddr,
    pub sources: Vec<V::IpAddr>,
}

// Group record types (RFC 3376 Section 4.2.12, RFC 3810 Section 5.2.12).
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RecordType {
    ModeIsInclude = 1,
    ModeIsExclude = 2,
    ChangeToInclude = 3,
    ChangeToExclude = 4,
    AllowNewSources = 5,
    BlockOldSources = 6,
}

// IGMPv2 Leave Group / MLDv1 Done.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound = "V: Version")]
pub struct Leave<V: Version> {
    pub group_addr: V::IpAddr,
}

// Decode errors.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DecodeError {
    LengthTooShort(usize),
    ChecksumMismatch,
    UnsupportedMessageType(u8),
}

// Group-membership version-specific code.
pub trait PacketVersion<V: Version> {
    // Minimum length of a protocol message.
    const MSG_MIN_LEN: usize;

    // Minimum length of a source-specific Query.
    const QUERY_SSM_MIN_LEN: usize;

    // Fixed per-message overhead of a Query, used when splitting source
    // lists to honor the interface MTU.
    const QUERY_OVERHEAD: usize;

    // Decode a protocol message from a byte buffer. The source and
    // destination addresses feed the pseudo-header checksum where the
    // address family requires one.
    fn decode_packet(
        data: &[u8],
        src: &V::IpAddr,
        dst: &V::IpAddr,
    ) -> DecodeResult<Packet<V>>;

    // Encode a protocol message, computing its checksum.
    fn encode_packet(
        packet: &Packet<V>,
        src: &V::IpAddr,
        dst: &V::IpAddr,
    ) -> BytesMut;
}

// ===== impl Packet =====

impl<V> Packet<V>
where
    V: Version,
{
    /// Decodes a message from the protocol payload of a received packet.
    pub fn decode(
        data: &[u8],
        src: &V::IpAddr,
        dst: &V::IpAddr,
    ) -> DecodeResult<Packet<V>> {
        V::decode_packet(data, src, dst)
    }

    /// Encodes the message, filling in the checksum field.
    pub fn encode(&self, src: &V::IpAddr, dst: &V::IpAddr) -> BytesMut {
        V::encode_packet(self, src, dst)
    }

    // Returns the protocol version of the message.
    pub(crate) fn version(&self) -> u8 {
        match self {
            Packet::Query(query) => query.version,
            Packet::Report(report) => report.version,
            Packet::ReportSsm(_) => V::VERSION_SSM,
            // A Leave is an IGMPv2/MLDv1 message.
            Packet::Leave(_) => V::VERSION_SSM - 1,
        }
    }

    // Returns whether the message is a listener (host-originated) message.
    pub(crate) fn is_listener_message(&self) -> bool {
        !matches!(self, Packet::Query(_))
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::LengthTooShort(len) => {
                write!(f, "message too short: {} bytes", len)
            }
            DecodeError::ChecksumMismatch => {
                write!(f, "checksum mismatch")
            }
            DecodeError::UnsupportedMessageType(msg_type) => {
                write!(f, "unsupported message type: {}", msg_type)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ===== global functions =====

//
// Max Resp Code and QQIC use the floating-point encoding of RFC 3376
// Section 4.1.1 and RFC 3810 Section 5.1.3/5.1.9:
//
//    0 1 2 3 4 5 6 7
//   +-+-+-+-+-+-+-+-+
//   |1| exp | mant  |
//   +-+-+-+-+-+-+-+-+
//
//   Time = (mant | 0x10) << (exp + 3)
//
// (with a 12-bit mantissa for the 16-bit variant). Values below the
// floating-point threshold are encoded verbatim. `timer_scale` converts
// between code units and seconds.
//

/// Decodes an 8-bit exp/mant time code into a duration.
pub fn decode_exp_time_code8(code: u8, timer_scale: u32) -> Duration {
    let decoded_time = if code < 0x80 {
        code as u32
    } else {
        let mant = (code & 0xf) as u32;
        let exp = ((code >> 4) & 0x7) as u32;
        (mant | 0x10) << (exp + 3)
    };

    scaled_units_to_duration(decoded_time, timer_scale)
}

/// Decodes a 16-bit exp/mant time code into a duration.
pub fn decode_exp_time_code16(code: u16, timer_scale: u32) -> Duration {
    let decoded_time = if code < 0x8000 {
        code as u32
    } else {
        let mant = (code & 0xfff) as u32;
        let exp = ((code >> 12) & 0x7) as u32;
        (mant | 0x1000) << (exp + 3)
    };

    scaled_units_to_duration(decoded_time, timer_scale)
}

/// Encodes a duration as an 8-bit exp/mant time code.
///
/// Durations beyond the representable range saturate to the largest code.
pub fn encode_exp_time_code8(time: Duration, timer_scale: u32) -> u8 {
    let decoded_time = duration_to_scaled_units(time, timer_scale);

    if decoded_time < 0x80 {
        decoded_time as u8
    } else {
        let mut exp = 0u8;
        while (decoded_time >> (exp + 3)) > 0x1f {
            if exp == 7 {
                break;
            }
            exp += 1;
        }
        let mant = ((decoded_time >> (exp + 3)) & 0xf) as u8;

        0x80 | (exp << 4) | mant
    }
}

/// Encodes a duration as a 16-bit exp/mant time code.
///
/// Durations beyond the representable range saturate to the largest code.
pub fn encode_exp_time_code16(time: Duration, timer_scale: u32) -> u16 {
    let decoded_time = duration_to_scaled_units(time, timer_scale);

    if decoded_time < 0x8000 {
        decoded_time as u16
    } else {
        let mut exp = 0u16;
        while (decoded_time >> (exp + 3)) > 0x1fff {
            if exp == 7 {
                break;
            }
            exp += 1;
        }
        let mant = ((decoded_time >> (exp + 3)) & 0xfff) as u16;

        0x8000 | (exp << 12) | mant
    }
}

pub(crate) fn scaled_units_to_duration(
    units: u32,
    timer_scale: u32,
) -> Duration {
    Duration::from_micros(units as u64 * 1_000_000 / timer_scale as u64)
}

pub(crate) fn duration_to_scaled_units(
    time: Duration,
    timer_scale: u32,
) -> u32 {
    (time.as_micros() as u64 * timer_scale as u64 / 1_000_000)
        .min(u32::MAX as u64) as u32
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn quantum8(code: u8) -> u32 {
        if code < 0x80 {
            1
        } else {
            1 << (((code >> 4) & 0x7) + 3)
        }
    }

    fn quantum16(code: u16) -> u32 {
        if code < 0x8000 {
            1
        } else {
            1 << (((code >> 12) & 0x7) + 3)
        }
    }

    #[test]
    fn exp_time_code8_round_trip() {
        // Exhaustive sweep over the representable range (in code units,
        // using a unity timer scale so durations map 1:1).
        for units in (0..0x400000u32).step_by(37) {
            let time = Duration::from_secs(units as u64);
            let code = encode_exp_time_code8(time, 1);
            let decoded = decode_exp_time_code8(code, 1);

            // The decoded value never exceeds the requested one, and the
            // gap is bounded by one quantum of the exp/mant grid.
            assert!(decoded <= time);
            assert!(
                (time - decoded).as_secs() < quantum8(code) as u64,
                "units={} code={:#x}",
                units,
                code
            );
        }
    }

    #[test]
    fn exp_time_code8_exact_values() {
        // Values below the floating-point threshold are encoded verbatim.
        for units in 0..0x80u32 {
            let time = Duration::from_secs(units as u64);
            let code = encode_exp_time_code8(time, 1);
            assert_eq!(code as u32, units);
            assert_eq!(decode_exp_time_code8(code, 1), time);
        }
    }

    #[test]
    fn exp_time_code8_timer_scale() {
        // 10 seconds in tenths of a second: code value of 100.
        let code = encode_exp_time_code8(Duration::from_secs(10), 10);
        assert_eq!(code, 100);
        assert_eq!(decode_exp_time_code8(code, 10), Duration::from_secs(10));
    }

    #[test]
    fn exp_time_code16_round_trip() {
        for units in (0..0x40000000u32).step_by(65521) {
            let time = Duration::from_secs(units as u64);
            let code = encode_exp_time_code16(time, 1);
            let decoded = decode_exp_time_code16(code, 1);

            assert!(decoded <= time);
            assert!(
                (time - decoded).as_secs() < quantum16(code) as u64,
                "units={} code={:#x}",
                units,
                code
            );
        }
    }

    #[test]
    fn exp_time_code16_milliseconds() {
        // MLD encodes milliseconds: one second becomes a code of 1000.
        let code = encode_exp_time_code16(Duration::from_secs(1), 1000);
        assert_eq!(code, 1000);
        assert_eq!(
            decode_exp_time_code16(code, 1000),
            Duration::from_secs(1)
        );
    }
}
