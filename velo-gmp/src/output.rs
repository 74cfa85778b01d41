//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use velo_utils::ip::{AddressFamily, IpAddrKind};

use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::packet::{
    Packet, PacketVersion, Query, QuerySsm, duration_to_scaled_units,
    encode_exp_time_code8, encode_exp_time_code16,
};
use crate::version::Version;

// Fallback interface MTU used when the interface manager did not report
// one.
const DFLT_MTU: usize = 1500;

// ===== global functions =====

// Sends a General Query to the all-systems group.
pub(crate) fn send_general_query<V>(
    iface: &Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
) where
    V: Version,
{
    let version = iface.config.version;
    let max_resp_time = iface.config.query_response_interval();

    let query = Query {
        version,
        max_resp_code: max_resp_code::<V>(version, max_resp_time),
        group_addr: V::IpAddr::unspecified(),
        ssm: (version >= V::VERSION_SSM).then(|| QuerySsm {
            s_flag: false,
            qrv: querier_robustness_variable(iface.state.effective_robustness),
            qqic: encode_exp_time_code8(
                iface.state.effective_query_interval,
                1,
            ),
            sources: vec![],
        }),
    };
    iface.send_packet(V::all_systems(), Packet::Query(query));

    instance.state.statistics.msgs_sent.query += 1;
    instance.state.statistics.msgs_sent.total += 1;
}

// Sends a Group-Specific (empty source list) or Group-and-Source-Specific
// Query, splitting the source list across messages to honor the interface
// MTU.
pub(crate) fn send_group_query<V>(
    iface: &Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &[V::IpAddr],
) where
    V: Version,
{
    let version = iface.config.version;
    let max_resp_time = iface.config.last_member_query_interval();
    let max_resp_code = max_resp_code::<V>(version, max_resp_time);
    let qrv = querier_robustness_variable(iface.state.effective_robustness);
    let qqic = encode_exp_time_code8(iface.state.effective_query_interval, 1);

    // Only source-specific capable versions can carry a source list.
    if version < V::VERSION_SSM || sources.is_empty() {
        let query = Query {
            version,
            max_resp_code,
            group_addr,
            ssm: (version >= V::VERSION_SSM).then(|| QuerySsm {
                s_flag: false,
                qrv,
                qqic,
                sources: vec![],
            }),
        };
        iface.send_packet(group_addr, Packet::Query(query));

        instance.state.statistics.msgs_sent.query += 1;
        instance.state.statistics.msgs_sent.total += 1;
        return;
    }

    // Maximum number of sources that fit in one message.
    let mtu = iface.system.mtu.map(|mtu| mtu as usize).unwrap_or(DFLT_MTU);
    let max_sources = (mtu.saturating_sub(V::QUERY_OVERHEAD)
        / V::ADDRESS_FAMILY.addr_len())
    .max(1);

    for sources in sources.chunks(max_sources) {
        let query = Query {
            version,
            max_resp_code,
            group_addr,
            ssm: Some(QuerySsm {
                s_flag: false,
                qrv,
                qqic,
                sources: sources.to_vec(),
            }),
        };
        iface.send_packet(group_addr, Packet::Query(query));

        instance.state.statistics.msgs_sent.query += 1;
        instance.state.statistics.msgs_sent.total += 1;
    }
}

// ===== helper functions =====

// Encodes the Max Resp Code for the given protocol version: zero for
// IGMPv1, plain scaled units for IGMPv2/MLDv1, and the floating-point
// encoding for the source-specific versions.
fn max_resp_code<V>(version: u8, time: Duration) -> u16
where
    V: Version,
{
    match V::ADDRESS_FAMILY {
        AddressFamily::Ipv4 => {
            if version == 1 {
                0
            } else if version >= V::VERSION_SSM {
                encode_exp_time_code8(time, V::TIMER_SCALE) as u16
            } else {
                duration_to_scaled_units(time, V::TIMER_SCALE)
                    .min(u8::MAX as u32) as u16
            }
        }
        AddressFamily::Ipv6 => {
            if version >= V::VERSION_SSM {
                encode_exp_time_code16(time, V::TIMER_SCALE)
            } else {
                duration_to_scaled_units(time, V::TIMER_SCALE)
                    .min(u16::MAX as u32) as u16
            }
        }
    }
}

// The QRV field is capped at its 3-bit maximum (RFC 3376 Section 4.1.6).
fn querier_robustness_variable(robustness: u8) -> u8 {
    robustness.min(7)
}
