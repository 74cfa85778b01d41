//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use crate::instance::InstanceUpView;
use crate::interface::{self, Interface};
use crate::packet::{
    HelloMessage, MAX_TTL, Message, MessageBody, MessageHdr, MidMessage,
    Packet, TcMessage, encode_vtime,
};
use crate::tasks;

// ===== global functions =====

// Requests a coalesced route recomputation.
pub(crate) fn schedule_route_update(instance: &mut InstanceUpView<'_>) {
    if instance.state.route_update_scheduled {
        return;
    }
    instance.state.route_update_scheduled = true;
    tasks::schedule_route_update(&instance.tx.protocol_input.route_update);
}

// Originates a HELLO on the given interface, advertising the full local
// link state (RFC 3626, Section 6.2).
pub(crate) fn send_hello(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    ifindex: u32,
) {
    let Some(origin) = interface::main_addr(interfaces) else {
        return;
    };
    let Some(iface) = interface::lookup_by_ifindex(interfaces, ifindex)
    else {
        return;
    };

    let hello = HelloMessage {
        htime: encode_vtime(iface.config.hello_interval()),
        willingness: instance.config.willingness,
        links: instance.state.neighborhood.populate_hello(ifindex),
    };
    let message = Message {
        hdr: MessageHdr {
            vtime: encode_vtime(iface.config.neighbor_hold_time()),
            origin,
            // HELLOs are never relayed.
            ttl: 1,
            hops: 0,
            seqno: instance.state.next_msg_seqno(),
        },
        body: MessageBody::Hello(hello),
    };
    iface.send_packet(Packet {
        seqno: 0,
        messages: vec![message],
    });

    instance.state.statistics.msgs_sent.hello += 1;
    instance.state.statistics.msgs_sent.total += 1;
}

// Broadcasts a TC message on every enabled interface.
pub(crate) fn send_tc(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    tc: TcMessage,
) {
    let Some(origin) = interface::main_addr(interfaces) else {
        return;
    };

    let message = Message {
        hdr: MessageHdr {
            vtime: encode_vtime(instance.config.topology_hold_time()),
            origin,
            ttl: MAX_TTL,
            hops: 0,
            seqno: instance.state.next_msg_seqno(),
        },
        body: MessageBody::Tc(tc),
    };
    flood(interfaces, &message);

    instance.state.statistics.msgs_sent.tc += 1;
    instance.state.statistics.msgs_sent.total += 1;
}

// Broadcasts a MID message listing the node's additional interface
// addresses (RFC 3626, Section 5.1).
pub(crate) fn send_mid(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
) {
    let Some(origin) = interface::main_addr(interfaces) else {
        return;
    };

    let mid_interfaces = interface::local_addrs(interfaces)
        .into_iter()
        .filter(|addr| *addr != origin)
        .collect::<Vec<_>>();
    if mid_interfaces.is_empty() {
        return;
    }

    let message = Message {
        hdr: MessageHdr {
            vtime: encode_vtime(instance.config.mid_hold_time()),
            origin,
            ttl: MAX_TTL,
            hops: 0,
            seqno: instance.state.next_msg_seqno(),
        },
        body: MessageBody::Mid(MidMessage {
            interfaces: mid_interfaces,
        }),
    };
    flood(interfaces, &message);

    instance.state.statistics.msgs_sent.mid += 1;
    instance.state.statistics.msgs_sent.total += 1;
}

// Starts or stops the periodic MID emission: only nodes with more than one
// enabled interface declare additional addresses.
pub(crate) fn update_mid_task(
    instance: &mut InstanceUpView<'_>,
    interfaces: &BTreeMap<String, Interface>,
) {
    let active_count = interfaces
        .values()
        .filter(|iface| iface.state.active)
        .count();

    if active_count > 1 {
        if instance.state.mid_interval_task.is_none() {
            instance.state.mid_interval_task = Some(tasks::mid_interval(
                instance.config.mid_interval(),
                &instance.tx.protocol_input.mid_interval,
            ));
        }
    } else {
        instance.state.mid_interval_task = None;
    }
}

// Emits the given message on every active interface.
pub(crate) fn flood(
    interfaces: &mut BTreeMap<String, Interface>,
    message: &Message,
) {
    for iface in interfaces
        .values_mut()
        .filter(|iface| iface.state.active)
    {
        iface.send_packet(Packet {
            seqno: 0,
            messages: vec![message.clone()],
        });
    }
}
