//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{DupTuple, InstanceUpView};
use crate::interface::{self, Interface};
use crate::neighborhood::{LinkId, NeighborId, TwoHopLinkId};
use crate::packet::{DecodeError, Message, MessageBody, Packet};
use crate::route;
use crate::tasks;
use crate::topology::{MidEntryId, TopologyId};
use crate::{output, southbound};

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    ifindex: u32,
    src: Ipv4Addr,
    packet: Result<Packet, DecodeError>,
) -> Result<(), Error> {
    // Lookup interface.
    let Some(iface) = interface::lookup_by_ifindex(interfaces, ifindex)
    else {
        return Ok(());
    };
    let ifname = iface.name.clone();
    let Some(local_addr) = iface.primary_addr() else {
        return Ok(());
    };

    Debug::PacketRx(&ifname, &src, &packet).log();

    instance.state.statistics.msgs_rcvd.total += 1;

    // Handle decode failures.
    let packet = match packet {
        Ok(packet) => packet,
        Err(error) => {
            instance.state.statistics.errors.total += 1;
            instance.state.statistics.errors.decode += 1;
            return Err(Error::PacketDecodeError(ifname, src, error));
        }
    };

    let local_addrs = interface::local_addrs(interfaces);
    let main_addr = interface::main_addr(interfaces);

    for message in packet.messages {
        if let Err(error) = process_message(
            instance,
            interfaces,
            ifindex,
            src,
            local_addr,
            &local_addrs,
            main_addr,
            message,
        ) {
            error.log();
        }
    }

    Ok(())
}

fn process_message(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    ifindex: u32,
    src: Ipv4Addr,
    local_addr: Ipv4Addr,
    local_addrs: &std::collections::BTreeSet<Ipv4Addr>,
    main_addr: Option<Ipv4Addr>,
    message: Message,
) -> Result<(), Error> {
    // Never process messages looped back from ourselves.
    if Some(message.hdr.origin) == main_addr {
        return Ok(());
    }

    // Messages already seen are not processed again, but may still have to
    // be relayed (RFC 3626, Section 3.4).
    let dup_key = (message.hdr.origin, message.hdr.seqno);
    let already_processed = instance.state.dup_set.contains_key(&dup_key);

    match &message.body {
        MessageBody::Hello(hello) => {
            // HELLOs are exchanged between direct neighbors only.
            if message.hdr.ttl != 1 || message.hdr.hops != 0 {
                instance.state.statistics.errors.total += 1;
                return Err(Error::InvalidHelloTtlHops(
                    message.hdr.origin,
                    message.hdr.ttl,
                    message.hdr.hops,
                ));
            }

            instance.state.statistics.msgs_rcvd.hello += 1;

            let Some(iface) =
                interface::lookup_by_ifindex(interfaces, ifindex)
            else {
                return Ok(());
            };
            let neighbor_hold_time = iface.config.neighbor_hold_time();

            let state = &mut *instance.state;
            state.neighborhood.process_hello(
                &instance.tx.protocol_input,
                instance.config,
                neighbor_hold_time,
                ifindex,
                src,
                local_addr,
                local_addrs,
                message.hdr.origin,
                message.vtime(),
                hello,
            );
            output::schedule_route_update(instance);
        }
        MessageBody::Tc(tc) => {
            if !already_processed {
                instance.state.statistics.msgs_rcvd.tc += 1;

                // The previous hop must be a symmetric one-hop neighbor.
                if !instance
                    .state
                    .neighborhood
                    .is_sym_neighbor_addr(src)
                {
                    instance.state.statistics.errors.total += 1;
                    instance.state.statistics.errors.non_neighbor += 1;
                    mark_processed(instance, dup_key);
                    return Err(Error::MsgFromNonNeighbor(
                        message.hdr.origin,
                        src,
                    ));
                }

                // Validate the advertised neighbor sequence number.
                if !instance
                    .state
                    .topology
                    .apply_tc_ansn(tc.ansn, message.hdr.origin)
                {
                    mark_processed(instance, dup_key);
                    return Err(Error::TcAnsnOutOfOrder(
                        message.hdr.origin,
                        tc.ansn,
                    ));
                }

                // TCs advertise neighbors one hop away from their origin,
                // and the hop count has not been incremented for the last
                // hop yet.
                let distance = message.hdr.hops as u16 + 2;
                let vtime = message.vtime();
                let state = &mut *instance.state;
                for dest_addr in &tc.neighbors {
                    state.topology.update_tc_entry(
                        &instance.tx.protocol_input,
                        *dest_addr,
                        message.hdr.origin,
                        distance,
                        tc.ansn,
                        vtime,
                    );
                }
                state.topology.update_final_seqno(
                    message.hdr.origin,
                    tc.ansn,
                    tc.neighbors.is_empty(),
                );

                output::schedule_route_update(instance);
            }

            mark_processed(instance, dup_key);
            forward_flooded(instance, interfaces, src, &message);
        }
        MessageBody::Mid(mid) => {
            if !already_processed {
                instance.state.statistics.msgs_rcvd.mid += 1;

                // The previous hop must be a symmetric one-hop neighbor.
                if !instance
                    .state
                    .neighborhood
                    .is_sym_neighbor_addr(src)
                {
                    instance.state.statistics.errors.total += 1;
                    instance.state.statistics.errors.non_neighbor += 1;
                    mark_processed(instance, dup_key);
                    return Err(Error::MsgFromNonNeighbor(
                        message.hdr.origin,
                        src,
                    ));
                }

                let distance = message.hdr.hops as u16 + 1;
                let vtime = message.vtime();
                let state = &mut *instance.state;
                for iface_addr in &mid.interfaces {
                    // The main address needs no declaration.
                    if *iface_addr == message.hdr.origin {
                        continue;
                    }
                    state.topology.update_mid_entry(
                        &instance.tx.protocol_input,
                        message.hdr.origin,
                        *iface_addr,
                        distance,
                        vtime,
                    );
                }

                output::schedule_route_update(instance);
            }

            mark_processed(instance, dup_key);
            forward_flooded(instance, interfaces, src, &message);
        }
        MessageBody::Unknown(_) => {
            // The default forwarding rule applies to messages of unknown
            // type (RFC 3626, Section 3.4).
            mark_processed(instance, dup_key);
            forward_flooded(instance, interfaces, src, &message);
        }
    }

    Ok(())
}

// Records the message in the duplicate set.
fn mark_processed(
    instance: &mut InstanceUpView<'_>,
    dup_key: (Ipv4Addr, u16),
) {
    let dup_hold_time = instance.config.dup_hold_time();
    let state = &mut *instance.state;
    state.dup_set.entry(dup_key).or_insert_with(|| DupTuple {
        retransmitted: false,
        _timer: tasks::dup_timer(
            dup_key.0,
            dup_key.1,
            dup_hold_time,
            &instance.tx.protocol_input.dup_timer,
        ),
    });
}

// The default forwarding rule (RFC 3626, Section 3.4): a flooded message
// is relayed at most once, and only when heard from a symmetric neighbor
// that has selected this node as an MPR.
fn forward_flooded(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    src: Ipv4Addr,
    message: &Message,
) {
    let state = &mut *instance.state;

    if !state.neighborhood.is_sym_neighbor_addr(src)
        || !state.neighborhood.is_mpr_selector_addr(src)
    {
        return;
    }

    let dup_key = (message.hdr.origin, message.hdr.seqno);
    let Some(dup) = state.dup_set.get_mut(&dup_key) else {
        return;
    };
    if dup.retransmitted {
        state.statistics.errors.duplicate += 1;
        return;
    }
    if message.hdr.ttl <= 1 {
        return;
    }
    dup.retransmitted = true;

    Debug::MessageForward(&message.hdr.origin, message.hdr.seqno).log();

    let mut forwarded = message.clone();
    forwarded.hdr.ttl -= 1;
    forwarded.hdr.hops += 1;
    output::flood(interfaces, &forwarded);
}

// ===== timer expiries =====

pub(crate) fn process_hello_interval(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    ifindex: u32,
) {
    output::send_hello(instance, interfaces, ifindex);
}

pub(crate) fn process_tc_interval(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
) {
    let state = &mut *instance.state;
    let Some(tc) = state.neighborhood.build_tc(instance.config) else {
        return;
    };
    output::send_tc(instance, interfaces, tc);
}

pub(crate) fn process_mid_interval(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
) {
    output::send_mid(instance, interfaces);
}

pub(crate) fn process_link_sym_timer(
    instance: &mut InstanceUpView<'_>,
    link_id: LinkId,
) {
    let state = &mut *instance.state;
    state
        .neighborhood
        .process_link_sym_timer(&instance.tx.protocol_input, link_id);
    output::schedule_route_update(instance);
}

pub(crate) fn process_link_asym_timer(
    instance: &mut InstanceUpView<'_>,
    link_id: LinkId,
) {
    let state = &mut *instance.state;
    state
        .neighborhood
        .process_link_asym_timer(&instance.tx.protocol_input, link_id);
    output::schedule_route_update(instance);
}

pub(crate) fn process_link_dead_timer(
    instance: &mut InstanceUpView<'_>,
    link_id: LinkId,
) {
    let state = &mut *instance.state;
    state.neighborhood.process_link_dead_timer(
        &instance.tx.protocol_input,
        instance.config,
        link_id,
    );
    output::schedule_route_update(instance);
}

pub(crate) fn process_mpr_selector_timer(
    instance: &mut InstanceUpView<'_>,
    neighbor_id: NeighborId,
) {
    let state = &mut *instance.state;
    state.neighborhood.process_mpr_selector_timer(
        &instance.tx.protocol_input,
        instance.config,
        neighbor_id,
    );
}

pub(crate) fn process_twohop_dead_timer(
    instance: &mut InstanceUpView<'_>,
    twohop_link_id: TwoHopLinkId,
) {
    let state = &mut *instance.state;
    state
        .neighborhood
        .process_twohop_dead_timer(&instance.tx.protocol_input, twohop_link_id);
    output::schedule_route_update(instance);
}

pub(crate) fn process_tc_entry_timer(
    instance: &mut InstanceUpView<'_>,
    topology_id: TopologyId,
) {
    instance.state.topology.process_tc_entry_timer(topology_id);
    output::schedule_route_update(instance);
}

pub(crate) fn process_mid_entry_timer(
    instance: &mut InstanceUpView<'_>,
    mid_id: MidEntryId,
) {
    instance.state.topology.process_mid_entry_timer(mid_id);
    output::schedule_route_update(instance);
}

pub(crate) fn process_dup_timer(
    instance: &mut InstanceUpView<'_>,
    origin: Ipv4Addr,
    seqno: u16,
) {
    instance.state.dup_set.remove(&(origin, seqno));
}

pub(crate) fn process_mpr_recount(instance: &mut InstanceUpView<'_>) {
    let mpr_coverage = instance.config.mpr_coverage;
    instance.state.neighborhood.process_mpr_recount(mpr_coverage);
}

pub(crate) fn process_route_update(instance: &mut InstanceUpView<'_>) {
    route::process_route_update(instance);
}

// ===== shutdown =====

// Withdraws every installed route ahead of instance shutdown.
pub(crate) fn uninstall_all_routes(instance: &mut InstanceUpView<'_>) {
    let state = &mut *instance.state;
    for route in state.routes.values() {
        southbound::tx::route_uninstall(&instance.tx.ibus, route);
    }
    state.routes.clear();
}
