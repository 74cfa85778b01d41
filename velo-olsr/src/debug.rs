//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{debug, debug_span};

use crate::packet::{DecodeError, Packet};

// OLSR debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceCreate,
    InstanceDelete,
    InstanceStart,
    InstanceStop(InstanceInactiveReason),
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    PacketRx(&'a str, &'a Ipv4Addr, &'a Result<Packet, DecodeError>),
    PacketTx(&'a str, &'a Packet),
    LinkCreate(&'a Ipv4Addr, &'a Ipv4Addr),
    LinkDelete(&'a Ipv4Addr, &'a Ipv4Addr),
    NeighborCreate(&'a Ipv4Addr),
    NeighborDelete(&'a Ipv4Addr),
    MprSelectorAdd(&'a Ipv4Addr),
    MprSelectorDelete(&'a Ipv4Addr),
    MprSetChange(usize),
    TcTimerState(&'static str),
    TcEntryCreate(&'a Ipv4Addr, &'a Ipv4Addr, u16),
    TcEntryDelete(&'a Ipv4Addr, &'a Ipv4Addr),
    MessageForward(&'a Ipv4Addr, u16),
}

// Reason why an instance is inactive.
#[derive(Debug)]
pub enum InstanceInactiveReason {
    AdminDown,
}

// Reason why the protocol is inactive on an interface.
#[derive(Debug)]
pub enum InterfaceInactiveReason {
    InstanceDown,
    AdminDown,
    OperationalDown,
    MissingIfindex,
    MissingIpAddress,
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate
            | Debug::InstanceDelete
            | Debug::InstanceStart => {
                // Parent span(s): olsr-instance
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                // Parent span(s): olsr-instance
                debug!(%reason, "{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                // Parent span(s): olsr-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::InterfaceStop(name, reason) => {
                // Parent span(s): olsr-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%reason, "{}", self);
                });
            }
            Debug::PacketRx(ifname, source, packet) => {
                // Parent span(s): olsr-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("input", interface = %ifname, %source)
                        .in_scope(|| {
                            let data =
                                serde_json::to_string(&packet).unwrap();
                            debug!(%data, "{}", self);
                        });
                });
            }
            Debug::PacketTx(ifname, packet) => {
                // Parent span(s): olsr-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("output", interface = %ifname).in_scope(
                        || {
                            let data =
                                serde_json::to_string(&packet).unwrap();
                            debug!(%data, "{}", self);
                        },
                    );
                });
            }
            Debug::LinkCreate(remote, local)
            | Debug::LinkDelete(remote, local) => {
                // Parent span(s): olsr-instance
                debug!(%remote, %local, "{}", self);
            }
            Debug::NeighborCreate(addr)
            | Debug::NeighborDelete(addr)
            | Debug::MprSelectorAdd(addr)
            | Debug::MprSelectorDelete(addr) => {
                // Parent span(s): olsr-instance
                debug!(address = %addr, "{}", self);
            }
            Debug::MprSetChange(count) => {
                // Parent span(s): olsr-instance
                debug!(%count, "{}", self);
            }
            Debug::TcTimerState(state) => {
                // Parent span(s): olsr-instance
                debug!(%state, "{}", self);
            }
            Debug::TcEntryCreate(dest, lasthop, distance) => {
                // Parent span(s): olsr-instance
                debug!(%dest, %lasthop, %distance, "{}", self);
            }
            Debug::TcEntryDelete(dest, lasthop) => {
                // Parent span(s): olsr-instance
                debug!(%dest, %lasthop, "{}", self);
            }
            Debug::MessageForward(origin, seqno) => {
                // Parent span(s): olsr-instance
                debug!(%origin, %seqno, "{}", self);
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InstanceDelete => {
                write!(f, "instance deleted")
            }
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop(..) => {
                write!(f, "stopping instance")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::InterfaceStop(..) => {
                write!(f, "stopping interface")
            }
            Debug::PacketRx(..) | Debug::PacketTx(..) => {
                write!(f, "packet")
            }
            Debug::LinkCreate(..) => {
                write!(f, "link created")
            }
            Debug::LinkDelete(..) => {
                write!(f, "link deleted")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::MprSelectorAdd(..) => {
                write!(f, "MPR selector added")
            }
            Debug::MprSelectorDelete(..) => {
                write!(f, "MPR selector expired")
            }
            Debug::MprSetChange(..) => {
                write!(f, "MPR set changed")
            }
            Debug::TcTimerState(..) => {
                write!(f, "TC timer state change")
            }
            Debug::TcEntryCreate(..) => {
                write!(f, "topology entry created")
            }
            Debug::TcEntryDelete(..) => {
                write!(f, "topology entry deleted")
            }
            Debug::MessageForward(..) => {
                write!(f, "forwarding flooded message")
            }
        }
    }
}

// ===== impl InstanceInactiveReason =====

impl std::fmt::Display for InstanceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
        }
    }
}

// ===== impl InterfaceInactiveReason =====

impl std::fmt::Display for InterfaceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceInactiveReason::InstanceDown => {
                write!(f, "instance down")
            }
            InterfaceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InterfaceInactiveReason::OperationalDown => {
                write!(f, "operational status down")
            }
            InterfaceInactiveReason::MissingIfindex => {
                write!(f, "missing ifindex")
            }
            InterfaceInactiveReason::MissingIpAddress => {
                write!(f, "missing IP address")
            }
        }
    }
}
