//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::packet::{DecodeError, Packet};
use crate::version::Version;

// Group-membership debug messages.
#[derive(Debug)]
pub enum Debug<'a, V: Version> {
    InstanceCreate,
    InstanceDelete,
    InstanceStart,
    InstanceStop(InstanceInactiveReason),
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    PacketRx(
        &'a str,
        &'a V::IpAddr,
        &'a Result<Packet<V>, DecodeError>,
    ),
    PacketTx(&'a str, &'a V::IpAddr, &'a Packet<V>),
    QuerierElect(&'a str, &'a V::IpAddr),
    QuerierResign(&'a str, &'a V::IpAddr),
    GroupCreate(&'a V::IpAddr),
    GroupDelete(&'a V::IpAddr),
    JoinNotify(&'a V::IpAddr, &'a V::IpAddr),
    PruneNotify(&'a V::IpAddr, &'a V::IpAddr),
    GroupCompatModeChange(&'a V::IpAddr, u8),
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

impl<'a, V> Debug<'a, V>
where
    V: Version,
{
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate
            | Debug::InstanceDelete
            | Debug::InstanceStart => {
                // Parent span(s): gmp-instance
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                // Parent span(s): gmp-instance
                debug!(%reason, "{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                // Parent span(s): gmp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::InterfaceStop(name, reason) => {
                // Parent span(s): gmp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%reason, "{}", self);
                });
            }
            Debug::PacketRx(ifname, source, packet) => {
                // Parent span(s): gmp-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("input", interface = %ifname, %source)
                        .in_scope(|| {
                            let data =
                                serde_json::to_string(&packet).unwrap();
                            debug!(%data, "{}", self);
                        });
                });
            }
            Debug::PacketTx(ifname, destination, packet) => {
                // Parent span(s): gmp-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("output", interface = %ifname, %destination)
                        .in_scope(|| {
                            let data =
                                serde_json::to_string(&packet).unwrap();
                            debug!(%data, "{}", self);
                        });
                });
            }
            Debug::QuerierElect(name, address)
            | Debug::QuerierResign(name, address) => {
                // Parent span(s): gmp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%address, "{}", self);
                });
            }
            Debug::GroupCreate(group) | Debug::GroupDelete(group) => {
                // Parent span(s): gmp-instance
                debug!(%group, "{}", self);
            }
            Debug::JoinNotify(source, group)
            | Debug::PruneNotify(source, group) => {
                // Parent span(s): gmp-instance
                debug!(%source, %group, "{}", self);
            }
            Debug::GroupCompatModeChange(group, version) => {
                // Parent span(s): gmp-instance
                debug!(%group, %version, "{}", self);
            }
        }
    }
}

impl<'a, V> std::fmt::Display for Debug<'a, V>
where
    V: Version,
{
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
            Debug::QuerierElect(..) => {
                write!(f, "elected as querier")
            }
            Debug::QuerierResign(..) => {
                write!(f, "other querier present")
            }
            Debug::GroupCreate(..) => {
                write!(f, "group created")
            }
            Debug::GroupDelete(..) => {
                write!(f, "group deleted")
            }
            Debug::JoinNotify(..) => {
                write!(f, "join notification")
            }
            Debug::PruneNotify(..) => {
                write!(f, "prune notification")
            }
            Debug::GroupCompatModeChange(..) => {
                write!(f, "older version host present")
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
