//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};
use velo_utils::ip::{AddressFamily, IpAddrKind, IpNetworkKind};
use velo_utils::protocol::Protocol;

use crate::network::NetworkVersion;
use crate::packet::PacketVersion;

// Group-membership version-specific code.
pub trait Version
where
    Self: 'static
        + Send
        + Sync
        + Default
        + std::fmt::Debug
        + PacketVersion<Self>
        + NetworkVersion<Self>,
{
    const PROTOCOL: Protocol;
    const ADDRESS_FAMILY: AddressFamily;

    // Range of supported protocol versions.
    const VERSION_MIN: u8;
    const VERSION_MAX: u8;
    const VERSION_DEFAULT: u8;

    // Protocol version whose messages carry source lists.
    const VERSION_SSM: u8;

    // Units per second of the Max Resp Code field (IGMP encodes tenths of a
    // second, MLD milliseconds).
    const TIMER_SCALE: u32;

    type IpAddr: IpAddrKind;
    type IpNetwork: IpNetworkKind<Self::IpAddr>;

    // The all-systems (all-nodes) group, destination of General Queries.
    fn all_systems() -> Self::IpAddr;

    // The all-routers group, which every multicast router listens on.
    fn all_routers() -> Self::IpAddr;

    // The group that SSM-capable routers listen on for aggregated reports.
    fn ssm_routers() -> Self::IpAddr;

    // Returns whether the given group address is acceptable in a listener
    // message received on this interface.
    fn group_addr_valid(group: &Self::IpAddr) -> bool;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Igmp();

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mld();

// ===== impl Igmp =====

impl Version for Igmp {
    const PROTOCOL: Protocol = Protocol::IGMP;
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv4;

    const VERSION_MIN: u8 = 1;
    const VERSION_MAX: u8 = 3;
    const VERSION_DEFAULT: u8 = 2;
    const VERSION_SSM: u8 = 3;

    const TIMER_SCALE: u32 = 10;

    type IpAddr = Ipv4Addr;
    type IpNetwork = Ipv4Network;

    fn all_systems() -> Ipv4Addr {
        Ipv4Addr::new(224, 0, 0, 1)
    }

    fn all_routers() -> Ipv4Addr {
        Ipv4Addr::new(224, 0, 0, 2)
    }

    fn ssm_routers() -> Ipv4Addr {
        Ipv4Addr::new(224, 0, 0, 22)
    }

    fn group_addr_valid(group: &Ipv4Addr) -> bool {
        group.is_multicast()
    }
}

// ===== impl Mld =====

impl Version for Mld {
    const PROTOCOL: Protocol = Protocol::MLD;
    const ADDRESS_FAMILY: AddressFamily = AddressFamily::Ipv6;

    const VERSION_MIN: u8 = 1;
    const VERSION_MAX: u8 = 2;
    const VERSION_DEFAULT: u8 = 1;
    const VERSION_SSM: u8 = 2;

    const TIMER_SCALE: u32 = 1000;

    type IpAddr = Ipv6Addr;
    type IpNetwork = Ipv6Network;

    fn all_systems() -> Ipv6Addr {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x0001)
    }

    fn all_routers() -> Ipv6Addr {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x0002)
    }

    fn ssm_routers() -> Ipv6Addr {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x0016)
    }

    fn group_addr_valid(group: &Ipv6Addr) -> bool {
        use velo_utils::ip::Ipv6AddrExt;

        // Interface-local scoped groups must never appear in MLD listener
        // messages (RFC 3810, Section 5).
        group.is_multicast() && !group.is_multicast_interface_local()
    }
}
