//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::Ipv4Network;
use velo_utils::ibus::IbusChannelsTx;
use velo_utils::ip::Ipv4AddrExt;
use velo_utils::protocol::Protocol;
use velo_utils::southbound::{Nexthop, RouteKeyMsg, RouteMsg};

use crate::route::Route;

// Administrative distance of OLSR routes.
const DISTANCE: u32 = 20;

// ===== global functions =====

pub(crate) fn route_install(ibus_tx: &IbusChannelsTx, route: &Route) {
    let prefix: Ipv4Network = route.dest_addr.to_host_prefix();
    let mut nexthops = BTreeSet::new();
    nexthops.insert(Nexthop::Address {
        ifindex: route.ifindex,
        addr: IpAddr::V4(route.nexthop),
    });

    let msg = RouteMsg {
        protocol: Protocol::OLSR,
        prefix: prefix.into(),
        distance: DISTANCE,
        metric: route.metric,
        nexthops,
    };
    ibus_tx.route_ip_add(msg);
}

pub(crate) fn route_uninstall(ibus_tx: &IbusChannelsTx, route: &Route) {
    let prefix: Ipv4Network = route.dest_addr.to_host_prefix();

    let msg = RouteKeyMsg {
        protocol: Protocol::OLSR,
        prefix: prefix.into(),
    };
    ibus_tx.route_ip_del(msg);
}
