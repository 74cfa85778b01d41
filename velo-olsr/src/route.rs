//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// Route computation (RFC 3626, Section 10).
//
// Routes are recomputed from scratch whenever the neighborhood or the
// topology database changes: first the symmetric one-hop neighbors, then
// the strict two-hop neighbors, then the more distant destinations learned
// from TC broadcasts, connected layer by layer to the already-routed set.
// Recomputations are coalesced through `schedule_route_update`.
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::instance::InstanceUpView;
use crate::neighborhood::Neighborhood;
use crate::southbound;
use crate::topology::TopologyManager;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    // Host destination.
    pub dest_addr: Ipv4Addr,
    pub nexthop: Ipv4Addr,
    pub ifindex: u32,
    pub metric: u32,
}

// ===== global functions =====

// Recomputes the routing table and pushes the changes to the RIB.
pub(crate) fn process_route_update(instance: &mut InstanceUpView<'_>) {
    let state = &mut *instance.state;
    state.route_update_scheduled = false;

    let new_routes =
        compute_routes(&state.neighborhood, &state.topology);

    // Uninstall routes that disappeared or changed.
    for (dest_addr, route) in state.routes.iter() {
        if new_routes.get(dest_addr) != Some(route) {
            southbound::tx::route_uninstall(&instance.tx.ibus, route);
        }
    }

    // Install new and changed routes.
    for (dest_addr, route) in new_routes.iter() {
        if state.routes.get(dest_addr) != Some(route) {
            southbound::tx::route_install(&instance.tx.ibus, route);
        }
    }

    state.routes = new_routes;
}

// Builds the new routing table from the neighborhood and the topology
// database.
fn compute_routes(
    neighborhood: &Neighborhood,
    topology: &TopologyManager,
) -> BTreeMap<Ipv4Addr, Route> {
    let mut routes: BTreeMap<Ipv4Addr, Route> = BTreeMap::new();

    // 10, 2: One route per symmetric one-hop neighbor, through its best
    // link; additional interface addresses of the neighbor get their own
    // host routes.
    for nbr in neighborhood.neighbors.values() {
        if !nbr.is_sym {
            continue;
        }
        let Some(link) = nbr
            .links
            .iter()
            .filter_map(|link_id| neighborhood.links.get(link_id))
            .find(|link| link.is_sym())
        else {
            continue;
        };

        routes.insert(
            nbr.main_addr,
            Route {
                dest_addr: nbr.main_addr,
                nexthop: link.remote_addr,
                ifindex: link.ifindex,
                metric: 1,
            },
        );
        for link in nbr
            .links
            .iter()
            .filter_map(|link_id| neighborhood.links.get(link_id))
            .filter(|link| link.is_sym())
        {
            routes.entry(link.remote_addr).or_insert(Route {
                dest_addr: link.remote_addr,
                nexthop: link.remote_addr,
                ifindex: link.ifindex,
                metric: 1,
            });
        }
    }

    // 10, 3: One route per strict two-hop neighbor, through one of the
    // selected MPRs covering it (or any symmetric neighbor reaching it
    // when the MPR set does not cover it).
    for node in neighborhood.twohop_nodes.values() {
        if !node.is_strict || routes.contains_key(&node.main_addr) {
            continue;
        }

        let mut vias = node
            .twohop_links
            .iter()
            .filter_map(|id| neighborhood.twohop_links.get(id))
            .filter_map(|twohop_link| {
                neighborhood.neighbors.get(&twohop_link.neighbor_id)
            })
            .filter(|nbr| nbr.is_sym)
            .collect::<Vec<_>>();
        vias.sort_by_key(|nbr| (!nbr.is_mpr, nbr.id));
        if let Some(via) = vias.first()
            && let Some(via_route) = routes.get(&via.main_addr)
        {
            let route = Route {
                dest_addr: node.main_addr,
                nexthop: via_route.nexthop,
                ifindex: via_route.ifindex,
                metric: 2,
            };
            routes.insert(node.main_addr, route);
        }
    }

    // 10, 4-5: Destinations advertised in TC broadcasts, connected to the
    // already-routed set in ascending distance order.
    topology.push_topology(|entry| {
        let dest_addr = topology.resolve_main_addr(entry.dest_addr);
        if routes.contains_key(&dest_addr) {
            return false;
        }
        let lasthop_addr = topology.resolve_main_addr(entry.lasthop_addr);
        let Some(via_route) = routes.get(&lasthop_addr) else {
            return false;
        };

        let route = Route {
            dest_addr,
            nexthop: via_route.nexthop,
            ifindex: via_route.ifindex,
            metric: via_route.metric + 1,
        };
        routes.insert(dest_addr, route);
        true
    });

    // 12, 4: Additional interface addresses learned through MID entries
    // inherit the route of their main address.
    for mid in topology.mids.values() {
        if routes.contains_key(&mid.iface_addr) {
            continue;
        }
        if let Some(main_route) = routes.get(&mid.main_addr) {
            let route = Route {
                dest_addr: mid.iface_addr,
                nexthop: main_route.nexthop,
                ifindex: main_route.ifindex,
                metric: main_route.metric,
            };
            routes.insert(mid.iface_addr, route);
        }
    }

    routes
}
