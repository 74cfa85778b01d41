//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use velo_utils::task::TimeoutTask;

use crate::neighborhood::{NeighborId, TwoHopLinkId, TwoHopNodeId};

/// An edge between a one-hop neighbor and a two-hop neighbor, learned from
/// the neighbor's HELLO broadcasts (RFC 3626, Section 4.3.2).
#[derive(Debug)]
pub struct TwoHopLink {
    pub id: TwoHopLinkId,
    // The neighbor this link is reached through (near end).
    pub neighbor_id: NeighborId,
    // The two-hop neighbor at the far end.
    pub twohop_node_id: TwoHopNodeId,
    // Interface where the link was last advertised.
    pub ifindex: u32,
    // Expiry timer.
    pub dead_timer: Option<TimeoutTask>,
    // ETX measurements (unused by the current MPR computation).
    pub near_etx: f64,
    pub far_etx: f64,
}

/// A node two hops away, tracked by its advertised interface address.
///
/// The node ceases to exist when its last two-hop link is removed.
#[derive(Debug)]
pub struct TwoHopNeighbor {
    pub id: TwoHopNodeId,
    pub main_addr: Ipv4Addr,
    // The two-hop links leading to this node.
    pub twohop_links: BTreeSet<TwoHopLinkId>,
    // A strict two-hop neighbor is not also a one-hop neighbor.
    pub is_strict: bool,
    // Number of currently selected MPRs covering this node.
    pub coverage: usize,
    // Number of MPR candidates with an edge to this node; recomputed
    // during each MPR recount.
    pub reachability: usize,
}

// ===== impl TwoHopLink =====

impl TwoHopLink {
    pub(crate) fn new(
        id: TwoHopLinkId,
        neighbor_id: NeighborId,
        twohop_node_id: TwoHopNodeId,
        ifindex: u32,
    ) -> TwoHopLink {
        TwoHopLink {
            id,
            neighbor_id,
            twohop_node_id,
            ifindex,
            dead_timer: None,
            near_etx: 0.0,
            far_etx: 0.0,
        }
    }
}

// ===== impl TwoHopNeighbor =====

impl TwoHopNeighbor {
    pub(crate) fn new(
        id: TwoHopNodeId,
        main_addr: Ipv4Addr,
        is_strict: bool,
    ) -> TwoHopNeighbor {
        TwoHopNeighbor {
            id,
            main_addr,
            twohop_links: Default::default(),
            is_strict,
            coverage: 0,
            reachability: 0,
        }
    }

    // Whether the node is covered by enough MPRs.
    pub(crate) fn is_covered(&self, mpr_coverage: u8) -> bool {
        self.coverage >= mpr_coverage as usize
    }

    // Whether the node can be reached through at least one MPR candidate.
    pub(crate) fn is_reachable(&self) -> bool {
        self.reachability > 0
    }
}
