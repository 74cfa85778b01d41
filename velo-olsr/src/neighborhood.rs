//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// The neighborhood tracks everything within a two-hop radius: logical
// links, one-hop neighbors, two-hop links and two-hop neighbors, the MPR
// selector set and the computed MPR set. Entities are stored in owning
// tables keyed by integer IDs and refer to each other by ID, so deletions
// can cascade without dangling references; any traversal that may delete
// collects IDs first and applies the deletions afterwards.
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use velo_utils::task::IntervalTask;

use crate::config::{InstanceCfg, TcRedundancy};
use crate::debug::Debug;
use crate::instance::ProtocolInputChannelsTx;
use crate::link::LogicalLink;
use crate::neighbor::Neighbor;
use crate::packet::{
    HelloMessage, LinkCode, LinkType, NeighborType, TcMessage, WILL_ALWAYS,
};
use crate::tasks;
use crate::tasks::messages::input::TcIntervalMsg;
use crate::twohop::{TwoHopLink, TwoHopNeighbor};

// Entity identifiers.
pub type LinkId = u32;
pub type NeighborId = u32;
pub type TwoHopLinkId = u32;
pub type TwoHopNodeId = u32;

// TC broadcast timer states (RFC 3626, Section 9.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcTimerState {
    Stopped,
    Running,
    Finishing,
}

// Number of TC broadcasts sent with an empty advertised set before the
// timer stops.
const TC_FINISHING_TICKS: u8 = 3;

#[derive(Debug)]
pub struct Neighborhood {
    // Logical links.
    pub links: BTreeMap<LinkId, LogicalLink>,
    links_by_addr: BTreeMap<(Ipv4Addr, Ipv4Addr), LinkId>,
    next_link_id: LinkId,
    // One-hop neighbors.
    pub neighbors: BTreeMap<NeighborId, Neighbor>,
    neighbors_by_addr: BTreeMap<Ipv4Addr, NeighborId>,
    next_neighbor_id: NeighborId,
    // Two-hop links.
    pub twohop_links: BTreeMap<TwoHopLinkId, TwoHopLink>,
    twohop_links_by_addr: BTreeMap<(NeighborId, Ipv4Addr), TwoHopLinkId>,
    next_twohop_link_id: TwoHopLinkId,
    // Two-hop neighbors.
    pub twohop_nodes: BTreeMap<TwoHopNodeId, TwoHopNeighbor>,
    twohop_nodes_by_addr: BTreeMap<Ipv4Addr, TwoHopNodeId>,
    next_twohop_node_id: TwoHopNodeId,
    // MPR state.
    pub mpr_selectors: BTreeSet<NeighborId>,
    pub mpr_set: BTreeSet<NeighborId>,
    mpr_recount_scheduled: bool,
    // TC origination state.
    pub tc_timer_state: TcTimerState,
    tc_timer: Option<IntervalTask>,
    pub tc_current_ansn: u16,
    tc_previous_ans_count: usize,
    tc_timer_ticks_remaining: u8,
}

// ===== impl Neighborhood =====

impl Neighborhood {
    pub(crate) fn new() -> Neighborhood {
        Neighborhood {
            links: Default::default(),
            links_by_addr: Default::default(),
            next_link_id: 1,
            neighbors: Default::default(),
            neighbors_by_addr: Default::default(),
            next_neighbor_id: 1,
            twohop_links: Default::default(),
            twohop_links_by_addr: Default::default(),
            next_twohop_link_id: 1,
            twohop_nodes: Default::default(),
            twohop_nodes_by_addr: Default::default(),
            next_twohop_node_id: 1,
            mpr_selectors: Default::default(),
            mpr_set: Default::default(),
            mpr_recount_scheduled: false,
            tc_timer_state: TcTimerState::Stopped,
            tc_timer: None,
            tc_current_ansn: 0,
            tc_previous_ans_count: 0,
            tc_timer_ticks_remaining: 0,
        }
    }

    // ===== HELLO processing (RFC 3626, Sections 7.1.1, 8.1, 8.2.1) =====

    pub(crate) fn process_hello(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        neighbor_hold_time: Duration,
        ifindex: u32,
        remote_addr: Ipv4Addr,
        local_addr: Ipv4Addr,
        local_addrs: &BTreeSet<Ipv4Addr>,
        origin: Ipv4Addr,
        vtime: Duration,
        hello: &HelloMessage,
    ) {
        // First pass over the link information: does the neighbor list the
        // address of the interface this HELLO was heard on? This decides
        // how the link-state timers are updated, and tells us whether the
        // neighbor selects us as an MPR.
        let mut my_link_code =
            LinkCode::new(NeighborType::Not, LinkType::Unspec);
        let mut saw_self = false;
        for (link_code, addr) in hello.iter_links() {
            if *addr == local_addr {
                my_link_code = link_code;
                saw_self = true;
                break;
            }
        }

        // Update the link state tuple, creating it if needed.
        let link_id =
            self.update_link(tx, ifindex, remote_addr, local_addr, vtime);
        self.links.get_mut(&link_id).unwrap().update_timers(
            vtime,
            saw_self,
            my_link_code,
            neighbor_hold_time,
            tx,
        );

        // Update the neighbor tuple, creating it if needed, and the MPR
        // selector set if the neighbor selects us as an MPR.
        let is_mpr_selector = saw_self && my_link_code.is_mpr_neighbor();
        let nbr_id = self.update_neighbor(
            tx,
            config,
            origin,
            link_id,
            hello.willingness,
            is_mpr_selector,
            vtime,
        );

        // Process two-hop neighbors if the link with the neighbor is now
        // symmetric.
        if self.neighbors[&nbr_id].is_sym {
            for (link_code, addr) in hello.iter_links() {
                // A node cannot be its own two-hop neighbor.
                if local_addrs.contains(addr) {
                    continue;
                }
                match link_code.neighbor_type {
                    NeighborType::Sym | NeighborType::Mpr => {
                        self.update_twohop_link(
                            tx, nbr_id, *addr, ifindex, vtime,
                        );
                    }
                    NeighborType::Not => {
                        self.delete_twohop_link_by_addrs(nbr_id, *addr);
                    }
                }
            }
        }

        self.schedule_mpr_recount(tx);
    }

    // ===== link management =====

    fn update_link(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        ifindex: u32,
        remote_addr: Ipv4Addr,
        local_addr: Ipv4Addr,
        vtime: Duration,
    ) -> LinkId {
        if let Some(link_id) =
            self.links_by_addr.get(&(remote_addr, local_addr))
        {
            return *link_id;
        }

        let link_id = self.next_link_id;
        self.next_link_id += 1;
        Debug::LinkCreate(&remote_addr, &local_addr).log();

        let link =
            LogicalLink::new(link_id, ifindex, remote_addr, local_addr, vtime, tx);
        self.links.insert(link_id, link);
        self.links_by_addr
            .insert((remote_addr, local_addr), link_id);

        link_id
    }

    pub(crate) fn delete_link(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        link_id: LinkId,
    ) {
        let Some(link) = self.links.remove(&link_id) else {
            return;
        };
        Debug::LinkDelete(&link.remote_addr, &link.local_addr).log();
        self.links_by_addr
            .remove(&(link.remote_addr, link.local_addr));

        // Re-evaluate the neighbor; it ceases to exist with its last link.
        let nbr_id = link.neighbor_id;
        let delete_neighbor =
            if let Some(nbr) = self.neighbors.get_mut(&nbr_id) {
                nbr.links.remove(&link_id);
                nbr.links.is_empty()
            } else {
                false
            };
        if delete_neighbor {
            self.delete_neighbor(tx, config, nbr_id);
        } else {
            self.refresh_neighbor_sym(nbr_id);
        }

        self.schedule_mpr_recount(tx);
    }

    // SYM timer expiry: the link transitions SYM -> ASYM. The handler
    // re-derives the link type, so a simultaneous ASYM expiry cannot make
    // the transition chain skip a state.
    pub(crate) fn process_link_sym_timer(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        link_id: LinkId,
    ) {
        let Some(link) = self.links.get_mut(&link_id) else {
            return;
        };
        link.sym_timer = None;

        self.refresh_neighbor_sym(self.links[&link_id].neighbor_id);
        self.schedule_mpr_recount(tx);
    }

    // ASYM timer expiry: the link transitions ASYM -> LOST, taking down
    // every two-hop link routed through the neighbor.
    pub(crate) fn process_link_asym_timer(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        link_id: LinkId,
    ) {
        let Some(link) = self.links.get_mut(&link_id) else {
            return;
        };
        link.asym_timer = None;
        let nbr_id = link.neighbor_id;

        self.refresh_neighbor_sym(nbr_id);
        let twohop_link_ids = self
            .neighbors
            .get(&nbr_id)
            .map(|nbr| nbr.twohop_links.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for twohop_link_id in twohop_link_ids {
            self.delete_twohop_link(twohop_link_id);
        }

        self.schedule_mpr_recount(tx);
    }

    // Dead timer expiry: the link is deleted.
    pub(crate) fn process_link_dead_timer(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        link_id: LinkId,
    ) {
        if let Some(link) = self.links.get_mut(&link_id) {
            link.dead_timer = None;
        }
        self.delete_link(tx, config, link_id);
    }

    // ===== neighbor management =====

    fn update_neighbor(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        main_addr: Ipv4Addr,
        link_id: LinkId,
        willingness: u8,
        is_mpr_selector: bool,
        vtime: Duration,
    ) -> NeighborId {
        let nbr_id = match self.neighbors_by_addr.get(&main_addr) {
            Some(nbr_id) => *nbr_id,
            None => {
                let nbr_id = self.next_neighbor_id;
                self.next_neighbor_id += 1;
                Debug::NeighborCreate(&main_addr).log();

                self.neighbors
                    .insert(nbr_id, Neighbor::new(nbr_id, main_addr));
                self.neighbors_by_addr.insert(main_addr, nbr_id);

                // The node is a one-hop neighbor now, so it is no longer a
                // strict two-hop neighbor.
                if let Some(node_id) = self.twohop_nodes_by_addr.get(&main_addr)
                    && let Some(node) = self.twohop_nodes.get_mut(node_id)
                {
                    node.is_strict = false;
                }

                nbr_id
            }
        };

        // Associate the link with the neighbor.
        self.links.get_mut(&link_id).unwrap().neighbor_id = nbr_id;
        let nbr = self.neighbors.get_mut(&nbr_id).unwrap();
        nbr.links.insert(link_id);
        nbr.willingness = willingness;
        self.refresh_neighbor_sym(nbr_id);

        // Update the MPR selector set (RFC 3626, Section 8.4.1).
        if is_mpr_selector {
            self.update_mpr_selector(tx, config, nbr_id, vtime);
        }

        nbr_id
    }

    fn delete_neighbor(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        nbr_id: NeighborId,
    ) {
        let Some(nbr) = self.neighbors.get(&nbr_id) else {
            return;
        };

        // Losing the neighbor takes down every two-hop link through it.
        let twohop_link_ids =
            nbr.twohop_links.iter().copied().collect::<Vec<_>>();
        for twohop_link_id in twohop_link_ids {
            self.delete_twohop_link(twohop_link_id);
        }

        let nbr = self.neighbors.remove(&nbr_id).unwrap();
        Debug::NeighborDelete(&nbr.main_addr).log();
        self.neighbors_by_addr.remove(&nbr.main_addr);
        self.mpr_set.remove(&nbr_id);
        if self.mpr_selectors.remove(&nbr_id)
            && self.mpr_selectors.is_empty()
        {
            self.finish_tc_timer();
            if config.loss_triggered_tc {
                let _ = tx.tc_interval.try_send(TcIntervalMsg {});
            }
        }

        // A node known by this main address becomes a strict two-hop
        // neighbor again.
        if let Some(node_id) = self.twohop_nodes_by_addr.get(&nbr.main_addr)
            && let Some(node) = self.twohop_nodes.get_mut(node_id)
        {
            node.is_strict = true;
        }

        // Any neighbor loss revises the advertised neighbor set.
        self.tc_current_ansn = self.tc_current_ansn.wrapping_add(1);
        self.schedule_mpr_recount(tx);
    }

    // Re-derives the neighbor's symmetry from its remaining links
    // (RFC 3626, Section 8.1).
    fn refresh_neighbor_sym(&mut self, nbr_id: NeighborId) {
        let Some(nbr) = self.neighbors.get(&nbr_id) else {
            return;
        };
        let is_sym = nbr
            .links
            .iter()
            .filter_map(|link_id| self.links.get(link_id))
            .any(|link| link.is_sym());
        self.neighbors.get_mut(&nbr_id).unwrap().is_sym = is_sym;
    }

    // Returns whether the given address belongs to a symmetric one-hop
    // neighbor.
    pub(crate) fn is_sym_neighbor_addr(&self, addr: Ipv4Addr) -> bool {
        self.neighbor_id_by_iface_addr(addr)
            .and_then(|nbr_id| self.neighbors.get(&nbr_id))
            .map(|nbr| nbr.is_sym)
            .unwrap_or(false)
    }

    // Returns whether the given address belongs to a neighbor that has
    // selected us as an MPR.
    pub(crate) fn is_mpr_selector_addr(&self, addr: Ipv4Addr) -> bool {
        self.neighbor_id_by_iface_addr(addr)
            .and_then(|nbr_id| self.neighbors.get(&nbr_id))
            .map(|nbr| nbr.is_mpr_selector())
            .unwrap_or(false)
    }

    fn neighbor_id_by_iface_addr(&self, addr: Ipv4Addr) -> Option<NeighborId> {
        if let Some(nbr_id) = self.neighbors_by_addr.get(&addr) {
            return Some(*nbr_id);
        }
        self.links
            .values()
            .find(|link| link.remote_addr == addr)
            .map(|link| link.neighbor_id)
    }

    // ===== MPR selector management =====

    fn update_mpr_selector(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        nbr_id: NeighborId,
        vtime: Duration,
    ) {
        let was_mpr = !self.mpr_selectors.is_empty();

        let nbr = self.neighbors.get_mut(&nbr_id).unwrap();
        nbr.mpr_selector_timer = Some(tasks::mpr_selector_timer(
            nbr_id,
            vtime,
            &tx.mpr_selector_timer,
        ));
        let is_created = self.mpr_selectors.insert(nbr_id);
        if is_created {
            Debug::MprSelectorAdd(&self.neighbors[&nbr_id].main_addr).log();
        }

        // Start originating TC broadcasts once we become an MPR
        // (RFC 3626, Section 9.3); an advertised-set change while already
        // running may trigger an early broadcast.
        if !was_mpr {
            self.start_tc_timer(config.tc_interval(), tx);
        } else if is_created && config.change_triggered_tc {
            let _ = tx.tc_interval.try_send(TcIntervalMsg {});
        }
    }

    pub(crate) fn process_mpr_selector_timer(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        nbr_id: NeighborId,
    ) {
        if !self.mpr_selectors.remove(&nbr_id) {
            return;
        }
        if let Some(nbr) = self.neighbors.get_mut(&nbr_id) {
            nbr.mpr_selector_timer = None;
            Debug::MprSelectorDelete(&nbr.main_addr).log();
        }

        // With no MPR selectors left the TC timer enters its finishing
        // phase.
        if self.mpr_selectors.is_empty() {
            self.finish_tc_timer();
            if config.loss_triggered_tc {
                let _ = tx.tc_interval.try_send(TcIntervalMsg {});
            }
        }
    }

    // ===== two-hop management =====

    fn update_twohop_link(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        nbr_id: NeighborId,
        addr: Ipv4Addr,
        ifindex: u32,
        vtime: Duration,
    ) -> TwoHopLinkId {
        // Find or create the two-hop node.
        let node_id = match self.twohop_nodes_by_addr.get(&addr) {
            Some(node_id) => *node_id,
            None => {
                let node_id = self.next_twohop_node_id;
                self.next_twohop_node_id += 1;

                let is_strict = !self.neighbors_by_addr.contains_key(&addr);
                self.twohop_nodes.insert(
                    node_id,
                    TwoHopNeighbor::new(node_id, addr, is_strict),
                );
                self.twohop_nodes_by_addr.insert(addr, node_id);

                node_id
            }
        };

        // Find or create the two-hop link.
        let twohop_link_id =
            match self.twohop_links_by_addr.get(&(nbr_id, addr)) {
                Some(twohop_link_id) => *twohop_link_id,
                None => {
                    let twohop_link_id = self.next_twohop_link_id;
                    self.next_twohop_link_id += 1;

                    self.twohop_links.insert(
                        twohop_link_id,
                        TwoHopLink::new(
                            twohop_link_id,
                            nbr_id,
                            node_id,
                            ifindex,
                        ),
                    );
                    self.twohop_links_by_addr
                        .insert((nbr_id, addr), twohop_link_id);
                    self.neighbors
                        .get_mut(&nbr_id)
                        .unwrap()
                        .twohop_links
                        .insert(twohop_link_id);
                    self.twohop_nodes
                        .get_mut(&node_id)
                        .unwrap()
                        .twohop_links
                        .insert(twohop_link_id);

                    twohop_link_id
                }
            };

        // Refresh the expiry timer and advertising interface.
        let twohop_link = self.twohop_links.get_mut(&twohop_link_id).unwrap();
        twohop_link.ifindex = ifindex;
        twohop_link.dead_timer = Some(tasks::twohop_dead_timer(
            twohop_link_id,
            vtime,
            &tx.twohop_dead_timer,
        ));

        twohop_link_id
    }

    pub(crate) fn delete_twohop_link(&mut self, twohop_link_id: TwoHopLinkId) {
        let Some(twohop_link) = self.twohop_links.remove(&twohop_link_id)
        else {
            return;
        };

        // Unlink from the near-end neighbor.
        if let Some(nbr) = self.neighbors.get_mut(&twohop_link.neighbor_id) {
            nbr.twohop_links.remove(&twohop_link_id);
        }

        // Unlink from the far-end node, deleting the node with its last
        // link.
        let mut node_is_empty = false;
        if let Some(node) =
            self.twohop_nodes.get_mut(&twohop_link.twohop_node_id)
        {
            self.twohop_links_by_addr
                .remove(&(twohop_link.neighbor_id, node.main_addr));
            node.twohop_links.remove(&twohop_link_id);
            node_is_empty = node.twohop_links.is_empty();
        }
        if node_is_empty
            && let Some(node) =
                self.twohop_nodes.remove(&twohop_link.twohop_node_id)
        {
            self.twohop_nodes_by_addr.remove(&node.main_addr);
        }
    }

    fn delete_twohop_link_by_addrs(
        &mut self,
        nbr_id: NeighborId,
        addr: Ipv4Addr,
    ) {
        if let Some(twohop_link_id) =
            self.twohop_links_by_addr.get(&(nbr_id, addr))
        {
            self.delete_twohop_link(*twohop_link_id);
        }
    }

    pub(crate) fn process_twohop_dead_timer(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        twohop_link_id: TwoHopLinkId,
    ) {
        self.delete_twohop_link(twohop_link_id);
        self.schedule_mpr_recount(tx);
    }

    // ===== MPR computation (RFC 3626, Section 8.3.1) =====

    // The recount is coalesced: any number of requests within one event
    // loop tick produce exactly one recount.
    pub(crate) fn schedule_mpr_recount(&mut self, tx: &ProtocolInputChannelsTx) {
        if self.mpr_recount_scheduled {
            return;
        }
        self.mpr_recount_scheduled = true;
        tasks::schedule_mpr_recount(&tx.mpr_recount);
    }

    pub(crate) fn process_mpr_recount(&mut self, mpr_coverage: u8) {
        self.mpr_recount_scheduled = false;
        self.recount_mpr_set(mpr_coverage);
    }

    pub(crate) fn recount_mpr_set(&mut self, mpr_coverage: u8) {
        // Clear all existing MPR state and recompute each neighbor's
        // degree and each two-hop neighbor's reachability.
        for nbr in self.neighbors.values_mut() {
            nbr.is_mpr = false;
            nbr.reachability = 0;
        }
        self.recount_degrees();
        self.recount_twohop_reachability();
        self.recompute_coverage();

        // Start with an MPR set made of all members of N with willingness
        // equal to WILL_ALWAYS.
        for nbr in self.neighbors.values_mut() {
            if nbr.willingness == WILL_ALWAYS && nbr.is_sym {
                nbr.is_mpr = true;
            }
        }
        self.recompute_coverage();

        // Ensure that for every uncovered strict two-hop neighbor
        // reachable through exactly one candidate, that candidate is
        // selected.
        let sole_reached = self
            .twohop_nodes
            .values()
            .filter(|node| {
                node.is_strict
                    && node.reachability == 1
                    && !node.is_covered(mpr_coverage)
            })
            .map(|node| node.id)
            .collect::<Vec<_>>();
        for node_id in sole_reached {
            let Some(nbr_id) = self.covering_candidate(node_id) else {
                continue;
            };
            self.neighbors.get_mut(&nbr_id).unwrap().is_mpr = true;
        }
        self.recompute_coverage();

        // Consider the remaining candidates in descending order of
        // willingness, reachability and degree; ties break on ascending
        // neighbor ID so recounts are reproducible.
        let mut candidates = self
            .neighbors
            .values()
            .filter(|nbr| {
                nbr.is_cand_mpr()
                    && !nbr.is_mpr
                    && nbr.willingness != WILL_ALWAYS
            })
            .map(|nbr| nbr.id)
            .collect::<Vec<_>>();
        for nbr_id in candidates.iter() {
            let reachability = self.uncovered_reachability(*nbr_id, mpr_coverage);
            self.neighbors.get_mut(nbr_id).unwrap().reachability =
                reachability;
        }
        candidates.sort_by(|a, b| {
            let na = &self.neighbors[a];
            let nb = &self.neighbors[b];
            nb.willingness
                .cmp(&na.willingness)
                .then(nb.reachability.cmp(&na.reachability))
                .then(nb.degree.cmp(&na.degree))
                .then(na.id.cmp(&nb.id))
        });
        for nbr_id in candidates {
            // Candidates that no longer reach an uncovered two-hop
            // neighbor are skipped.
            if self.uncovered_reachability(nbr_id, mpr_coverage) == 0 {
                continue;
            }
            self.neighbors.get_mut(&nbr_id).unwrap().is_mpr = true;
            self.recompute_coverage();
        }

        // Minimize: withdraw, in ascending order of willingness, every MPR
        // whose two-hop neighbors all remain sufficiently covered without
        // it.
        for willingness in 1..WILL_ALWAYS {
            let withdrawal_candidates = self
                .neighbors
                .values()
                .filter(|nbr| {
                    nbr.is_mpr && nbr.willingness == willingness
                })
                .map(|nbr| nbr.id)
                .collect::<Vec<_>>();
            for nbr_id in withdrawal_candidates {
                if !self.is_essential_mpr(nbr_id, mpr_coverage) {
                    self.neighbors.get_mut(&nbr_id).unwrap().is_mpr = false;
                    self.recompute_coverage();

                    // Every strict reachable two-hop neighbor must remain
                    // covered.
                    debug_assert!(self.twohop_nodes.values().all(|node| {
                        !(node.is_strict && node.is_reachable())
                            || node.is_covered(mpr_coverage)
                    }));
                }
            }
        }

        let new_mpr_set = self
            .neighbors
            .values()
            .filter(|nbr| nbr.is_mpr)
            .map(|nbr| nbr.id)
            .collect::<BTreeSet<_>>();
        if new_mpr_set != self.mpr_set {
            Debug::MprSetChange(new_mpr_set.len()).log();
        }
        self.mpr_set = new_mpr_set;
    }

    // Recomputes each neighbor's degree: the number of strict two-hop
    // neighbors it reaches.
    fn recount_degrees(&mut self) {
        let mut degrees: BTreeMap<NeighborId, usize> = BTreeMap::new();
        for twohop_link in self.twohop_links.values() {
            if let Some(node) =
                self.twohop_nodes.get(&twohop_link.twohop_node_id)
                && node.is_strict
            {
                *degrees.entry(twohop_link.neighbor_id).or_default() += 1;
            }
        }
        for nbr in self.neighbors.values_mut() {
            nbr.degree = degrees.get(&nbr.id).copied().unwrap_or(0);
        }
    }

    // Recomputes each two-hop neighbor's reachability: the number of MPR
    // candidates with an edge to it.
    fn recount_twohop_reachability(&mut self) {
        let mut reach: BTreeMap<TwoHopNodeId, BTreeSet<NeighborId>> =
            BTreeMap::new();
        for twohop_link in self.twohop_links.values() {
            if let Some(nbr) = self.neighbors.get(&twohop_link.neighbor_id)
                && nbr.is_cand_mpr()
            {
                reach
                    .entry(twohop_link.twohop_node_id)
                    .or_default()
                    .insert(twohop_link.neighbor_id);
            }
        }
        for node in self.twohop_nodes.values_mut() {
            node.reachability =
                reach.get(&node.id).map(|set| set.len()).unwrap_or(0);
        }
    }

    // Recomputes each two-hop neighbor's coverage: the number of distinct
    // selected MPRs with an edge to it.
    fn recompute_coverage(&mut self) {
        let mut coverage: BTreeMap<TwoHopNodeId, BTreeSet<NeighborId>> =
            BTreeMap::new();
        for twohop_link in self.twohop_links.values() {
            if let Some(nbr) = self.neighbors.get(&twohop_link.neighbor_id)
                && nbr.is_mpr
            {
                coverage
                    .entry(twohop_link.twohop_node_id)
                    .or_default()
                    .insert(twohop_link.neighbor_id);
            }
        }
        for node in self.twohop_nodes.values_mut() {
            node.coverage =
                coverage.get(&node.id).map(|set| set.len()).unwrap_or(0);
        }
    }

    // Returns a candidate neighbor reaching the given two-hop node
    // (lowest neighbor ID first).
    fn covering_candidate(&self, node_id: TwoHopNodeId) -> Option<NeighborId> {
        let node = self.twohop_nodes.get(&node_id)?;
        node.twohop_links
            .iter()
            .filter_map(|twohop_link_id| {
                self.twohop_links.get(twohop_link_id)
            })
            .map(|twohop_link| twohop_link.neighbor_id)
            .filter(|nbr_id| {
                self.neighbors
                    .get(nbr_id)
                    .map(|nbr| nbr.is_cand_mpr())
                    .unwrap_or(false)
            })
            .min()
    }

    // Number of uncovered strict two-hop neighbors reachable through the
    // given neighbor.
    fn uncovered_reachability(
        &self,
        nbr_id: NeighborId,
        mpr_coverage: u8,
    ) -> usize {
        let Some(nbr) = self.neighbors.get(&nbr_id) else {
            return 0;
        };
        nbr.twohop_links
            .iter()
            .filter_map(|twohop_link_id| {
                self.twohop_links.get(twohop_link_id)
            })
            .filter_map(|twohop_link| {
                self.twohop_nodes.get(&twohop_link.twohop_node_id)
            })
            .filter(|node| node.is_strict && !node.is_covered(mpr_coverage))
            .count()
    }

    // An MPR is essential while some strict two-hop neighbor would lose
    // its required coverage without it.
    fn is_essential_mpr(&self, nbr_id: NeighborId, mpr_coverage: u8) -> bool {
        let Some(nbr) = self.neighbors.get(&nbr_id) else {
            return false;
        };
        nbr.twohop_links
            .iter()
            .filter_map(|twohop_link_id| {
                self.twohop_links.get(twohop_link_id)
            })
            .filter_map(|twohop_link| {
                self.twohop_nodes.get(&twohop_link.twohop_node_id)
            })
            .any(|node| {
                node.is_strict && node.coverage <= mpr_coverage as usize
            })
    }

    // ===== TC origination (RFC 3626, Section 9.3) =====

    fn start_tc_timer(
        &mut self,
        interval: Duration,
        tx: &ProtocolInputChannelsTx,
    ) {
        Debug::TcTimerState("running").log();
        self.tc_timer_state = TcTimerState::Running;
        self.tc_timer =
            Some(tasks::tc_interval(interval, &tx.tc_interval));
    }

    fn stop_tc_timer(&mut self) {
        Debug::TcTimerState("stopped").log();
        self.tc_timer = None;
        self.tc_timer_state = TcTimerState::Stopped;
    }

    fn finish_tc_timer(&mut self) {
        if self.tc_timer_state == TcTimerState::Running {
            Debug::TcTimerState("finishing").log();
            self.tc_timer_state = TcTimerState::Finishing;

            // Bump the ANSN so everyone notices, and run for a few more
            // ticks with an empty advertised set.
            self.tc_current_ansn = self.tc_current_ansn.wrapping_add(1);
            self.tc_timer_ticks_remaining = TC_FINISHING_TICKS;
        }
    }

    // Builds the next TC broadcast, if one is due.
    pub(crate) fn build_tc(&mut self, config: &InstanceCfg) -> Option<TcMessage> {
        if self.tc_timer_state == TcTimerState::Stopped {
            return None;
        }

        let mut neighbors = vec![];
        if self.tc_timer_state == TcTimerState::Running {
            let mut curr_ans_count = 0;
            let mut curr_ans_changes = 0;

            // Compute the Advertised Neighbor Set, according to the
            // current TC_REDUNDANCY mode.
            for nbr in self.neighbors.values_mut() {
                let was_advertised = nbr.is_advertised;
                let is_advertised = match config.tc_redundancy {
                    TcRedundancy::MprsIn => nbr.is_mpr_selector(),
                    TcRedundancy::MprsInOut => {
                        nbr.is_mpr_selector() || nbr.is_mpr
                    }
                    TcRedundancy::All => nbr.is_sym,
                };

                if was_advertised != is_advertised {
                    curr_ans_changes += 1;
                }
                if is_advertised {
                    curr_ans_count += 1;
                    neighbors.push(nbr.main_addr);
                }
                nbr.is_advertised = is_advertised;
            }

            // Deal with transitions to an empty advertised set.
            if curr_ans_count == 0 {
                if self.tc_previous_ans_count == 0 {
                    // The advertised set became empty before the first
                    // broadcast of this phase went out.
                    self.stop_tc_timer();
                    return None;
                } else {
                    self.finish_tc_timer();
                }
            }

            // A changed advertised set gets a new sequence number.
            if curr_ans_count > 0 && curr_ans_changes > 0 {
                self.tc_current_ansn = self.tc_current_ansn.wrapping_add(1);
            }
            self.tc_previous_ans_count = curr_ans_count;
        }

        let tc = TcMessage {
            ansn: self.tc_current_ansn,
            neighbors,
        };

        // Count down the finishing phase.
        if self.tc_timer_state == TcTimerState::Finishing {
            self.tc_timer_ticks_remaining -= 1;
            if self.tc_timer_ticks_remaining == 0 {
                self.stop_tc_timer();
            }
        }

        Some(tc)
    }

    // ===== HELLO population (RFC 3626, Section 6.1) =====

    // Lists every link on the given interface by its remote interface
    // address, and every neighbor reached through another interface by its
    // main address with an unspecified link type.
    pub(crate) fn populate_hello(
        &self,
        ifindex: u32,
    ) -> Vec<(LinkCode, Vec<Ipv4Addr>)> {
        let mut groups: BTreeMap<LinkCode, Vec<Ipv4Addr>> = BTreeMap::new();

        for link in self.links.values() {
            let Some(nbr) = self.neighbors.get(&link.neighbor_id) else {
                continue;
            };
            let (link_code, addr) = if link.ifindex == ifindex {
                (
                    LinkCode::new(nbr.neighbor_type(), link.link_type()),
                    link.remote_addr,
                )
            } else {
                (
                    LinkCode::new(nbr.neighbor_type(), LinkType::Unspec),
                    nbr.main_addr,
                )
            };
            groups.entry(link_code).or_default().push(addr);
        }

        groups.into_iter().collect()
    }

    // A node is an MPR iff its MPR selector set is non-empty.
    pub(crate) fn is_mpr(&self) -> bool {
        !self.mpr_selectors.is_empty()
    }

    // Stops all timers ahead of instance shutdown.
    pub(crate) fn stop(&mut self) {
        self.stop_tc_timer();
        *self = Neighborhood::new();
    }
}

impl Default for Neighborhood {
    fn default() -> Neighborhood {
        Neighborhood::new()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use velo_protocol::ProtocolInstance;

    use super::*;
    use crate::instance::Instance;
    use crate::packet::{WILL_DEFAULT, WILL_NEVER};

    fn test_channels() -> (
        ProtocolInputChannelsTx,
        crate::instance::ProtocolInputChannelsRx,
    ) {
        Instance::protocol_input_channels()
    }

    fn addr(a: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, a)
    }

    // Adds a symmetric neighbor with a single symmetric link.
    fn add_sym_neighbor(
        nh: &mut Neighborhood,
        tx: &ProtocolInputChannelsTx,
        config: &InstanceCfg,
        main_addr: Ipv4Addr,
        local_addr: Ipv4Addr,
        willingness: u8,
    ) -> NeighborId {
        let vtime = Duration::from_secs(6);
        let link_id = nh.update_link(tx, 1, main_addr, local_addr, vtime);
        let link = nh.links.get_mut(&link_id).unwrap();
        link.update_timers(
            vtime,
            true,
            LinkCode::new(NeighborType::Sym, LinkType::Sym),
            Duration::from_secs(6),
            tx,
        );
        nh.update_neighbor(
            tx, config, main_addr, link_id, willingness, false, vtime,
        )
    }

    #[test]
    fn link_state_progression() {
        let (tx, _rx) = test_channels();
        let config = InstanceCfg::default();
        let mut nh = Neighborhood::new();
        let local_addr = Ipv4Addr::new(192, 0, 2, 1);
        let remote_addr = Ipv4Addr::new(192, 0, 2, 2);
        let vtime = Duration::from_secs(6);

        // A HELLO that does not list our address produces an asymmetric
        // link.
        let hello = HelloMessage {
            htime: 0x05,
            willingness: WILL_DEFAULT,
            links: vec![],
        };
        nh.process_hello(
            &tx,
            &config,
            Duration::from_secs(6),
            1,
            remote_addr,
            local_addr,
            &[local_addr].into(),
            remote_addr,
            vtime,
            &hello,
        );
        assert_eq!(nh.links.len(), 1);
        let link = nh.links.values().next().unwrap();
        assert_eq!(link.link_type(), LinkType::Asym);
        let nbr = nh.neighbors.values().next().unwrap();
        assert!(!nbr.is_sym);

        // Once the neighbor echoes our address, the link becomes
        // symmetric.
        let hello = HelloMessage {
            htime: 0x05,
            willingness: WILL_DEFAULT,
            links: vec![(
                LinkCode::new(NeighborType::Sym, LinkType::Sym),
                vec![local_addr],
            )],
        };
        nh.process_hello(
            &tx,
            &config,
            Duration::from_secs(6),
            1,
            remote_addr,
            local_addr,
            &[local_addr].into(),
            remote_addr,
            vtime,
            &hello,
        );
        assert_eq!(nh.links.len(), 1);
        let link = nh.links.values().next().unwrap();
        assert_eq!(link.link_type(), LinkType::Sym);
        let nbr = nh.neighbors.values().next().unwrap();
        assert!(nbr.is_sym);

        // SYM timer expiry degrades the link back to asymmetric.
        let link_id = *nh.links.keys().next().unwrap();
        nh.process_link_sym_timer(&tx, link_id);
        let link = nh.links.values().next().unwrap();
        assert_eq!(link.link_type(), LinkType::Asym);
        let nbr = nh.neighbors.values().next().unwrap();
        assert!(!nbr.is_sym);

        // Dead timer expiry removes the link and its neighbor.
        nh.process_link_dead_timer(&tx, &config, link_id);
        assert!(nh.links.is_empty());
        assert!(nh.neighbors.is_empty());
    }

    #[test]
    fn mpr_selection() {
        let (tx, _rx) = test_channels();
        let config = InstanceCfg::default();
        let mut nh = Neighborhood::new();
        let local_addr = Ipv4Addr::new(192, 0, 2, 1);
        let vtime = Duration::from_secs(6);

        // N1 = {a, b, c}, all symmetric with default willingness.
        let a = add_sym_neighbor(
            &mut nh, &tx, &config, addr(1), local_addr, WILL_DEFAULT,
        );
        let b = add_sym_neighbor(
            &mut nh, &tx, &config, addr(2), local_addr, WILL_DEFAULT,
        );
        let c = add_sym_neighbor(
            &mut nh, &tx, &config, addr(3), local_addr, WILL_DEFAULT,
        );

        // N2 = {x via a; y via a and b; z via b and c}.
        let x = Ipv4Addr::new(10, 0, 1, 1);
        let y = Ipv4Addr::new(10, 0, 1, 2);
        let z = Ipv4Addr::new(10, 0, 1, 3);
        nh.update_twohop_link(&tx, a, x, 1, vtime);
        nh.update_twohop_link(&tx, a, y, 1, vtime);
        nh.update_twohop_link(&tx, b, y, 1, vtime);
        nh.update_twohop_link(&tx, b, z, 1, vtime);
        nh.update_twohop_link(&tx, c, z, 1, vtime);

        nh.recount_mpr_set(1);

        // a is the sole reacher of x; the degree tie-break picks b over c
        // to cover z.
        assert_eq!(nh.mpr_set, [a, b].into());

        // Coverage: x and z are covered once, y twice.
        let coverage = |addr| {
            nh.twohop_nodes
                .values()
                .find(|node| node.main_addr == addr)
                .unwrap()
                .coverage
        };
        assert_eq!(coverage(x), 1);
        assert_eq!(coverage(y), 2);
        assert_eq!(coverage(z), 1);

        // Minimality: neither a nor b can be withdrawn without uncovering
        // a strict two-hop neighbor.
        for nbr_id in [a, b] {
            assert!(nh.is_essential_mpr(nbr_id, 1));
        }
    }

    #[test]
    fn mpr_never_willing_excluded() {
        let (tx, _rx) = test_channels();
        let config = InstanceCfg::default();
        let mut nh = Neighborhood::new();
        let local_addr = Ipv4Addr::new(192, 0, 2, 1);
        let vtime = Duration::from_secs(6);

        let a = add_sym_neighbor(
            &mut nh, &tx, &config, addr(1), local_addr, WILL_NEVER,
        );
        let x = Ipv4Addr::new(10, 0, 1, 1);
        nh.update_twohop_link(&tx, a, x, 1, vtime);

        nh.recount_mpr_set(1);

        // A neighbor which will never forward is not selected, leaving the
        // two-hop neighbor uncovered.
        assert!(nh.mpr_set.is_empty());
    }

    #[test]
    fn twohop_strictness() {
        let (tx, _rx) = test_channels();
        let config = InstanceCfg::default();
        let mut nh = Neighborhood::new();
        let local_addr = Ipv4Addr::new(192, 0, 2, 1);
        let vtime = Duration::from_secs(6);

        let a = add_sym_neighbor(
            &mut nh, &tx, &config, addr(1), local_addr, WILL_DEFAULT,
        );

        // A two-hop node that is not a one-hop neighbor is strict.
        nh.update_twohop_link(&tx, a, addr(2), 1, vtime);
        assert!(nh.twohop_nodes.values().next().unwrap().is_strict);

        // Learning the node as a one-hop neighbor clears the strict flag.
        let b = add_sym_neighbor(
            &mut nh, &tx, &config, addr(2), local_addr, WILL_DEFAULT,
        );
        assert!(!nh.twohop_nodes.values().next().unwrap().is_strict);

        // Losing the last link to the neighbor restores it.
        let link_ids =
            nh.neighbors[&b].links.iter().copied().collect::<Vec<_>>();
        for link_id in link_ids {
            nh.delete_link(&tx, &config, link_id);
        }
        assert!(nh.twohop_nodes.values().next().unwrap().is_strict);
    }

    #[test]
    fn tc_origination_window() {
        let (tx, _rx) = test_channels();
        let config = InstanceCfg::default();
        let mut nh = Neighborhood::new();
        let local_addr = Ipv4Addr::new(192, 0, 2, 1);
        let vtime = Duration::from_secs(6);

        // With no MPR selectors, no TCs are originated.
        assert_eq!(nh.tc_timer_state, TcTimerState::Stopped);
        assert!(nh.build_tc(&config).is_none());

        // A neighbor selecting us as MPR starts the TC timer.
        let link_id =
            nh.update_link(&tx, 1, addr(1), local_addr, vtime);
        let nbr_id = nh.update_neighbor(
            &tx,
            &config,
            addr(1),
            link_id,
            WILL_DEFAULT,
            true,
            vtime,
        );
        assert_eq!(nh.tc_timer_state, TcTimerState::Running);

        let tc = nh.build_tc(&config).unwrap();
        assert_eq!(tc.neighbors, vec![addr(1)]);
        assert_eq!(tc.ansn, 1);

        // When the selector expires, the timer enters the finishing phase:
        // a bumped ANSN and an empty advertised set for three broadcasts.
        nh.process_mpr_selector_timer(&tx, &config, nbr_id);
        assert_eq!(nh.tc_timer_state, TcTimerState::Finishing);
        for _ in 0..3 {
            let tc = nh.build_tc(&config).unwrap();
            assert!(tc.neighbors.is_empty());
            assert_eq!(tc.ansn, 2);
        }
        assert_eq!(nh.tc_timer_state, TcTimerState::Stopped);
        assert!(nh.build_tc(&config).is_none());
    }
}
