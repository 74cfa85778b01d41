//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// The topology manager holds the Topology Control (TC) and Multiple
// Interface Declaration (MID) databases learned from flooded broadcasts.
// Entries are validated against the per-origin Advertised Neighbor
// Sequence Number and expire with the validity time they were received
// with (RFC 3626, Sections 5.4 and 9.5).
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use velo_utils::task::TimeoutTask;

use crate::debug::Debug;
use crate::instance::ProtocolInputChannelsTx;
use crate::tasks;

// Entity identifiers.
pub type TopologyId = u32;
pub type MidEntryId = u32;

#[derive(Debug)]
pub struct TopologyEntry {
    pub id: TopologyId,
    // Advertised (destination) address.
    pub dest_addr: Ipv4Addr,
    // Main address of the node that advertised the destination.
    pub lasthop_addr: Ipv4Addr,
    // Distance from this node, in hops.
    pub distance: u16,
    // ANSN the entry was last advertised with.
    pub seqno: u16,
    // Expiry timer.
    pub expiry_timer: Option<TimeoutTask>,
}

#[derive(Debug)]
pub struct MidEntry {
    pub id: MidEntryId,
    // Main address of the origin.
    pub main_addr: Ipv4Addr,
    // Additional interface address of the origin.
    pub iface_addr: Ipv4Addr,
    // Distance from this node, in hops.
    pub distance: u16,
    // Expiry timer.
    pub expiry_timer: Option<TimeoutTask>,
}

#[derive(Debug, Default)]
pub struct TopologyManager {
    // TC database.
    pub topology: BTreeMap<TopologyId, TopologyEntry>,
    tc_destinations: BTreeMap<Ipv4Addr, BTreeSet<TopologyId>>,
    tc_lasthops: BTreeMap<Ipv4Addr, BTreeSet<TopologyId>>,
    tc_distances: BTreeMap<u16, BTreeSet<TopologyId>>,
    next_topology_id: TopologyId,
    // Highest ANSN seen from each origin.
    tc_last_ansn: BTreeMap<Ipv4Addr, u16>,
    // Final ANSN advertised by origins with an empty neighbor set.
    pub tc_final_seqnos: BTreeMap<Ipv4Addr, u16>,
    // MID database.
    pub mids: BTreeMap<MidEntryId, MidEntry>,
    mid_by_iface_addr: BTreeMap<Ipv4Addr, MidEntryId>,
    next_mid_id: MidEntryId,
}

// ===== impl TopologyManager =====

impl TopologyManager {
    // ===== TC processing (RFC 3626, Section 9.5) =====

    // Validates the ANSN of a received TC message, discarding every
    // recorded entry the origin no longer advertises. Returns false if the
    // message was received out of order and must be ignored.
    pub(crate) fn apply_tc_ansn(
        &mut self,
        ansn: u16,
        origin: Ipv4Addr,
    ) -> bool {
        if let Some(last_ansn) = self.tc_last_ansn.get(&origin)
            && is_seq_newer(*last_ansn, ansn)
        {
            // The TC message was received out of order.
            return false;
        }

        // Remove every topology entry from this origin with an older
        // sequence number.
        let stale = self
            .tc_lasthops
            .get(&origin)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        is_seq_newer(ansn, self.topology[id].seqno)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for id in stale {
            self.delete_tc_entry(id);
        }

        self.tc_last_ansn.insert(origin, ansn);
        true
    }

    // Creates or refreshes the topology entry for (dest, origin).
    pub(crate) fn update_tc_entry(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        dest_addr: Ipv4Addr,
        lasthop_addr: Ipv4Addr,
        distance: u16,
        ansn: u16,
        vtime: Duration,
    ) {
        let id = self
            .tc_destinations
            .get(&dest_addr)
            .and_then(|ids| {
                ids.iter()
                    .copied()
                    .find(|id| self.topology[id].lasthop_addr == lasthop_addr)
            });

        let id = match id {
            Some(id) => {
                // Refresh the entry, keeping the distance index current.
                let entry = self.topology.get_mut(&id).unwrap();
                if entry.distance != distance {
                    let old_distance = entry.distance;
                    entry.distance = distance;
                    if let Some(ids) = self.tc_distances.get_mut(&old_distance)
                    {
                        ids.remove(&id);
                        if ids.is_empty() {
                            self.tc_distances.remove(&old_distance);
                        }
                    }
                    self.tc_distances.entry(distance).or_default().insert(id);
                }
                let entry = self.topology.get_mut(&id).unwrap();
                entry.seqno = ansn;
                id
            }
            None => {
                let id = self.next_topology_id;
                self.next_topology_id += 1;
                Debug::TcEntryCreate(&dest_addr, &lasthop_addr, distance)
                    .log();

                self.topology.insert(
                    id,
                    TopologyEntry {
                        id,
                        dest_addr,
                        lasthop_addr,
                        distance,
                        seqno: ansn,
                        expiry_timer: None,
                    },
                );
                self.tc_destinations
                    .entry(dest_addr)
                    .or_default()
                    .insert(id);
                self.tc_lasthops
                    .entry(lasthop_addr)
                    .or_default()
                    .insert(id);
                self.tc_distances.entry(distance).or_default().insert(id);
                id
            }
        };

        // Reception refreshes the expiry timer.
        let entry = self.topology.get_mut(&id).unwrap();
        entry.expiry_timer =
            Some(tasks::tc_entry_timer(id, vtime, &tx.tc_entry_timer));
    }

    pub(crate) fn delete_tc_entry(&mut self, id: TopologyId) {
        let Some(entry) = self.topology.remove(&id) else {
            return;
        };
        Debug::TcEntryDelete(&entry.dest_addr, &entry.lasthop_addr).log();

        for (key, index) in [
            (entry.dest_addr, &mut self.tc_destinations),
            (entry.lasthop_addr, &mut self.tc_lasthops),
        ] {
            if let Some(ids) = index.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    index.remove(&key);
                }
            }
        }
        if let Some(ids) = self.tc_distances.get_mut(&entry.distance) {
            ids.remove(&id);
            if ids.is_empty() {
                self.tc_distances.remove(&entry.distance);
            }
        }
    }

    // Remembers (or clears) the final ANSN advertised with an empty
    // neighbor set.
    pub(crate) fn update_final_seqno(
        &mut self,
        origin: Ipv4Addr,
        ansn: u16,
        ans_is_empty: bool,
    ) {
        self.tc_final_seqnos.remove(&origin);
        if ans_is_empty {
            self.tc_final_seqnos.insert(origin, ansn);
        }
    }

    pub(crate) fn process_tc_entry_timer(&mut self, id: TopologyId) {
        self.delete_tc_entry(id);
    }

    // ===== MID processing (RFC 3626, Section 5.4) =====

    // Creates or refreshes a MID entry for an additional interface address
    // of the origin.
    pub(crate) fn update_mid_entry(
        &mut self,
        tx: &ProtocolInputChannelsTx,
        main_addr: Ipv4Addr,
        iface_addr: Ipv4Addr,
        distance: u16,
        vtime: Duration,
    ) {
        let id = match self.mid_by_iface_addr.get(&iface_addr) {
            Some(id) => {
                let entry = self.mids.get_mut(id).unwrap();
                entry.main_addr = main_addr;
                entry.distance = distance;
                *id
            }
            None => {
                let id = self.next_mid_id;
                self.next_mid_id += 1;

                self.mids.insert(
                    id,
                    MidEntry {
                        id,
                        main_addr,
                        iface_addr,
                        distance,
                        expiry_timer: None,
                    },
                );
                self.mid_by_iface_addr.insert(iface_addr, id);
                id
            }
        };

        let entry = self.mids.get_mut(&id).unwrap();
        entry.expiry_timer =
            Some(tasks::mid_entry_timer(id, vtime, &tx.mid_entry_timer));
    }

    pub(crate) fn delete_mid_entry(&mut self, id: MidEntryId) {
        if let Some(entry) = self.mids.remove(&id) {
            self.mid_by_iface_addr.remove(&entry.iface_addr);
        }
    }

    pub(crate) fn process_mid_entry_timer(&mut self, id: MidEntryId) {
        self.delete_mid_entry(id);
    }

    // Resolves a MID interface address to the main address of its owner.
    pub(crate) fn resolve_main_addr(&self, addr: Ipv4Addr) -> Ipv4Addr {
        self.mid_by_iface_addr
            .get(&addr)
            .and_then(|id| self.mids.get(id))
            .map(|entry| entry.main_addr)
            .unwrap_or(addr)
    }

    // ===== route computation input (RFC 3626, Section 10) =====

    // Walks the TC database in ascending distance order, offering each
    // entry to the route manager. Entries closer than two hops are covered
    // by the neighborhood; the walk stops as soon as a distance layer
    // contributes no new edge.
    pub(crate) fn push_topology<F>(&self, mut add_tc_link: F)
    where
        F: FnMut(&TopologyEntry) -> bool,
    {
        for (distance, ids) in self.tc_distances.iter() {
            if *distance < 2 {
                continue;
            }

            let mut added = 0;
            for id in ids {
                if add_tc_link(&self.topology[id]) {
                    added += 1;
                }
            }
            if added == 0 {
                break;
            }
        }
    }

    // Stops all timers ahead of instance shutdown.
    pub(crate) fn stop(&mut self) {
        *self = TopologyManager::default();
    }
}

// ===== global functions =====

// Sequence number comparison with wrap-around (RFC 3626, Section 19).
pub(crate) fn is_seq_newer(s1: u16, s2: u16) -> bool {
    (s1 > s2 && s1 - s2 <= 32768) || (s2 > s1 && s2 - s1 > 32768)
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use velo_protocol::ProtocolInstance;

    use super::*;
    use crate::instance::Instance;

    #[test]
    fn seqno_comparison() {
        assert!(is_seq_newer(2, 1));
        assert!(!is_seq_newer(1, 2));
        assert!(!is_seq_newer(1, 1));
        // Wrap-around.
        assert!(is_seq_newer(0, 65535));
        assert!(!is_seq_newer(65535, 0));
        assert!(is_seq_newer(10, 65000));
    }

    #[test]
    fn ansn_validation() {
        let (tx, _rx) = Instance::protocol_input_channels();
        let mut topology = TopologyManager::default();
        let origin = Ipv4Addr::new(192, 0, 2, 1);
        let dest1 = Ipv4Addr::new(192, 0, 2, 2);
        let dest2 = Ipv4Addr::new(192, 0, 2, 3);
        let vtime = Duration::from_secs(15);

        // Two destinations advertised with ANSN 1.
        assert!(topology.apply_tc_ansn(1, origin));
        topology.update_tc_entry(&tx, dest1, origin, 2, 1, vtime);
        topology.update_tc_entry(&tx, dest2, origin, 2, 1, vtime);
        assert_eq!(topology.topology.len(), 2);

        // A newer TC advertising one destination supersedes both old
        // entries.
        assert!(topology.apply_tc_ansn(2, origin));
        topology.update_tc_entry(&tx, dest1, origin, 2, 2, vtime);
        assert_eq!(topology.topology.len(), 1);
        assert!(
            topology
                .topology
                .values()
                .all(|entry| entry.seqno == 2 && entry.dest_addr == dest1)
        );

        // An out-of-order TC is rejected.
        assert!(!topology.apply_tc_ansn(1, origin));
    }

    #[test]
    fn topology_push_order() {
        let (tx, _rx) = Instance::protocol_input_channels();
        let mut topology = TopologyManager::default();
        let vtime = Duration::from_secs(15);
        let a = Ipv4Addr::new(192, 0, 2, 1);
        let b = Ipv4Addr::new(192, 0, 2, 2);
        let c = Ipv4Addr::new(192, 0, 2, 3);
        let d = Ipv4Addr::new(192, 0, 2, 4);

        // Edges at distances 2 and 3, plus one at distance 1 which is
        // already covered by the neighborhood.
        topology.apply_tc_ansn(1, a);
        topology.update_tc_entry(&tx, a, d, 1, 1, vtime);
        topology.update_tc_entry(&tx, b, a, 2, 1, vtime);
        topology.update_tc_entry(&tx, c, b, 3, 1, vtime);

        let mut pushed = vec![];
        topology.push_topology(|entry| {
            pushed.push((entry.dest_addr, entry.lasthop_addr, entry.distance));
            true
        });
        assert_eq!(pushed, vec![(b, a, 2), (c, b, 3)]);

        // The walk stops at the first layer that contributes nothing.
        let mut pushed = vec![];
        topology.push_topology(|entry| {
            pushed.push(entry.distance);
            false
        });
        assert_eq!(pushed, vec![2]);
    }
}
