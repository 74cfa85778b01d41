//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use velo_utils::task::TimeoutTask;

use crate::instance::ProtocolInputChannelsTx;
use crate::neighborhood::{LinkId, NeighborId};
use crate::packet::{LinkCode, LinkType};
use crate::tasks;

/// Logical link used to reach a directly reachable neighbor.
///
/// Links are created and refreshed through the exchange of HELLO messages;
/// the three link-state timers together encode the advertised link type
/// (RFC 3626, Section 7.1.1).
#[derive(Debug)]
pub struct LogicalLink {
    pub id: LinkId,
    // Local interface where the link resides.
    pub ifindex: u32,
    // Protocol addresses of the two link endpoints.
    pub local_addr: Ipv4Addr,
    pub remote_addr: Ipv4Addr,
    // The neighbor at the far end of the link.
    pub neighbor_id: NeighborId,
    // Link-state timers.
    pub sym_timer: Option<TimeoutTask>,
    pub asym_timer: Option<TimeoutTask>,
    pub lost_timer: Option<TimeoutTask>,
    pub dead_timer: Option<TimeoutTask>,
    // The link was heard but is not usable yet.
    pub is_pending: bool,
    // ETX measurements (unused by the current MPR computation).
    pub near_etx: f64,
    pub far_etx: f64,
}

// ===== impl LogicalLink =====

impl LogicalLink {
    pub(crate) fn new(
        id: LinkId,
        ifindex: u32,
        remote_addr: Ipv4Addr,
        local_addr: Ipv4Addr,
        vtime: Duration,
        tx: &ProtocolInputChannelsTx,
    ) -> LogicalLink {
        // The SYM timer is not yet scheduled, for the link is not yet
        // symmetric; the ASYM timer will be scheduled by the first call to
        // update_timers().
        LogicalLink {
            id,
            ifindex,
            local_addr,
            remote_addr,
            neighbor_id: 0,
            sym_timer: None,
            asym_timer: None,
            lost_timer: None,
            dead_timer: Some(tasks::link_dead_timer(
                id,
                vtime,
                &tx.link_dead_timer,
            )),
            is_pending: false,
            near_etx: 0.0,
            far_etx: 0.0,
        }
    }

    /// Updates the link timers based on the information present in a HELLO
    /// message (RFC 3626, Section 7.1.1, rule 2).
    pub(crate) fn update_timers(
        &mut self,
        vtime: Duration,
        saw_self: bool,
        link_code: LinkCode,
        neighbor_hold_time: Duration,
        tx: &ProtocolInputChannelsTx,
    ) {
        // 2.1: L_ASYM_time = current time + validity time.
        self.asym_timer =
            Some(tasks::link_asym_timer(self.id, vtime, &tx.link_asym_timer));

        let mut dead_time = self
            .dead_timer
            .as_ref()
            .map(|timer| timer.remaining())
            .unwrap_or(Duration::ZERO);

        // If our own address appears in a link tuple of the message, the
        // link with the neighbor may now be symmetric.
        if saw_self {
            if link_code.is_lost_link() {
                // 2.2.1: L_SYM_time = current time - 1 (i.e., expired).
                self.sym_timer = None;
            } else if link_code.is_sym_link() || link_code.is_asym_link() {
                // 2.2.2: L_SYM_time = current time + validity time,
                //        L_time = L_SYM_time + NEIGHB_HOLD_TIME.
                self.sym_timer = Some(tasks::link_sym_timer(
                    self.id,
                    vtime,
                    &tx.link_sym_timer,
                ));
                dead_time = dead_time.max(vtime + neighbor_hold_time);
            }
        }

        // 2.3: L_time = max(L_time, L_ASYM_time). A link losing its
        // symmetry must still be advertised for at least `vtime`, so
        // neighbors can detect the breakage.
        dead_time = dead_time.max(vtime);
        self.dead_timer = Some(tasks::link_dead_timer(
            self.id,
            dead_time,
            &tx.link_dead_timer,
        ));
    }

    /// Derives the advertised link type from the running timers
    /// (RFC 3626, Sections 6.2 and 14.2).
    pub(crate) fn link_type(&self) -> LinkType {
        if self.lost_timer.is_some() {
            return LinkType::Lost;
        }

        if self.sym_timer.is_some() {
            LinkType::Sym
        } else if self.asym_timer.is_some() {
            LinkType::Asym
        } else {
            LinkType::Lost
        }
    }

    pub(crate) fn is_sym(&self) -> bool {
        self.link_type() == LinkType::Sym
    }
}
