//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use velo_protocol::{
    InstanceChannelsTx, InstanceShared, MessageReceiver, ProtocolInstance,
};
use velo_utils::ibus::IbusMsg;
use velo_utils::ip::AddressFamily;
use velo_utils::protocol::Protocol;
use velo_utils::task::{IntervalTask, TimeoutTask};

use crate::config::InstanceCfg;
use crate::debug::{Debug, InstanceInactiveReason, InterfaceInactiveReason};
use crate::error::Error;
use crate::interface::Interface;
use crate::neighborhood::Neighborhood;
use crate::route::Route;
use crate::tasks::messages::input::{
    DupTimerMsg, HelloIntervalMsg, LinkTimerMsg, MidEntryTimerMsg,
    MidIntervalMsg, MprRecountMsg, MprSelectorTimerMsg, NetRxPacketMsg,
    RouteUpdateMsg, TcEntryTimerMsg, TcIntervalMsg, TwoHopDeadTimerMsg,
};
use crate::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};
use crate::topology::TopologyManager;
use crate::{events, ibus};

#[derive(Debug)]
pub struct Instance {
    // Instance name.
    pub name: String,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance interfaces.
    pub interfaces: BTreeMap<String, Interface>,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx<Instance>,
    // Shared data.
    pub shared: InstanceShared,
}

#[derive(Debug)]
pub struct InstanceState {
    // Message sequence number of the last originated message.
    pub msg_seqno: u16,
    // Links, neighbors, two-hop neighborhood, MPR and TC origination
    // state.
    pub neighborhood: Neighborhood,
    // TC and MID databases.
    pub topology: TopologyManager,
    // Computed routes, by host destination.
    pub routes: BTreeMap<Ipv4Addr, Route>,
    // Duplicate set for flooded messages.
    pub dup_set: BTreeMap<(Ipv4Addr, u16), DupTuple>,
    // Coalesced route recomputation request.
    pub route_update_scheduled: bool,
    // Periodic MID emission; running only while more than one interface
    // is active.
    pub mid_interval_task: Option<IntervalTask>,
    // Message statistics.
    pub statistics: Statistics,
}

// An entry of the duplicate set (RFC 3626, Section 3.4).
#[derive(Debug)]
pub struct DupTuple {
    // Whether the message has already been retransmitted.
    pub retransmitted: bool,
    // Expiry timer.
    pub _timer: TimeoutTask,
}

#[derive(Debug, Default)]
pub struct Statistics {
    pub discontinuity_time: DateTime<Utc>,
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
    pub errors: ErrorStatistics,
}

#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub total: u64,
    pub hello: u64,
    pub tc: u64,
    pub mid: u64,
}

#[derive(Debug, Default)]
pub struct ErrorStatistics {
    pub total: u64,
    pub decode: u64,
    pub non_neighbor: u64,
    pub duplicate: u64,
}

pub struct InstanceUpView<'a> {
    pub name: &'a str,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx<Instance>,
    pub shared: &'a InstanceShared,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg>,
    // HELLO emission interval.
    pub hello_interval: Sender<HelloIntervalMsg>,
    // TC emission interval.
    pub tc_interval: Sender<TcIntervalMsg>,
    // MID emission interval.
    pub mid_interval: Sender<MidIntervalMsg>,
    // Link-state timers.
    pub link_sym_timer: Sender<LinkTimerMsg>,
    pub link_asym_timer: Sender<LinkTimerMsg>,
    pub link_dead_timer: Sender<LinkTimerMsg>,
    // MPR selector expiry.
    pub mpr_selector_timer: Sender<MprSelectorTimerMsg>,
    // Two-hop link expiry.
    pub twohop_dead_timer: Sender<TwoHopDeadTimerMsg>,
    // Topology entry expiry.
    pub tc_entry_timer: Sender<TcEntryTimerMsg>,
    // MID entry expiry.
    pub mid_entry_timer: Sender<MidEntryTimerMsg>,
    // Duplicate set entry expiry.
    pub dup_timer: Sender<DupTimerMsg>,
    // Coalesced background work.
    pub mpr_recount: UnboundedSender<MprRecountMsg>,
    pub route_update: UnboundedSender<RouteUpdateMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    pub net_packet_rx: Receiver<NetRxPacketMsg>,
    pub hello_interval: Receiver<HelloIntervalMsg>,
    pub tc_interval: Receiver<TcIntervalMsg>,
    pub mid_interval: Receiver<MidIntervalMsg>,
    pub link_sym_timer: Receiver<LinkTimerMsg>,
    pub link_asym_timer: Receiver<LinkTimerMsg>,
    pub link_dead_timer: Receiver<LinkTimerMsg>,
    pub mpr_selector_timer: Receiver<MprSelectorTimerMsg>,
    pub twohop_dead_timer: Receiver<TwoHopDeadTimerMsg>,
    pub tc_entry_timer: Receiver<TcEntryTimerMsg>,
    pub mid_entry_timer: Receiver<MidEntryTimerMsg>,
    pub dup_timer: Receiver<DupTimerMsg>,
    pub mpr_recount: UnboundedReceiver<MprRecountMsg>,
    pub route_update: UnboundedReceiver<RouteUpdateMsg>,
}

// ===== impl Instance =====

impl Instance {
    // Checks if the instance needs to be started or stopped in response to
    // an ibus event.
    pub(crate) fn update(&mut self) {
        match self.is_ready() {
            Ok(()) if !self.is_active() => {
                self.start();
            }
            Err(reason) if self.is_active() => {
                self.stop(reason);
            }
            _ => (),
        }
    }

    fn start(&mut self) {
        Debug::InstanceStart.log();

        self.state = Some(InstanceState::new());
        let (mut instance, interfaces) = self.as_up().unwrap();

        // Try to start interfaces.
        for iface in interfaces.values_mut() {
            iface.update(&mut instance);
        }
    }

    fn stop(&mut self, reason: InstanceInactiveReason) {
        if !self.is_active() {
            return;
        }

        Debug::InstanceStop(reason).log();

        // Stop interfaces and withdraw all learned state.
        let (mut instance, interfaces) = self.as_up().unwrap();
        for iface in interfaces.values_mut() {
            iface.stop(&mut instance, InterfaceInactiveReason::InstanceDown);
        }
        events::uninstall_all_routes(&mut instance);
        instance.state.neighborhood.stop();
        instance.state.topology.stop();

        self.state = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn is_ready(&self) -> Result<(), InstanceInactiveReason> {
        if !self.config.enabled {
            return Err(InstanceInactiveReason::AdminDown);
        }

        Ok(())
    }

    // Returns a view struct for the instance if it's operational.
    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut BTreeMap<String, Interface>)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                name: &self.name,
                config: &self.config,
                state,
                tx: &self.tx,
                shared: &self.shared,
            };
            Some((instance, &mut self.interfaces))
        } else {
            None
        }
    }
}

impl ProtocolInstance for Instance {
    const PROTOCOL: Protocol = Protocol::OLSR;

    type ProtocolInputMsg = ProtocolInputMsg;
    type ProtocolOutputMsg = ProtocolOutputMsg;
    type ProtocolInputChannelsTx = ProtocolInputChannelsTx;
    type ProtocolInputChannelsRx = ProtocolInputChannelsRx;

    fn new(
        name: String,
        shared: InstanceShared,
        tx: InstanceChannelsTx<Instance>,
    ) -> Instance {
        Debug::InstanceCreate.log();

        Instance {
            name,
            config: Default::default(),
            state: None,
            interfaces: Default::default(),
            tx,
            shared,
        }
    }

    fn init(&mut self) {
        // Subscribe to the interface manager.
        self.tx
            .ibus
            .interface_sub(None, Some(AddressFamily::Ipv4));

        self.update();
    }

    fn shutdown(mut self) {
        // Ensure instance is disabled before exiting.
        self.stop(InstanceInactiveReason::AdminDown);
        Debug::InstanceDelete.log();
    }

    fn process_ibus_msg(&mut self, msg: IbusMsg) {
        if let Err(error) = process_ibus_msg(self, msg) {
            error.log();
        }
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        let Some((mut instance, interfaces)) = self.as_up() else {
            return;
        };

        if let Err(error) = process_protocol_msg(&mut instance, interfaces, msg)
        {
            error.log();
        }
    }

    fn protocol_input_channels()
    -> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
        let (net_packet_rxp, net_packet_rxc) = mpsc::channel(4);
        let (hello_intervalp, hello_intervalc) = mpsc::channel(4);
        let (tc_intervalp, tc_intervalc) = mpsc::channel(4);
        let (mid_intervalp, mid_intervalc) = mpsc::channel(4);
        let (link_sym_timerp, link_sym_timerc) = mpsc::channel(4);
        let (link_asym_timerp, link_asym_timerc) = mpsc::channel(4);
        let (link_dead_timerp, link_dead_timerc) = mpsc::channel(4);
        let (mpr_selector_timerp, mpr_selector_timerc) = mpsc::channel(4);
        let (twohop_dead_timerp, twohop_dead_timerc) = mpsc::channel(4);
        let (tc_entry_timerp, tc_entry_timerc) = mpsc::channel(4);
        let (mid_entry_timerp, mid_entry_timerc) = mpsc::channel(4);
        let (dup_timerp, dup_timerc) = mpsc::channel(4);
        let (mpr_recountp, mpr_recountc) = mpsc::unbounded_channel();
        let (route_updatep, route_updatec) = mpsc::unbounded_channel();

        let tx = ProtocolInputChannelsTx {
            net_packet_rx: net_packet_rxp,
            hello_interval: hello_intervalp,
            tc_interval: tc_intervalp,
            mid_interval: mid_intervalp,
            link_sym_timer: link_sym_timerp,
            link_asym_timer: link_asym_timerp,
            link_dead_timer: link_dead_timerp,
            mpr_selector_timer: mpr_selector_timerp,
            twohop_dead_timer: twohop_dead_timerp,
            tc_entry_timer: tc_entry_timerp,
            mid_entry_timer: mid_entry_timerp,
            dup_timer: dup_timerp,
            mpr_recount: mpr_recountp,
            route_update: route_updatep,
        };
        let rx = ProtocolInputChannelsRx {
            net_packet_rx: net_packet_rxc,
            hello_interval: hello_intervalc,
            tc_interval: tc_intervalc,
            mid_interval: mid_intervalc,
            link_sym_timer: link_sym_timerc,
            link_asym_timer: link_asym_timerc,
            link_dead_timer: link_dead_timerc,
            mpr_selector_timer: mpr_selector_timerc,
            twohop_dead_timer: twohop_dead_timerc,
            tc_entry_timer: tc_entry_timerc,
            mid_entry_timer: mid_entry_timerc,
            dup_timer: dup_timerc,
            mpr_recount: mpr_recountc,
            route_update: route_updatec,
        };

        (tx, rx)
    }

    #[cfg(feature = "testing")]
    fn test_dir() -> String {
        format!("{}/tests/conformance", env!("CARGO_MANIFEST_DIR"))
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new() -> InstanceState {
        InstanceState {
            msg_seqno: 0,
            neighborhood: Neighborhood::new(),
            topology: TopologyManager::default(),
            routes: Default::default(),
            dup_set: Default::default(),
            route_update_scheduled: false,
            mid_interval_task: None,
            statistics: Default::default(),
        }
    }

    // Returns the next message sequence number.
    pub(crate) fn next_msg_seqno(&mut self) -> u16 {
        self.msg_seqno = self.msg_seqno.wrapping_add(1);
        self.msg_seqno
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl MessageReceiver<ProtocolInputMsg> for ProtocolInputChannelsRx {
    async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.hello_interval.recv() => {
                msg.map(ProtocolInputMsg::HelloInterval)
            }
            msg = self.tc_interval.recv() => {
                msg.map(ProtocolInputMsg::TcInterval)
            }
            msg = self.mid_interval.recv() => {
                msg.map(ProtocolInputMsg::MidInterval)
            }
            msg = self.link_sym_timer.recv() => {
                msg.map(ProtocolInputMsg::LinkSymTimer)
            }
            msg = self.link_asym_timer.recv() => {
                msg.map(ProtocolInputMsg::LinkAsymTimer)
            }
            msg = self.link_dead_timer.recv() => {
                msg.map(ProtocolInputMsg::LinkDeadTimer)
            }
            msg = self.mpr_selector_timer.recv() => {
                msg.map(ProtocolInputMsg::MprSelectorTimer)
            }
            msg = self.twohop_dead_timer.recv() => {
                msg.map(ProtocolInputMsg::TwoHopDeadTimer)
            }
            msg = self.tc_entry_timer.recv() => {
                msg.map(ProtocolInputMsg::TcEntryTimer)
            }
            msg = self.mid_entry_timer.recv() => {
                msg.map(ProtocolInputMsg::MidEntryTimer)
            }
            msg = self.dup_timer.recv() => {
                msg.map(ProtocolInputMsg::DupTimer)
            }
            msg = self.mpr_recount.recv() => {
                msg.map(ProtocolInputMsg::MprRecount)
            }
            msg = self.route_update.recv() => {
                msg.map(ProtocolInputMsg::RouteUpdate)
            }
        }
    }
}

// ===== helper functions =====

fn process_ibus_msg(
    instance: &mut Instance,
    msg: IbusMsg,
) -> Result<(), Error> {
    match msg {
        // Interface update notification.
        IbusMsg::InterfaceUpd(msg) => {
            ibus::rx::process_iface_update(instance, msg);
        }
        // Interface delete notification.
        IbusMsg::InterfaceDel(ifname) => {
            ibus::rx::process_iface_del(instance, ifname);
        }
        // Interface address addition notification.
        IbusMsg::InterfaceAddressAdd(msg) => {
            ibus::rx::process_addr_add(instance, msg);
        }
        // Interface address delete notification.
        IbusMsg::InterfaceAddressDel(msg) => {
            ibus::rx::process_addr_del(instance, msg);
        }
        // Ignore other events.
        _ => {}
    }

    Ok(())
}

fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut BTreeMap<String, Interface>,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Received network packet.
        ProtocolInputMsg::NetRxPacket(msg) => {
            events::process_packet(
                instance,
                interfaces,
                msg.ifindex,
                msg.src,
                msg.packet,
            )?;
        }
        // Time to send a HELLO on the interface.
        ProtocolInputMsg::HelloInterval(msg) => {
            events::process_hello_interval(instance, interfaces, msg.ifindex);
        }
        // Time to send a TC broadcast.
        ProtocolInputMsg::TcInterval(_msg) => {
            events::process_tc_interval(instance, interfaces);
        }
        // Time to send a MID broadcast.
        ProtocolInputMsg::MidInterval(_msg) => {
            events::process_mid_interval(instance, interfaces);
        }
        // Link-state timer expiries.
        ProtocolInputMsg::LinkSymTimer(msg) => {
            events::process_link_sym_timer(instance, msg.link_id);
        }
        ProtocolInputMsg::LinkAsymTimer(msg) => {
            events::process_link_asym_timer(instance, msg.link_id);
        }
        ProtocolInputMsg::LinkDeadTimer(msg) => {
            events::process_link_dead_timer(instance, msg.link_id);
        }
        // MPR selector expiry.
        ProtocolInputMsg::MprSelectorTimer(msg) => {
            events::process_mpr_selector_timer(instance, msg.neighbor_id);
        }
        // Two-hop link expiry.
        ProtocolInputMsg::TwoHopDeadTimer(msg) => {
            events::process_twohop_dead_timer(instance, msg.twohop_link_id);
        }
        // Topology entry expiry.
        ProtocolInputMsg::TcEntryTimer(msg) => {
            events::process_tc_entry_timer(instance, msg.topology_id);
        }
        // MID entry expiry.
        ProtocolInputMsg::MidEntryTimer(msg) => {
            events::process_mid_entry_timer(instance, msg.mid_id);
        }
        // Duplicate set entry expiry.
        ProtocolInputMsg::DupTimer(msg) => {
            events::process_dup_timer(instance, msg.origin, msg.seqno);
        }
        // Coalesced MPR recount.
        ProtocolInputMsg::MprRecount(_msg) => {
            events::process_mpr_recount(instance);
        }
        // Coalesced route recomputation.
        ProtocolInputMsg::RouteUpdate(_msg) => {
            events::process_route_update(instance);
        }
    }

    Ok(())
}
