//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use tokio::sync::mpsc;
use velo_utils::UnboundedSender;
use velo_utils::socket::UdpSocket;
use velo_utils::southbound::InterfaceFlags;
use velo_utils::task::{IntervalTask, Task};

use crate::config::InterfaceCfg;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, IoError};
use crate::instance::InstanceUpView;
use crate::packet::Packet;
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::{network, output};

#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

#[derive(Debug, Default)]
pub struct InterfaceSys {
    pub flags: InterfaceFlags,
    pub ifindex: Option<u32>,
    pub mtu: Option<u32>,
    pub addr_list: BTreeSet<Ipv4Network>,
}

#[derive(Debug, Default)]
pub struct InterfaceState {
    pub active: bool,
    // UDP socket and Tx/Rx tasks.
    pub net: Option<InterfaceNet>,
    // Periodic HELLO emission.
    pub hello_interval_task: Option<IntervalTask>,
    // Packet sequence number of the last transmitted packet.
    pub pkt_seqno: u16,
}

#[derive(Debug)]
pub struct InterfaceNet {
    // UDP socket shared by the Tx/Rx tasks.
    pub socket: Arc<UdpSocket>,
    // Network Tx/Rx tasks.
    _net_tx_task: Task<()>,
    _net_rx_task: Task<()>,
    // Network Tx output channel.
    pub net_tx_packetp: UnboundedSender<NetTxPacketMsg>,
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            name,
            system: InterfaceSys::default(),
            config: InterfaceCfg::default(),
            state: InterfaceState::default(),
        }
    }

    // Checks if the interface needs to be started or stopped in response
    // to an ibus event.
    pub(crate) fn update(&mut self, instance: &mut InstanceUpView<'_>) {
        match self.is_ready() {
            Ok(()) if !self.state.active => {
                if let Err(error) = self.start(instance) {
                    Error::InterfaceStartError(self.name.clone(), error)
                        .log();
                }
            }
            Err(reason) if self.state.active => self.stop(instance, reason),
            _ => (),
        }
    }

    // Starts protocol operation on this interface.
    fn start(
        &mut self,
        instance: &mut InstanceUpView<'_>,
    ) -> Result<(), IoError> {
        Debug::InterfaceStart(&self.name).log();

        let ifindex = self.system.ifindex.unwrap();

        // Create the UDP socket.
        let socket =
            network::socket(&self.name).map_err(IoError::SocketError)?;
        let socket = Arc::new(socket);

        // Start network Tx/Rx tasks.
        self.state.net =
            Some(InterfaceNet::new(socket, &self.name, ifindex, instance));

        // Start emitting HELLOs.
        self.state.hello_interval_task = Some(tasks::hello_interval(
            ifindex,
            self.config.hello_interval(),
            &instance.tx.protocol_input.hello_interval,
        ));

        // Mark interface as active.
        self.state.active = true;

        Ok(())
    }

    // Stops protocol operation on this interface.
    pub(crate) fn stop(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        reason: InterfaceInactiveReason,
    ) {
        if !self.state.active {
            return;
        }

        Debug::InterfaceStop(&self.name, reason).log();

        // Stop tasks.
        self.state.net = None;
        self.state.hello_interval_task = None;
        self.state.active = false;

        // Links through this interface will expire by themselves; the
        // routes must be revised at once.
        output::schedule_route_update(instance);
    }

    // Returns whether the interface is ready for protocol operation.
    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.config.enabled {
            return Err(InterfaceInactiveReason::AdminDown);
        }

        if !self.system.flags.contains(InterfaceFlags::OPERATIVE) {
            return Err(InterfaceInactiveReason::OperationalDown);
        }

        if self.system.ifindex.is_none() {
            return Err(InterfaceInactiveReason::MissingIfindex);
        }

        if self.primary_addr().is_none() {
            return Err(InterfaceInactiveReason::MissingIpAddress);
        }

        Ok(())
    }

    // Returns the primary address of the interface.
    pub(crate) fn primary_addr(&self) -> Option<Ipv4Addr> {
        use velo_utils::ip::Ipv4AddrExt;

        self.system
            .addr_list
            .iter()
            .map(|addr| addr.ip())
            .find(|addr| addr.is_usable())
    }

    // Enqueues a packet for transmission, stamping its sequence number.
    pub(crate) fn send_packet(&mut self, mut packet: Packet) {
        self.state.pkt_seqno = self.state.pkt_seqno.wrapping_add(1);
        packet.seqno = self.state.pkt_seqno;

        Debug::PacketTx(&self.name, &packet).log();

        let msg = NetTxPacketMsg {
            #[cfg(feature = "testing")]
            ifname: self.name.clone(),
            packet,
        };
        let _ = self.state.net.as_ref().unwrap().net_tx_packetp.send(msg);
    }
}

// ===== impl InterfaceNet =====

impl InterfaceNet {
    fn new(
        socket: Arc<UdpSocket>,
        ifname: &str,
        ifindex: u32,
        instance: &InstanceUpView<'_>,
    ) -> Self {
        // Start network Tx/Rx tasks.
        let (net_tx_packetp, net_tx_packetc) = mpsc::unbounded_channel();
        let mut net_tx_task = tasks::net_tx(
            socket.clone(),
            ifname,
            ifindex,
            net_tx_packetc,
            #[cfg(feature = "testing")]
            &instance.tx.protocol_output,
        );
        net_tx_task.detach();
        let net_rx_task = tasks::net_rx(
            socket.clone(),
            ifindex,
            &instance.tx.protocol_input.net_packet_rx,
        );

        InterfaceNet {
            socket,
            _net_tx_task: net_tx_task,
            _net_rx_task: net_rx_task,
            net_tx_packetp,
        }
    }
}

// ===== global functions =====

// Looks up an active interface by its ifindex.
pub(crate) fn lookup_by_ifindex(
    interfaces: &mut BTreeMap<String, Interface>,
    ifindex: u32,
) -> Option<&mut Interface> {
    interfaces
        .values_mut()
        .find(|iface| iface.system.ifindex == Some(ifindex))
        .filter(|iface| iface.state.active)
}

// The node's main address: the primary address of the lowest-addressed
// active interface.
pub(crate) fn main_addr(
    interfaces: &BTreeMap<String, Interface>,
) -> Option<Ipv4Addr> {
    interfaces
        .values()
        .filter(|iface| iface.state.active)
        .filter_map(|iface| iface.primary_addr())
        .min()
}

// All protocol addresses of the node's active interfaces.
pub(crate) fn local_addrs(
    interfaces: &BTreeMap<String, Interface>,
) -> BTreeSet<Ipv4Addr> {
    interfaces
        .values()
        .filter(|iface| iface.state.active)
        .flat_map(|iface| iface.system.addr_list.iter().map(|addr| addr.ip()))
        .collect()
}
