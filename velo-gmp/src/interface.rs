//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use velo_utils::UnboundedSender;
use velo_utils::ip::{IpAddrKind, IpNetworkKind};
use velo_utils::socket::{AsyncFd, Socket};
use velo_utils::southbound::InterfaceFlags;
use velo_utils::task::{Task, TimeoutTask};

use crate::config::InterfaceCfg;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, IoError};
use crate::group::Group;
use crate::instance::InstanceUpView;
use crate::network::NetworkVersion;
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;
use crate::{group, output};

/// Collection of multicast groups with listeners on an interface.
pub type Groups<V> = BTreeMap<<V as Version>::IpAddr, Group<V>>;

#[derive(Debug)]
pub struct Interface<V: Version> {
    pub name: String,
    pub system: InterfaceSys<V>,
    pub config: InterfaceCfg<V>,
    pub state: InterfaceState<V>,
    /// Multicast groups with local members on this interface.
    pub groups: Groups<V>,
}

#[derive(Debug)]
pub struct InterfaceSys<V: Version> {
    pub flags: InterfaceFlags,
    pub ifindex: Option<u32>,
    pub mtu: Option<u32>,
    pub addr_list: BTreeSet<V::IpNetwork>,
}

#[derive(Debug)]
pub struct InterfaceState<V: Version> {
    pub active: bool,
    // Raw socket and Tx/Rx tasks.
    pub net: Option<InterfaceNet<V>>,
    // Querier state.
    pub is_querier: bool,
    pub querier_addr: Option<V::IpAddr>,
    pub startup_query_count: u8,
    // Variables adopted from the elected querier when not querier
    // ourselves.
    pub effective_robustness: u8,
    pub effective_query_interval: Duration,
    // Running timers.
    pub query_timer: Option<TimeoutTask>,
    pub other_querier_timer: Option<TimeoutTask>,
}

#[derive(Debug)]
pub struct InterfaceNet<V: Version> {
    // Raw socket shared by the Tx/Rx tasks.
    pub socket: Arc<AsyncFd<Socket>>,
    // Network Tx/Rx tasks.
    _net_tx_task: Task<()>,
    _net_rx_task: Task<()>,
    // Network Tx output channel.
    pub net_tx_packetp: UnboundedSender<NetTxPacketMsg<V>>,
}

// ===== impl Interface =====

impl<V> Interface<V>
where
    V: Version,
{
    pub(crate) fn new(name: String) -> Interface<V> {
        Debug::<V>::InterfaceCreate(&name).log();

        Interface {
            name,
            system: InterfaceSys {
                flags: Default::default(),
                ifindex: None,
                mtu: None,
                addr_list: Default::default(),
            },
            config: InterfaceCfg::default(),
            state: InterfaceState {
                active: false,
                net: None,
                is_querier: false,
                querier_addr: None,
                startup_query_count: 0,
                effective_robustness: 0,
                effective_query_interval: Duration::ZERO,
                query_timer: None,
                other_querier_timer: None,
            },
            groups: Default::default(),
        }
    }

    // Checks if the interface needs to be started or stopped in response to
    // an ibus event.
    pub(crate) fn update(&mut self, instance: &mut InstanceUpView<'_, V>) {
        match self.is_ready() {
            Ok(()) if !self.state.active => {
                if let Err(error) = self.start(instance) {
                    Error::<V>::InterfaceStartError(
                        self.name.clone(),
                        error,
                    )
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
        instance: &mut InstanceUpView<'_, V>,
    ) -> Result<(), IoError> {
        Debug::<V>::InterfaceStart(&self.name).log();

        let ifindex = self.system.ifindex.unwrap();

        // Create the raw socket and join the relevant multicast groups.
        let socket = V::socket(&self.name).map_err(IoError::SocketError)?;
        V::join_multicast(&socket, &V::all_routers(), ifindex)
            .map_err(IoError::MulticastJoinError)?;
        V::join_multicast(&socket, &V::ssm_routers(), ifindex)
            .map_err(IoError::MulticastJoinError)?;
        let socket = AsyncFd::new(socket).map_err(IoError::SocketError)?;
        let socket = Arc::new(socket);

        // Start network Tx/Rx tasks.
        self.state.net =
            Some(InterfaceNet::new(socket, &self.name, ifindex, instance));

        // Mark interface as active.
        self.state.active = true;

        // Initialize the effective variables from the configured ones.
        self.restore_effective_variables();

        // On startup, assume we are the querier until a query from a lower
        // address proves otherwise.
        self.state.is_querier = true;
        self.state.querier_addr = self.primary_addr();
        self.state.startup_query_count = self.state.effective_robustness;

        // Send the first General Query and begin the startup phase.
        output::send_general_query(self, instance);
        if self.state.startup_query_count > 0 {
            self.state.startup_query_count -= 1;
        }
        let interval = self.startup_query_interval();
        self.arm_query_timer(interval, instance);

        Ok(())
    }

    // Stops protocol operation on this interface.
    pub(crate) fn stop(
        &mut self,
        instance: &mut InstanceUpView<'_, V>,
        reason: InterfaceInactiveReason,
    ) {
        if !self.state.active {
            return;
        }

        Debug::<V>::InterfaceStop(&self.name, reason).log();

        // Withdraw all learned membership state.
        let ifindex = self.system.ifindex.unwrap();
        for group in std::mem::take(&mut self.groups).into_values() {
            group::notify_prune_all(instance, ifindex, &group);
        }

        // Stop tasks and timers.
        self.state.net = None;
        self.state.query_timer = None;
        self.state.other_querier_timer = None;
        self.state.is_querier = false;
        self.state.querier_addr = None;
        self.state.startup_query_count = 0;
        self.state.active = false;
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

    // Returns the address used as the source of transmitted messages.
    pub(crate) fn primary_addr(&self) -> Option<V::IpAddr> {
        self.system
            .addr_list
            .iter()
            .map(|addr| addr.ip())
            .find(|addr| addr.is_valid_membership_source())
    }

    // Checks if the interface shares a subnet with the given IP address.
    pub(crate) fn contains_addr(&self, addr: &V::IpAddr) -> bool {
        self.system.addr_list.iter().any(|local| local.contains(*addr))
    }

    // Enqueues a packet for transmission.
    pub(crate) fn send_packet(
        &self,
        dst: V::IpAddr,
        packet: crate::packet::Packet<V>,
    ) {
        let Some(src) = self.primary_addr() else {
            return;
        };

        let msg = NetTxPacketMsg {
            #[cfg(feature = "testing")]
            ifname: self.name.clone(),
            src,
            dst,
            packet,
        };
        let _ = self.state.net.as_ref().unwrap().net_tx_packetp.send(msg);
    }

    // Restores the effective Robustness Variable and Query Interval from
    // the configured values, discarding anything adopted from a remote
    // querier.
    pub(crate) fn restore_effective_variables(&mut self) {
        self.state.effective_robustness = self.config.robustness;
        self.state.effective_query_interval = self.config.query_interval();
    }

    //
    // Derived protocol intervals (RFC 3376 Section 8, RFC 3810 Section 9).
    //

    pub(crate) fn group_membership_interval(&self) -> Duration {
        self.state.effective_query_interval
            * self.state.effective_robustness as u32
            + self.config.query_response_interval()
    }

    pub(crate) fn other_querier_present_interval(&self) -> Duration {
        self.state.effective_query_interval
            * self.state.effective_robustness as u32
            + self.config.query_response_interval() / 2
    }

    pub(crate) fn startup_query_interval(&self) -> Duration {
        self.state.effective_query_interval / 4
    }

    pub(crate) fn last_member_query_count(&self) -> u8 {
        self.state.effective_robustness
    }

    pub(crate) fn last_member_query_time(&self) -> Duration {
        self.config.last_member_query_interval()
            * self.last_member_query_count() as u32
    }

    pub(crate) fn older_version_host_present_interval(&self) -> Duration {
        self.group_membership_interval()
    }

    // (Re)arms the General Query timer.
    pub(crate) fn arm_query_timer(
        &mut self,
        timeout: Duration,
        instance: &InstanceUpView<'_, V>,
    ) {
        let ifindex = self.system.ifindex.unwrap();
        self.state.query_timer = Some(tasks::query_timer::<V>(
            ifindex,
            timeout,
            &instance.tx.protocol_input.query_timer,
        ));
    }

    // (Re)arms the other-querier-present timer and stops the General Query
    // timer.
    pub(crate) fn arm_other_querier_timer(
        &mut self,
        instance: &InstanceUpView<'_, V>,
    ) {
        let ifindex = self.system.ifindex.unwrap();
        let timeout = self.other_querier_present_interval();
        self.state.query_timer = None;
        self.state.other_querier_timer = Some(tasks::other_querier_timer::<V>(
            ifindex,
            timeout,
            &instance.tx.protocol_input.other_querier_timer,
        ));
    }
}

// ===== impl InterfaceNet =====

impl<V> InterfaceNet<V>
where
    V: Version,
{
    fn new(
        socket: Arc<AsyncFd<Socket>>,
        ifname: &str,
        ifindex: u32,
        instance: &InstanceUpView<'_, V>,
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
