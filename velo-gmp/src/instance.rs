//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender};
use velo_protocol::{
    InstanceChannelsTx, InstanceShared, MessageReceiver, ProtocolInstance,
};
use velo_utils::ibus::IbusMsg;
use velo_utils::protocol::Protocol;

use crate::config::InstanceCfg;
use crate::debug::{Debug, InstanceInactiveReason, InterfaceInactiveReason};
use crate::error::Error;
use crate::interface::Interface;
use crate::tasks::messages::input::{
    CompatTimerMsg, GroupTimerMsg, NetRxPacketMsg, OtherQuerierTimerMsg,
    QueryTimerMsg, RexmitTimerMsg, SourceTimerMsg,
};
use crate::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};
use crate::version::Version;
use crate::{events, ibus};

#[derive(Debug)]
pub struct Instance<V: Version> {
    // Instance name.
    pub name: String,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance interfaces.
    pub interfaces: BTreeMap<String, Interface<V>>,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx<Instance<V>>,
    // Shared data.
    pub shared: InstanceShared,
}

#[derive(Debug, Default)]
pub struct InstanceState {
    pub statistics: Statistics,
}

#[derive(Debug, Default)]
pub struct Statistics {
    pub discontinuity_time: DateTime<Utc>,
    pub errors: ErrorStatistics,
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
}

#[derive(Debug, Default)]
pub struct ErrorStatistics {
    pub total: u64,
    pub query: u64,
    pub report: u64,
    pub leave: u64,
    pub checksum: u64,
    pub too_short: u64,
}

#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub total: u64,
    pub query: u64,
    pub report: u64,
    pub leave: u64,
}

pub struct InstanceUpView<'a, V: Version> {
    pub name: &'a str,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx<Instance<V>>,
    pub shared: &'a InstanceShared,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx<V: Version> {
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg<V>>,
    // General query timer.
    pub query_timer: Sender<QueryTimerMsg>,
    // Other-querier-present timer.
    pub other_querier_timer: Sender<OtherQuerierTimerMsg>,
    // Group membership timer.
    pub group_timer: Sender<GroupTimerMsg<V>>,
    // Source timer.
    pub source_timer: Sender<SourceTimerMsg<V>>,
    // Last-member query retransmission timer.
    pub rexmit_timer: Sender<RexmitTimerMsg<V>>,
    // Older-version-host-present timer.
    pub compat_timer: Sender<CompatTimerMsg<V>>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx<V: Version> {
    // Packet Rx event.
    pub net_packet_rx: Receiver<NetRxPacketMsg<V>>,
    // General query timer.
    pub query_timer: Receiver<QueryTimerMsg>,
    // Other-querier-present timer.
    pub other_querier_timer: Receiver<OtherQuerierTimerMsg>,
    // Group membership timer.
    pub group_timer: Receiver<GroupTimerMsg<V>>,
    // Source timer.
    pub source_timer: Receiver<SourceTimerMsg<V>>,
    // Last-member query retransmission timer.
    pub rexmit_timer: Receiver<RexmitTimerMsg<V>>,
    // Older-version-host-present timer.
    pub compat_timer: Receiver<CompatTimerMsg<V>>,
}

// ===== impl Instance =====

impl<V> Instance<V>
where
    V: Version,
{
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
        Debug::<V>::InstanceStart.log();

        self.state = Some(InstanceState::default());
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

        Debug::<V>::InstanceStop(reason).log();

        // Stop interfaces.
        let (mut instance, interfaces) = self.as_up().unwrap();
        for iface in interfaces.values_mut() {
            iface.stop(&mut instance, InterfaceInactiveReason::InstanceDown);
        }

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
    ) -> Option<(InstanceUpView<'_, V>, &mut BTreeMap<String, Interface<V>>)>
    {
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

impl<V> ProtocolInstance for Instance<V>
where
    V: Version,
{
    const PROTOCOL: Protocol = V::PROTOCOL;

    type ProtocolInputMsg = ProtocolInputMsg<V>;
    type ProtocolOutputMsg = ProtocolOutputMsg<V>;
    type ProtocolInputChannelsTx = ProtocolInputChannelsTx<V>;
    type ProtocolInputChannelsRx = ProtocolInputChannelsRx<V>;

    fn new(
        name: String,
        shared: InstanceShared,
        tx: InstanceChannelsTx<Instance<V>>,
    ) -> Instance<V> {
        Debug::<V>::InstanceCreate.log();

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
        self.tx.ibus.interface_sub(None, Some(V::ADDRESS_FAMILY));

        self.update();
    }

    fn shutdown(mut self) {
        // Ensure instance is disabled before exiting.
        self.stop(InstanceInactiveReason::AdminDown);
        Debug::<V>::InstanceDelete.log();
    }

    fn process_ibus_msg(&mut self, msg: IbusMsg) {
        if let Err(error) = process_ibus_msg(self, msg) {
            error.log();
        }
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg<V>) {
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
    -> (ProtocolInputChannelsTx<V>, ProtocolInputChannelsRx<V>) {
        let (net_packet_rxp, net_packet_rxc) = mpsc::channel(4);
        let (query_timerp, query_timerc) = mpsc::channel(4);
        let (other_querier_timerp, other_querier_timerc) = mpsc::channel(4);
        let (group_timerp, group_timerc) = mpsc::channel(4);
        let (source_timerp, source_timerc) = mpsc::channel(4);
        let (rexmit_timerp, rexmit_timerc) = mpsc::channel(4);
        let (compat_timerp, compat_timerc) = mpsc::channel(4);

        let tx = ProtocolInputChannelsTx {
            net_packet_rx: net_packet_rxp,
            query_timer: query_timerp,
            other_querier_timer: other_querier_timerp,
            group_timer: group_timerp,
            source_timer: source_timerp,
            rexmit_timer: rexmit_timerp,
            compat_timer: compat_timerp,
        };
        let rx = ProtocolInputChannelsRx {
            net_packet_rx: net_packet_rxc,
            query_timer: query_timerc,
            other_querier_timer: other_querier_timerc,
            group_timer: group_timerc,
            source_timer: source_timerc,
            rexmit_timer: rexmit_timerc,
            compat_timer: compat_timerc,
        };

        (tx, rx)
    }

    #[cfg(feature = "testing")]
    fn test_dir() -> String {
        format!("{}/tests/conformance", env!("CARGO_MANIFEST_DIR"))
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl<V> MessageReceiver<ProtocolInputMsg<V>> for ProtocolInputChannelsRx<V>
where
    V: Version,
{
    async fn recv(&mut self) -> Option<ProtocolInputMsg<V>> {
        tokio::select! {
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.query_timer.recv() => {
                msg.map(ProtocolInputMsg::QueryTimer)
            }
            msg = self.other_querier_timer.recv() => {
                msg.map(ProtocolInputMsg::OtherQuerierTimer)
            }
            msg = self.group_timer.recv() => {
                msg.map(ProtocolInputMsg::GroupTimer)
            }
            msg = self.source_timer.recv() => {
                msg.map(ProtocolInputMsg::SourceTimer)
            }
            msg = self.rexmit_timer.recv() => {
                msg.map(ProtocolInputMsg::RexmitTimer)
            }
            msg = self.compat_timer.recv() => {
                msg.map(ProtocolInputMsg::CompatTimer)
            }
        }
    }
}

// ===== helper functions =====

fn process_ibus_msg<V>(
    instance: &mut Instance<V>,
    msg: IbusMsg,
) -> Result<(), Error<V>>
where
    V: Version,
{
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

fn process_protocol_msg<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    msg: ProtocolInputMsg<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    match msg {
        // Received network packet.
        ProtocolInputMsg::NetRxPacket(msg) => {
            events::process_packet(
                instance,
                interfaces,
                msg.ifindex,
                msg.src,
                msg.info,
                msg.packet,
            )?;
        }
        // General query timer expired.
        ProtocolInputMsg::QueryTimer(msg) => {
            events::process_query_timer(instance, interfaces, msg.ifindex);
        }
        // Other-querier-present timer expired.
        ProtocolInputMsg::OtherQuerierTimer(msg) => {
            events::process_other_querier_timer(
                instance,
                interfaces,
                msg.ifindex,
            );
        }
        // Group membership timer expired.
        ProtocolInputMsg::GroupTimer(msg) => {
            events::process_group_timer(
                instance,
                interfaces,
                msg.ifindex,
                msg.group_addr,
            );
        }
        // Source timer expired.
        ProtocolInputMsg::SourceTimer(msg) => {
            events::process_source_timer(
                instance,
                interfaces,
                msg.ifindex,
                msg.group_addr,
                msg.source_addr,
            );
        }
        // Last-member query retransmission timer expired.
        ProtocolInputMsg::RexmitTimer(msg) => {
            events::process_rexmit_timer(
                instance,
                interfaces,
                msg.ifindex,
                msg.group_addr,
            );
        }
        // Older-version-host-present timer expired.
        ProtocolInputMsg::CompatTimer(msg) => {
            events::process_compat_timer(
                instance,
                interfaces,
                msg.ifindex,
                msg.group_addr,
                msg.version,
            );
        }
    }

    Ok(())
}
