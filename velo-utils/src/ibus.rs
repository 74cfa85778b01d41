//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::ip::AddressFamily;
use crate::southbound::{
    AddressMsg, InterfaceUpdateMsg, MembershipMsg, RouteKeyMsg, RouteMsg,
};

// Useful type definition(s).
pub type IbusReceiver = UnboundedReceiver<IbusMsg>;
pub type IbusSender = UnboundedSender<IbusMsg>;

/// Transmit channels for sending [`IbusMsg`] messages to each base component.
#[derive(Clone, Debug)]
pub struct IbusChannelsTx {
    subscriber: Option<IbusSubscriber>,
    routing: UnboundedSender<IbusMsg>,
    interface: UnboundedSender<IbusMsg>,
}

/// Receive channels for receiving [`IbusMsg`] messages from each base
/// component.
#[derive(Debug)]
pub struct IbusChannelsRx {
    pub routing: UnboundedReceiver<IbusMsg>,
    pub interface: UnboundedReceiver<IbusMsg>,
}

/// Subscriber to [`IbusMsg`] messages.
#[derive(Clone, Debug)]
pub struct IbusSubscriber {
    /// Unique identifier for the subscriber.
    pub id: usize,
    /// Channel for sending messages to the subscriber.
    pub tx: IbusSender,
}

/// Ibus message for communication among the different components.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum IbusMsg {
    /// Request a subscription to interface update notifications.
    ///
    /// The subscriber may filter updates by a specific interface or address
    /// family.
    InterfaceSub {
        #[serde(skip)]
        subscriber: Option<IbusSubscriber>,
        ifname: Option<String>,
        af: Option<AddressFamily>,
    },
    /// Cancel a previously requested subscription to interface updates.
    InterfaceUnsub {
        #[serde(skip)]
        subscriber: Option<IbusSubscriber>,
        ifname: Option<String>,
    },
    /// Interface update notification.
    InterfaceUpd(InterfaceUpdateMsg),
    /// Interface delete notification.
    InterfaceDel(String),
    /// Interface address addition notification.
    InterfaceAddressAdd(AddressMsg),
    /// Interface address delete notification.
    InterfaceAddressDel(AddressMsg),
    /// Request a subscription to multicast membership notifications.
    MembershipSub {
        #[serde(skip)]
        subscriber: Option<IbusSubscriber>,
        af: Option<AddressFamily>,
    },
    /// Multicast membership addition (JOIN) notification.
    MembershipAdd(MembershipMsg),
    /// Multicast membership delete (PRUNE) notification.
    MembershipDel(MembershipMsg),
    /// Request to install IP route in the RIB.
    RouteIpAdd(RouteMsg),
    /// Request to uninstall IP route from the RIB.
    RouteIpDel(RouteKeyMsg),
    /// Cancel all previously requested subscriptions.
    Disconnect {
        #[serde(skip)]
        subscriber: Option<IbusSubscriber>,
    },
}

// ===== impl IbusChannelsTx =====

impl IbusChannelsTx {
    /// Creates a new `IbusChannelsTx` with the provided subscriber.
    pub fn with_subscriber(
        tx: &IbusChannelsTx,
        subscriber_tx: UnboundedSender<IbusMsg>,
    ) -> Self {
        IbusChannelsTx {
            subscriber: Some(IbusSubscriber::new(subscriber_tx)),
            ..tx.clone()
        }
    }

    /// Sends an [`IbusMsg::InterfaceSub`] message to the interface manager.
    pub fn interface_sub(
        &self,
        ifname: Option<String>,
        af: Option<AddressFamily>,
    ) {
        let msg = IbusMsg::InterfaceSub {
            subscriber: self.subscriber.clone(),
            ifname,
            af,
        };
        let _ = self.interface.send(msg);
    }

    /// Sends an [`IbusMsg::InterfaceUnsub`] message to the interface manager.
    pub fn interface_unsub(&self, ifname: Option<String>) {
        let msg = IbusMsg::InterfaceUnsub {
            subscriber: self.subscriber.clone(),
            ifname,
        };
        let _ = self.interface.send(msg);
    }

    /// Sends an [`IbusMsg::MembershipSub`] message to the routing component.
    pub fn membership_sub(&self, af: Option<AddressFamily>) {
        let msg = IbusMsg::MembershipSub {
            subscriber: self.subscriber.clone(),
            af,
        };
        let _ = self.routing.send(msg);
    }

    /// Sends an [`IbusMsg::MembershipAdd`] message to the routing component.
    pub fn membership_add(&self, msg: crate::southbound::MembershipMsg) {
        let _ = self.routing.send(IbusMsg::MembershipAdd(msg));
    }

    /// Sends an [`IbusMsg::MembershipDel`] message to the routing component.
    pub fn membership_del(&self, msg: crate::southbound::MembershipMsg) {
        let _ = self.routing.send(IbusMsg::MembershipDel(msg));
    }

    /// Sends an [`IbusMsg::RouteIpAdd`] message to the routing component.
    pub fn route_ip_add(&self, route: RouteMsg) {
        let _ = self.routing.send(IbusMsg::RouteIpAdd(route));
    }

    /// Sends an [`IbusMsg::RouteIpDel`] message to the routing component.
    pub fn route_ip_del(&self, route: RouteKeyMsg) {
        let _ = self.routing.send(IbusMsg::RouteIpDel(route));
    }

    /// Sends an [`IbusMsg::Disconnect`] message to all base components.
    pub fn disconnect(&self) {
        for tx in &[&self.routing, &self.interface] {
            let msg = IbusMsg::Disconnect {
                subscriber: self.subscriber.clone(),
            };
            let _ = tx.send(msg);
        }
    }
}

// ===== impl IbusSubscriber =====

impl IbusSubscriber {
    fn new(tx: IbusSender) -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        IbusSubscriber {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }
}

// ===== global functions =====

/// Creates the set of Ibus communication channels for inter-component
/// messaging.
///
/// Returns a tuple containing:
/// - A tuple of [`IbusChannelsTx`] instances, one per base component.
/// - A single [`IbusChannelsRx`] instance holding the corresponding
///   receivers.
pub fn ibus_channels() -> ((IbusChannelsTx, IbusChannelsTx), IbusChannelsRx) {
    let (routing_tx, routing_rx) = mpsc::unbounded_channel();
    let (interface_tx, interface_rx) = mpsc::unbounded_channel();

    let tx = IbusChannelsTx {
        subscriber: None,
        routing: routing_tx,
        interface: interface_tx,
    };
    let rx = IbusChannelsRx {
        routing: routing_rx,
        interface: interface_rx,
    };

    let tx_routing = IbusChannelsTx::with_subscriber(&tx, tx.routing.clone());
    let tx_interface =
        IbusChannelsTx::with_subscriber(&tx, tx.interface.clone());

    ((tx_routing, tx_interface), rx)
}
