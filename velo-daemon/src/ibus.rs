//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// Minimal message-bus hub: keeps track of the subscribers registered by
// the protocol instances and relays notifications between them and the
// external collaborators (interface manager, RIB, upstream multicast
// routing).
//

use tokio::sync::mpsc;
use tracing::debug;
use velo_protocol::{InstanceShared, ProtocolInstance, spawn_protocol_task};
use velo_utils::ibus::{
    IbusChannelsRx, IbusChannelsTx, IbusMsg, IbusSubscriber,
};
use velo_utils::task::Task;

// ===== global functions =====

// Spawns a protocol instance connected to the bus.
pub(crate) fn spawn_protocol<P>(
    name: &str,
    ibus_tx: &IbusChannelsTx,
    shared: InstanceShared,
) -> Task<()>
where
    P: ProtocolInstance + 'static,
{
    let (ibus_instance_tx, ibus_instance_rx) = mpsc::unbounded_channel();
    spawn_protocol_task::<P>(
        name.to_owned(),
        ibus_tx,
        ibus_instance_tx,
        ibus_instance_rx,
        shared,
    )
}

// Relays bus messages to the registered subscribers.
pub(crate) async fn dispatcher(mut ibus_rx: IbusChannelsRx) {
    let mut iface_subs: Vec<IbusSubscriber> = vec![];
    let mut membership_subs: Vec<IbusSubscriber> = vec![];

    loop {
        let msg = tokio::select! {
            Some(msg) = ibus_rx.interface.recv() => msg,
            Some(msg) = ibus_rx.routing.recv() => msg,
            else => break,
        };

        match msg {
            // Subscription management.
            IbusMsg::InterfaceSub { subscriber, .. } => {
                iface_subs.extend(subscriber);
            }
            IbusMsg::InterfaceUnsub { subscriber, .. } => {
                if let Some(subscriber) = subscriber {
                    iface_subs.retain(|sub| sub.id != subscriber.id);
                }
            }
            IbusMsg::MembershipSub { subscriber, .. } => {
                membership_subs.extend(subscriber);
            }
            IbusMsg::Disconnect { subscriber } => {
                if let Some(subscriber) = subscriber {
                    iface_subs.retain(|sub| sub.id != subscriber.id);
                    membership_subs.retain(|sub| sub.id != subscriber.id);
                }
            }
            // Interface notifications, injected by the interface-manager
            // collaborator.
            msg @ (IbusMsg::InterfaceUpd(_)
            | IbusMsg::InterfaceDel(_)
            | IbusMsg::InterfaceAddressAdd(_)
            | IbusMsg::InterfaceAddressDel(_)) => {
                for sub in &iface_subs {
                    let _ = sub.tx.send(msg.clone());
                }
            }
            // Multicast membership notifications, consumed by the
            // upstream multicast routing subscribers.
            msg @ (IbusMsg::MembershipAdd(_) | IbusMsg::MembershipDel(_)) => {
                for sub in &membership_subs {
                    let _ = sub.tx.send(msg.clone());
                }
            }
            // Route requests, consumed by the external RIB.
            IbusMsg::RouteIpAdd(msg) => {
                debug!(prefix = %msg.prefix, "route install request");
            }
            IbusMsg::RouteIpDel(msg) => {
                debug!(prefix = %msg.prefix, "route uninstall request");
            }
        }
    }
}

// Completes as soon as any of the given tasks completes.
pub(crate) async fn wait_any(tasks: Vec<Task<()>>) {
    let (donep, mut donec) = mpsc::channel::<()>(1);
    let _waiters = tasks
        .into_iter()
        .map(|task| {
            let donep = donep.clone();
            Task::spawn(async move {
                let _ = task.await;
                let _ = donep.send(()).await;
            })
        })
        .collect::<Vec<_>>();
    drop(donep);

    let _ = donec.recv().await;
}
