//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use velo_utils::ip::IpNetworkKind;
use velo_utils::southbound::{AddressFlags, AddressMsg, InterfaceUpdateMsg};

use crate::debug::Debug;
use crate::instance::Instance;
use crate::interface::Interface;
use crate::version::Version;

// ===== global functions =====

pub(crate) fn process_iface_update<V>(
    instance: &mut Instance<V>,
    msg: InterfaceUpdateMsg,
) where
    V: Version,
{
    // Lookup or create interface.
    let iface = instance
        .interfaces
        .entry(msg.ifname.clone())
        .or_insert_with(|| Interface::new(msg.ifname.clone()));

    // Update interface data.
    iface.system.ifindex = Some(msg.ifindex);
    iface.system.mtu = Some(msg.mtu);
    iface.system.flags = msg.flags;

    if let Some((mut instance, interfaces)) = instance.as_up() {
        let iface = interfaces.get_mut(&msg.ifname).unwrap();

        // Check if the protocol needs to be activated or deactivated on
        // this interface.
        iface.update(&mut instance);
    }
}

pub(crate) fn process_iface_del<V>(instance: &mut Instance<V>, ifname: String)
where
    V: Version,
{
    if let Some((mut instance, interfaces)) = instance.as_up()
        && let Some(iface) = interfaces.get_mut(&ifname)
    {
        iface.stop(
            &mut instance,
            crate::debug::InterfaceInactiveReason::OperationalDown,
        );
    }

    if instance.interfaces.remove(&ifname).is_some() {
        Debug::<V>::InterfaceDelete(&ifname).log();
    }
}

pub(crate) fn process_addr_add<V>(instance: &mut Instance<V>, msg: AddressMsg)
where
    V: Version,
{
    let Some(addr) = V::IpNetwork::get(msg.addr) else {
        return;
    };

    // Lookup interface.
    let Some(iface) = instance.interfaces.get_mut(&msg.ifname) else {
        return;
    };

    // Ignore unnumbered addresses.
    if msg.flags.contains(AddressFlags::UNNUMBERED) {
        return;
    }

    // Add address.
    if !iface.system.addr_list.insert(addr) {
        return;
    }

    if let Some((mut instance, interfaces)) = instance.as_up() {
        let iface = interfaces.get_mut(&msg.ifname).unwrap();

        // Check if the protocol needs to be activated on this interface.
        iface.update(&mut instance);
    }
}

pub(crate) fn process_addr_del<V>(instance: &mut Instance<V>, msg: AddressMsg)
where
    V: Version,
{
    let Some(addr) = V::IpNetwork::get(msg.addr) else {
        return;
    };

    // Lookup interface.
    let Some(iface) = instance.interfaces.get_mut(&msg.ifname) else {
        return;
    };

    // Ignore unnumbered addresses.
    if msg.flags.contains(AddressFlags::UNNUMBERED) {
        return;
    }

    // Remove address.
    if !iface.system.addr_list.remove(&addr) {
        return;
    }

    if let Some((mut instance, interfaces)) = instance.as_up() {
        let iface = interfaces.get_mut(&msg.ifname).unwrap();

        // Check if the protocol needs to be deactivated on this interface.
        iface.update(&mut instance);
    }
}
