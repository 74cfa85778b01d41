//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::IpNetwork;
use velo_utils::southbound::{AddressFlags, AddressMsg, InterfaceUpdateMsg};

use crate::debug::Debug;
use crate::instance::Instance;
use crate::interface::Interface;
use crate::output;

// ===== global functions =====

pub(crate) fn process_iface_update(
    instance: &mut Instance,
    msg: InterfaceUpdateMsg,
) {
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
        output::update_mid_task(&mut instance, interfaces);
    }
}

pub(crate) fn process_iface_del(instance: &mut Instance, ifname: String) {
    if let Some((mut instance, interfaces)) = instance.as_up() {
        if let Some(iface) = interfaces.get_mut(&ifname) {
            iface.stop(
                &mut instance,
                crate::debug::InterfaceInactiveReason::OperationalDown,
            );
        }
        output::update_mid_task(&mut instance, interfaces);
    }

    if instance.interfaces.remove(&ifname).is_some() {
        Debug::InterfaceDelete(&ifname).log();
    }
}

pub(crate) fn process_addr_add(instance: &mut Instance, msg: AddressMsg) {
    let IpNetwork::V4(addr) = msg.addr else {
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
        output::update_mid_task(&mut instance, interfaces);
    }
}

pub(crate) fn process_addr_del(instance: &mut Instance, msg: AddressMsg) {
    let IpNetwork::V4(addr) = msg.addr else {
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
        output::update_mid_task(&mut instance, interfaces);
    }
}
