//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use velo_utils::ip::IpAddrKind;

use crate::debug::Debug;
use crate::error::Error;
use crate::group;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::network::RxPacketInfo;
use crate::packet::{
    DecodeError, Leave, Packet, Query, RecordType, Report, ReportSsm,
    decode_exp_time_code8, scaled_units_to_duration,
};
use crate::output;
use crate::version::Version;

// ===== Network packet receipt =====

pub(crate) fn process_packet<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
    src: V::IpAddr,
    info: RxPacketInfo<V>,
    packet: Result<Packet<V>, DecodeError>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Lookup interface.
    let Some(iface) = interfaces
        .values_mut()
        .find(|iface| iface.system.ifindex == Some(ifindex))
    else {
        return Ok(());
    };
    if !iface.state.active {
        return Ok(());
    }

    Debug::<V>::PacketRx(&iface.name, &src, &packet).log();

    instance.state.statistics.msgs_rcvd.total += 1;

    // Handle decode failures.
    let packet = match packet {
        Ok(packet) => packet,
        Err(error) => {
            let errors = &mut instance.state.statistics.errors;
            errors.total += 1;
            match &error {
                DecodeError::LengthTooShort(..) => errors.too_short += 1,
                DecodeError::ChecksumMismatch => errors.checksum += 1,
                DecodeError::UnsupportedMessageType(..) => (),
            }
            return Err(Error::PacketDecodeError(
                iface.name.clone(),
                src,
                error,
            ));
        }
    };

    // Sanity checks.
    if !src.is_valid_membership_source() {
        instance.state.statistics.errors.total += 1;
        return Err(Error::UnexpectedSourceScope(iface.name.clone(), src));
    }
    if !iface.contains_addr(&src) {
        instance.state.statistics.errors.total += 1;
        return Err(Error::SourceNotDirectlyConnected(
            iface.name.clone(),
            src,
        ));
    }
    if packet.is_listener_message() {
        // Listener messages are always multicast.
        if let Some(dst) = info.dst
            && !dst.is_multicast()
        {
            instance.state.statistics.errors.total += 1;
            return Err(Error::UnexpectedDestination(iface.name.clone(), dst));
        }
        // The Router Alert check is opt-in, and only applies when the
        // receive path could observe the IP options.
        if iface.config.router_alert_check
            && info.router_alert == Some(false)
        {
            instance.state.statistics.errors.total += 1;
            return Err(Error::MissingRouterAlert(iface.name.clone(), src));
        }
    }

    // Messages newer than the configured protocol version are ignored.
    let msg_version = packet.version();
    if msg_version > iface.config.version {
        instance.state.statistics.errors.total += 1;
        return Err(Error::VersionMismatch(
            iface.name.clone(),
            iface.config.version,
            msg_version,
        ));
    }

    match packet {
        Packet::Query(query) => {
            instance.state.statistics.msgs_rcvd.query += 1;
            process_query(iface, instance, src, query)
        }
        Packet::Report(report) => {
            instance.state.statistics.msgs_rcvd.report += 1;
            process_report(iface, instance, src, report)
        }
        Packet::ReportSsm(report) => {
            instance.state.statistics.msgs_rcvd.report += 1;
            process_report_ssm(iface, instance, src, report)
        }
        Packet::Leave(leave) => {
            instance.state.statistics.msgs_rcvd.leave += 1;
            process_leave(iface, instance, src, leave)
        }
    }
}

// ===== Membership Query =====

fn process_query<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    src: V::IpAddr,
    query: Query<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Ignore looped-back queries of our own.
    let primary_addr = iface.primary_addr().unwrap();
    if src == primary_addr {
        return Ok(());
    }

    // All routers attached to a subnet must run the same version of the
    // protocol (RFC 3376 Section 7.3.1, RFC 3810 Section 8.3.1).
    if query.version != iface.config.version {
        instance.state.statistics.errors.query += 1;
        instance.state.statistics.errors.total += 1;
        return Err(Error::VersionMismatch(
            iface.name.clone(),
            iface.config.version,
            query.version,
        ));
    }

    // Querier election: the lowest address on the subnet wins.
    if src < primary_addr {
        if iface.state.is_querier {
            Debug::<V>::QuerierResign(&iface.name, &src).log();
        }
        iface.state.is_querier = false;
        iface.state.querier_addr = Some(src);
        iface.arm_other_querier_timer(instance);
    }

    if let Some(ssm) = &query.ssm {
        // Adopt the Querier's Robustness Variable and Query Interval
        // (RFC 3376 Section 6.4.2, RFC 3810 Section 7.6.1).
        if !iface.state.is_querier {
            iface.state.effective_robustness = if ssm.qrv != 0 {
                ssm.qrv
            } else {
                iface.config.robustness
            };
            iface.state.effective_query_interval = if ssm.qqic != 0 {
                decode_exp_time_code8(ssm.qqic, 1)
            } else {
                iface.config.query_interval()
            };
        }

        // Lower the group (or source) timers, unless router-side
        // processing is suppressed.
        if !ssm.s_flag {
            let lmqt = iface.last_member_query_time();
            if let Some(group) = iface.groups.get_mut(&query.group_addr) {
                if ssm.sources.is_empty() {
                    group::lower_group_timer(group, lmqt);
                } else {
                    let sources =
                        ssm.sources.iter().copied().collect::<BTreeSet<_>>();
                    group::lower_source_timers(group, &sources, lmqt);
                }
            }
        }
    } else if !query.group_addr.is_unspecified()
        && query.max_resp_code != 0
        && !iface.state.is_querier
    {
        // A non-querier receiving a Group-Specific Query lowers its group
        // timer to Last Member Query Count times the Max Response Time
        // carried in the message (RFC 2236 Section 3, RFC 2710 Section 4).
        let max_resp_time = scaled_units_to_duration(
            query.max_resp_code as u32,
            V::TIMER_SCALE,
        );
        let timeout = max_resp_time * iface.state.effective_robustness as u32;
        if let Some(group) = iface.groups.get_mut(&query.group_addr) {
            group::lower_group_timer(group, timeout);
        }
    }

    Ok(())
}

// ===== older-version Membership Report =====

fn process_report<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    src: V::IpAddr,
    report: Report<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    if !V::group_addr_valid(&report.group_addr) {
        instance.state.statistics.errors.report += 1;
        instance.state.statistics.errors.total += 1;
        return Err(Error::InvalidGroupAddress(
            iface.name.clone(),
            report.group_addr,
        ));
    }

    // An older-version report is equivalent to an any-source EXCLUDE
    // record.
    let no_sources = BTreeSet::new();
    group::process_mode_is_exclude(
        iface,
        instance,
        report.group_addr,
        &no_sources,
        src,
    );
    group::received_older_report(
        iface,
        instance,
        report.group_addr,
        report.version,
    );

    Ok(())
}

// ===== source-specific Membership Report =====

fn process_report_ssm<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    src: V::IpAddr,
    report: ReportSsm<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    for record in report.records {
        // Records for invalid groups are skipped; the rest of the report
        // is still processed.
        if !V::group_addr_valid(&record.group_addr) {
            instance.state.statistics.errors.report += 1;
            instance.state.statistics.errors.total += 1;
            continue;
        }

        let sources = record.sources.into_iter().collect::<BTreeSet<_>>();
        match record.record_type {
            RecordType::ModeIsInclude => {
                group::process_mode_is_include(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
            RecordType::ModeIsExclude => {
                group::process_mode_is_exclude(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
            RecordType::ChangeToInclude => {
                group::process_change_to_include(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
            RecordType::ChangeToExclude => {
                group::process_change_to_exclude(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
            RecordType::AllowNewSources => {
                group::process_allow_new_sources(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
            RecordType::BlockOldSources => {
                group::process_block_old_sources(
                    iface,
                    instance,
                    record.group_addr,
                    &sources,
                    src,
                );
            }
        }
    }

    Ok(())
}

// ===== Leave Group / Listener Done =====

fn process_leave<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    src: V::IpAddr,
    leave: Leave<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Leaves for unknown groups carry no state.
    if !iface.groups.contains_key(&leave.group_addr) {
        return Ok(());
    }

    // IGMPv1 members report periodically and never send Leaves; while any
    // are present the Leave is disregarded.
    if group::leave_ignored(iface, &leave.group_addr) {
        return Ok(());
    }

    let no_sources = BTreeSet::new();
    group::process_change_to_include(
        iface,
        instance,
        leave.group_addr,
        &no_sources,
        src,
    );

    Ok(())
}

// ===== timer expiries =====

pub(crate) fn process_query_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    if !iface.state.is_querier {
        // Another querier took over in the meantime.
        return;
    }

    output::send_general_query(iface, instance);

    // Quick queries are sent while the startup counter runs down.
    if iface.state.startup_query_count > 0 {
        iface.state.startup_query_count -= 1;
    }
    let interval = if iface.state.startup_query_count > 0 {
        iface.startup_query_interval()
    } else {
        iface.state.effective_query_interval
    };
    iface.arm_query_timer(interval, instance);
}

pub(crate) fn process_other_querier_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    let Some(primary_addr) = iface.primary_addr() else {
        return;
    };

    // The previous querier has gone quiet; take over and send a General
    // Query at once.
    Debug::<V>::QuerierElect(&iface.name, &primary_addr).log();
    iface.state.other_querier_timer = None;
    iface.state.is_querier = true;
    iface.state.querier_addr = Some(primary_addr);
    iface.state.startup_query_count = 0;

    output::send_general_query(iface, instance);
    let interval = iface.state.effective_query_interval;
    iface.arm_query_timer(interval, instance);
}

pub(crate) fn process_group_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
    group_addr: V::IpAddr,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    group::process_group_timer_expiry(iface, instance, group_addr);
}

pub(crate) fn process_source_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
    group_addr: V::IpAddr,
    source_addr: V::IpAddr,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    group::process_source_timer_expiry(
        iface,
        instance,
        group_addr,
        source_addr,
    );
}

pub(crate) fn process_rexmit_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
    group_addr: V::IpAddr,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    group::process_rexmit_timer_expiry(iface, instance, group_addr);
}

pub(crate) fn process_compat_timer<V>(
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
    group_addr: V::IpAddr,
    version: u8,
) where
    V: Version,
{
    let Some(iface) = lookup_iface(interfaces, ifindex) else {
        return;
    };
    group::process_compat_timer_expiry(iface, group_addr, version);
}

// ===== helper functions =====

fn lookup_iface<V>(
    interfaces: &mut BTreeMap<String, Interface<V>>,
    ifindex: u32,
) -> Option<&mut Interface<V>>
where
    V: Version,
{
    interfaces
        .values_mut()
        .find(|iface| iface.system.ifindex == Some(ifindex))
        .filter(|iface| iface.state.active)
}
