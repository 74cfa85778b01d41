//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// Per-group multicast listener state.
//
// A group record tracks the router-side filter mode and per-source timers
// of RFC 3376 Section 6.4 and RFC 3810 Section 7.4. In INCLUDE mode every
// source carries a running timer; in EXCLUDE mode the sources with a
// running timer form the "requested" list and the ones without form the
// "exclude" list. The record exists only while at least one listener timer
// is running.
//

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use velo_utils::ip::IpAddrKind;
use velo_utils::protocol::Protocol;
use velo_utils::southbound::MembershipMsg;
use velo_utils::task::TimeoutTask;

use crate::debug::Debug;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::output;
use crate::tasks;
use crate::version::Version;

#[derive(Debug)]
pub struct Group<V: Version> {
    /// Multicast group address.
    pub group_addr: V::IpAddr,
    /// Router-side filter mode.
    pub filter_mode: FilterMode,
    /// Per-source state.
    pub sources: BTreeMap<V::IpAddr, SourceRecord>,
    /// Group membership timer (EXCLUDE mode only).
    pub group_timer: Option<TimeoutTask>,
    /// Last-member query retransmission state.
    pub rexmit_timer: Option<TimeoutTask>,
    pub rexmit_count: u8,
    pub rexmit_sources: BTreeSet<V::IpAddr>,
    /// Older-version-host-present timers, keyed by protocol version.
    pub compat_timers: BTreeMap<u8, TimeoutTask>,
    /// Address of the host that last reported membership.
    pub last_reporter: Option<V::IpAddr>,
    /// Time when the group was created.
    pub created: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SourceRecord {
    /// Source timer; `None` marks an EXCLUDE-mode source that is not
    /// forwarded.
    pub timer: Option<TimeoutTask>,
}

/// Router-side filter mode (RFC 3376 Section 6.2.1).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

// ===== impl Group =====

impl<V> Group<V>
where
    V: Version,
{
    pub(crate) fn new(group_addr: V::IpAddr) -> Group<V> {
        Debug::<V>::GroupCreate(&group_addr).log();

        Group {
            group_addr,
            filter_mode: FilterMode::Include,
            sources: Default::default(),
            group_timer: None,
            rexmit_timer: None,
            rexmit_count: 0,
            rexmit_sources: Default::default(),
            compat_timers: Default::default(),
            last_reporter: None,
            created: Utc::now(),
        }
    }

    // Returns the protocol version the group is effectively operating in,
    // taking the older-version-host-present timers into account.
    pub(crate) fn compat_version(&self, configured: u8) -> u8 {
        for version in V::VERSION_MIN..configured {
            if self.compat_timers.contains_key(&version) {
                return version;
            }
        }
        configured
    }

    // Sources that currently have a running timer.
    pub(crate) fn forwarded_sources(&self) -> Vec<V::IpAddr> {
        self.sources
            .iter()
            .filter(|(_, record)| record.timer.is_some())
            .map(|(addr, _)| *addr)
            .collect()
    }
}

// ===== membership notifications =====

// Notifies the upstream multicast routing protocols that traffic for
// (source, group) must now be forwarded on the interface. The unspecified
// source address stands for any-source state.
pub(crate) fn notify_join<V>(
    instance: &InstanceUpView<'_, V>,
    ifindex: u32,
    source: Option<V::IpAddr>,
    group: V::IpAddr,
) where
    V: Version,
{
    let source_addr = source.unwrap_or_else(V::IpAddr::unspecified);
    Debug::<V>::JoinNotify(&source_addr, &group).log();

    instance.tx.ibus.membership_add(MembershipMsg {
        ifindex,
        source: source_addr.into(),
        group: group.into(),
    });
}

// The reverse transition of `notify_join`.
pub(crate) fn notify_prune<V>(
    instance: &InstanceUpView<'_, V>,
    ifindex: u32,
    source: Option<V::IpAddr>,
    group: V::IpAddr,
) where
    V: Version,
{
    let source_addr = source.unwrap_or_else(V::IpAddr::unspecified);
    Debug::<V>::PruneNotify(&source_addr, &group).log();

    instance.tx.ibus.membership_del(MembershipMsg {
        ifindex,
        source: source_addr.into(),
        group: group.into(),
    });
}

// Withdraws every join previously notified for the group.
pub(crate) fn notify_prune_all<V>(
    instance: &InstanceUpView<'_, V>,
    ifindex: u32,
    group: &Group<V>,
) where
    V: Version,
{
    match group.filter_mode {
        FilterMode::Include => {
            for source in group.sources.keys() {
                notify_prune(instance, ifindex, Some(*source), group.group_addr);
            }
        }
        FilterMode::Exclude => {
            notify_prune(instance, ifindex, None, group.group_addr);
        }
    }
}

// ===== report processing (RFC 3376 Section 6.4, RFC 3810 Section 7.4) =====

// MODE_IS_INCLUDE and ALLOW_NEW_SOURCES share the same state transition:
// the listed sources get their timers set to the group membership interval.
pub(crate) fn process_mode_is_include<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();
    let gmi = iface.group_membership_interval();

    // An empty MODE_IS_INCLUDE carries no listener state.
    if sources.is_empty() && !iface.groups.contains_key(&group_addr) {
        return;
    }

    let group = iface
        .groups
        .entry(group_addr)
        .or_insert_with(|| Group::new(group_addr));
    group.last_reporter = Some(host);

    for source in sources {
        let is_new = group.filter_mode == FilterMode::Include
            && !group.sources.contains_key(source);
        set_source_timer(
            group,
            ifindex,
            group_addr,
            *source,
            gmi,
            instance,
        );
        if is_new {
            notify_join(instance, ifindex, Some(*source), group_addr);
        }
    }
}

pub(crate) fn process_allow_new_sources<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    process_mode_is_include(iface, instance, group_addr, sources, host);
}

// MODE_IS_EXCLUDE: the router filter mode becomes EXCLUDE and the group
// timer is refreshed. With an empty source list this is also the state
// transition of the older-version (IGMPv1/v2, MLDv1) reports.
pub(crate) fn process_mode_is_exclude<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();
    let gmi = iface.group_membership_interval();

    let group = iface
        .groups
        .entry(group_addr)
        .or_insert_with(|| Group::new(group_addr));
    group.last_reporter = Some(host);

    let mut removed_include_sources = vec![];
    match group.filter_mode {
        FilterMode::Include => {
            // New state: EXCLUDE (A*B, B-A). Include sources absent from
            // the message are deleted; the remaining ones keep their
            // timers.
            group
                .sources
                .retain(|source, _| {
                    if sources.contains(source) {
                        true
                    } else {
                        removed_include_sources.push(*source);
                        false
                    }
                });
            for source in sources {
                group
                    .sources
                    .entry(*source)
                    .or_insert_with(SourceRecord::default);
            }
            group.filter_mode = FilterMode::Exclude;

            // Any-source forwarding is now in effect.
            notify_join(instance, ifindex, None, group_addr);
            for source in removed_include_sources.drain(..) {
                notify_prune(instance, ifindex, Some(source), group_addr);
            }
        }
        FilterMode::Exclude => {
            // New state: EXCLUDE (A-Y, Y*A). Sources absent from the
            // message are deleted; new ones start a fresh timer.
            group.sources.retain(|source, _| sources.contains(source));
            for source in sources {
                if !group.sources.contains_key(source) {
                    set_source_timer(
                        group,
                        ifindex,
                        group_addr,
                        *source,
                        gmi,
                        instance,
                    );
                }
            }
        }
    }

    set_group_timer(group, ifindex, group_addr, gmi, instance);
}

// CHANGE_TO_INCLUDE_MODE. An IGMPv2 Leave or MLDv1 Done is processed as
// this transition with an empty source list.
pub(crate) fn process_change_to_include<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();
    let gmi = iface.group_membership_interval();

    if !iface.groups.contains_key(&group_addr) && sources.is_empty() {
        return;
    }

    let mut queried_sources = BTreeSet::new();
    {
        let group = iface
            .groups
            .entry(group_addr)
            .or_insert_with(|| Group::new(group_addr));
        group.last_reporter = Some(host);

        for source in sources {
            let is_new = group.filter_mode == FilterMode::Include
                && !group.sources.contains_key(source);
            set_source_timer(
                group,
                ifindex,
                group_addr,
                *source,
                gmi,
                instance,
            );
            if is_new {
                notify_join(instance, ifindex, Some(*source), group_addr);
            }
        }

        // The sources still being forwarded but absent from the new
        // include list must be queried before they are timed out.
        queried_sources.extend(
            group
                .sources
                .iter()
                .filter(|(source, record)| {
                    record.timer.is_some() && !sources.contains(*source)
                })
                .map(|(source, _)| *source),
        );
    }

    query_sources(iface, instance, group_addr, &queried_sources);

    // In EXCLUDE mode the whole group must additionally be queried.
    if iface.groups[&group_addr].filter_mode == FilterMode::Exclude {
        query_group(iface, instance, group_addr);
    }
}

// CHANGE_TO_EXCLUDE_MODE.
pub(crate) fn process_change_to_exclude<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();
    let gmi = iface.group_membership_interval();
    let configured_version = iface.config.version;

    // Hosts running an older protocol version do not use source filters;
    // while any are present the source list is disregarded
    // (RFC 3376 Section 7.3.2).
    let no_sources = BTreeSet::new();
    let sources = match iface.groups.get(&group_addr) {
        Some(group)
            if group.compat_version(configured_version) < V::VERSION_SSM =>
        {
            &no_sources
        }
        _ => sources,
    };

    let mut queried_sources = BTreeSet::new();
    {
        let group = iface
            .groups
            .entry(group_addr)
            .or_insert_with(|| Group::new(group_addr));
        group.last_reporter = Some(host);

        match group.filter_mode {
            FilterMode::Include => {
                // New state: EXCLUDE (A*B, B-A), followed by a query of
                // the surviving sources.
                let mut removed = vec![];
                group.sources.retain(|source, _| {
                    if sources.contains(source) {
                        true
                    } else {
                        removed.push(*source);
                        false
                    }
                });
                for source in sources {
                    group
                        .sources
                        .entry(*source)
                        .or_insert_with(SourceRecord::default);
                }
                group.filter_mode = FilterMode::Exclude;

                notify_join(instance, ifindex, None, group_addr);
                for source in removed {
                    notify_prune(instance, ifindex, Some(source), group_addr);
                }
            }
            FilterMode::Exclude => {
                // New state: EXCLUDE (A-Y, Y*A); sources newly learned
                // inherit the remaining group timer.
                let group_timer_remaining = group
                    .group_timer
                    .as_ref()
                    .map(|timer| timer.remaining())
                    .unwrap_or(Duration::ZERO);
                group.sources.retain(|source, _| sources.contains(source));
                for source in sources {
                    if !group.sources.contains_key(source) {
                        set_source_timer(
                            group,
                            ifindex,
                            group_addr,
                            *source,
                            group_timer_remaining,
                            instance,
                        );
                    }
                }
            }
        }

        queried_sources.extend(
            group
                .sources
                .iter()
                .filter(|(_, record)| record.timer.is_some())
                .map(|(source, _)| *source),
        );

        set_group_timer(group, ifindex, group_addr, gmi, instance);
    }

    query_sources(iface, instance, group_addr, &queried_sources);
}

// BLOCK_OLD_SOURCES.
pub(crate) fn process_block_old_sources<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
    host: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();
    let configured_version = iface.config.version;

    let Some(group) = iface.groups.get_mut(&group_addr) else {
        return;
    };

    // Hosts running an older protocol version do not use source filters;
    // BLOCK messages are disregarded while any are present
    // (RFC 3376 Section 7.3.2).
    if group.compat_version(configured_version) < V::VERSION_SSM {
        return;
    }
    group.last_reporter = Some(host);

    let mut queried_sources = BTreeSet::new();
    match group.filter_mode {
        FilterMode::Include => {
            // Query the blocked sources that are currently forwarded.
            queried_sources.extend(
                sources
                    .iter()
                    .filter(|source| group.sources.contains_key(*source))
                    .copied(),
            );
        }
        FilterMode::Exclude => {
            // Sources not yet known inherit the remaining group timer,
            // then every blocked source still being forwarded is queried.
            let group_timer_remaining = group
                .group_timer
                .as_ref()
                .map(|timer| timer.remaining())
                .unwrap_or(Duration::ZERO);
            for source in sources {
                if !group.sources.contains_key(source) {
                    set_source_timer(
                        group,
                        ifindex,
                        group_addr,
                        *source,
                        group_timer_remaining,
                        instance,
                    );
                }
            }
            queried_sources.extend(
                sources
                    .iter()
                    .filter(|source| {
                        group
                            .sources
                            .get(*source)
                            .map(|record| record.timer.is_some())
                            .unwrap_or(false)
                    })
                    .copied(),
            );
        }
    }

    query_sources(iface, instance, group_addr, &queried_sources);
}

// Records that an older-version membership report was received for the
// group, keeping it in compatibility mode for the older-version-host
// present interval.
pub(crate) fn received_older_report<V>(
    iface: &mut Interface<V>,
    instance: &InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    msg_version: u8,
) where
    V: Version,
{
    if msg_version >= iface.config.version {
        return;
    }

    let ifindex = iface.system.ifindex.unwrap();
    let interval = iface.older_version_host_present_interval();
    let Some(group) = iface.groups.get_mut(&group_addr) else {
        return;
    };

    Debug::<V>::GroupCompatModeChange(&group_addr, msg_version).log();
    group.compat_timers.insert(
        msg_version,
        tasks::compat_timer(
            ifindex,
            group_addr,
            msg_version,
            interval,
            &instance.tx.protocol_input.compat_timer,
        ),
    );
}

// ===== query origination helpers =====

// Lowers the group timer to the Last Member Query Time and, when querier,
// sends a Group-Specific Query with retransmissions pending.
pub(crate) fn query_group<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
) where
    V: Version,
{
    let lmqt = iface.last_member_query_time();
    let lmqc = iface.last_member_query_count();
    let lmqi = iface.config.last_member_query_interval();
    let ifindex = iface.system.ifindex.unwrap();
    let is_querier = iface.state.is_querier;

    {
        let Some(group) = iface.groups.get_mut(&group_addr) else {
            return;
        };
        lower_group_timer(group, lmqt);
    }

    if is_querier {
        output::send_group_query(iface, instance, group_addr, &[]);

        let group = iface.groups.get_mut(&group_addr).unwrap();
        group.rexmit_count = lmqc.saturating_sub(1);
        if group.rexmit_count > 0 {
            group.rexmit_timer = Some(tasks::rexmit_timer(
                ifindex,
                group_addr,
                lmqi,
                &instance.tx.protocol_input.rexmit_timer,
            ));
        }
    }
}

// Lowers the given source timers to the Last Member Query Time and, when
// querier, sends a Group-and-Source-Specific Query with retransmissions
// pending.
pub(crate) fn query_sources<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    sources: &BTreeSet<V::IpAddr>,
) where
    V: Version,
{
    if sources.is_empty() {
        return;
    }

    let lmqt = iface.last_member_query_time();
    let lmqc = iface.last_member_query_count();
    let lmqi = iface.config.last_member_query_interval();
    let ifindex = iface.system.ifindex.unwrap();
    let is_querier = iface.state.is_querier;

    {
        let Some(group) = iface.groups.get_mut(&group_addr) else {
            return;
        };
        for source in sources {
            if let Some(record) = group.sources.get_mut(source) {
                if let Some(timer) = record.timer.as_mut()
                    && timer.remaining() > lmqt
                {
                    timer.reset(Some(lmqt));
                }
            }
        }
    }

    if is_querier {
        let source_list = sources.iter().copied().collect::<Vec<_>>();
        output::send_group_query(iface, instance, group_addr, &source_list);

        let group = iface.groups.get_mut(&group_addr).unwrap();
        group.rexmit_sources.extend(sources.iter().copied());
        group.rexmit_count = group.rexmit_count.max(lmqc.saturating_sub(1));
        if group.rexmit_count > 0 {
            group.rexmit_timer = Some(tasks::rexmit_timer(
                ifindex,
                group_addr,
                lmqi,
                &instance.tx.protocol_input.rexmit_timer,
            ));
        }
    }
}

// Lowers the group timer, never raising it (RFC 2236 Section 3,
// RFC 2710 Section 4).
pub(crate) fn lower_group_timer<V>(group: &mut Group<V>, timeout: Duration)
where
    V: Version,
{
    if let Some(timer) = group.group_timer.as_mut()
        && timer.remaining() > timeout
    {
        timer.reset(Some(timeout));
    }
}

// Lowers the timers of the given sources, never raising them.
pub(crate) fn lower_source_timers<V>(
    group: &mut Group<V>,
    sources: &BTreeSet<V::IpAddr>,
    timeout: Duration,
) where
    V: Version,
{
    for source in sources {
        if let Some(record) = group.sources.get_mut(source)
            && let Some(timer) = record.timer.as_mut()
            && timer.remaining() > timeout
        {
            timer.reset(Some(timeout));
        }
    }
}

// ===== timer expiry processing =====

// Group timer expiry: in EXCLUDE mode the record falls back to INCLUDE of
// the sources still carrying a running timer, or is deleted when none
// remain.
pub(crate) fn process_group_timer_expiry<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();

    let no_sources_left = {
        let Some(group) = iface.groups.get_mut(&group_addr) else {
            return;
        };
        group.group_timer = None;

        if group.filter_mode != FilterMode::Exclude {
            return;
        }

        // Drop the excluded (non-forwarded) sources.
        group.sources.retain(|_, record| record.timer.is_some());
        group.sources.is_empty()
    };

    if no_sources_left {
        // No listeners remain.
        let group = iface.groups.remove(&group_addr).unwrap();
        Debug::<V>::GroupDelete(&group_addr).log();
        notify_prune_all(instance, ifindex, &group);
    } else {
        // Fall back to INCLUDE mode of the remaining sources.
        let group = iface.groups.get_mut(&group_addr).unwrap();
        group.filter_mode = FilterMode::Include;
        notify_prune(instance, ifindex, None, group_addr);
        let sources = group.forwarded_sources();
        for source in sources {
            notify_join(instance, ifindex, Some(source), group_addr);
        }
    }
}

// Source timer expiry.
pub(crate) fn process_source_timer_expiry<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
    source_addr: V::IpAddr,
) where
    V: Version,
{
    let ifindex = iface.system.ifindex.unwrap();

    let Some(group) = iface.groups.get_mut(&group_addr) else {
        return;
    };

    let group_empty = match group.filter_mode {
        FilterMode::Include => {
            // Stop forwarding and delete the source; the whole record goes
            // away with the last one.
            if group.sources.remove(&source_addr).is_some() {
                notify_prune(instance, ifindex, Some(source_addr), group_addr);
            }
            group.sources.is_empty()
        }
        FilterMode::Exclude => {
            // The source moves to the exclude list and is no longer
            // forwarded; any-source state is unaffected.
            if let Some(record) = group.sources.get_mut(&source_addr) {
                record.timer = None;
            }
            false
        }
    };

    if group_empty {
        iface.groups.remove(&group_addr);
        Debug::<V>::GroupDelete(&group_addr).log();
    }
}

// Last-member query retransmission timer expiry.
pub(crate) fn process_rexmit_timer_expiry<V>(
    iface: &mut Interface<V>,
    instance: &mut InstanceUpView<'_, V>,
    group_addr: V::IpAddr,
) where
    V: Version,
{
    let lmqi = iface.config.last_member_query_interval();
    let ifindex = iface.system.ifindex.unwrap();
    let is_querier = iface.state.is_querier;

    let sources = {
        let Some(group) = iface.groups.get_mut(&group_addr) else {
            return;
        };
        group.rexmit_timer = None;

        if !is_querier || group.rexmit_count == 0 {
            group.rexmit_count = 0;
            group.rexmit_sources.clear();
            return;
        }
        group.rexmit_count -= 1;
        group.rexmit_sources.iter().copied().collect::<Vec<_>>()
    };

    output::send_group_query(iface, instance, group_addr, &sources);

    let group = iface.groups.get_mut(&group_addr).unwrap();
    if group.rexmit_count > 0 {
        group.rexmit_timer = Some(tasks::rexmit_timer(
            ifindex,
            group_addr,
            lmqi,
            &instance.tx.protocol_input.rexmit_timer,
        ));
    } else {
        group.rexmit_sources.clear();
    }
}

// Older-version-host-present timer expiry: the group reverts to the
// configured protocol version.
pub(crate) fn process_compat_timer_expiry<V>(
    iface: &mut Interface<V>,
    group_addr: V::IpAddr,
    version: u8,
) where
    V: Version,
{
    if let Some(group) = iface.groups.get_mut(&group_addr) {
        group.compat_timers.remove(&version);
    }
}

// Returns whether an IGMPv2 Leave must be disregarded because IGMPv1 hosts
// are still present (RFC 2236 Section 5).
pub(crate) fn leave_ignored<V>(iface: &Interface<V>, group_addr: &V::IpAddr) -> bool
where
    V: Version,
{
    if V::PROTOCOL != Protocol::IGMP {
        return false;
    }
    match iface.groups.get(group_addr) {
        Some(group) => group.compat_version(iface.config.version) == 1,
        None => false,
    }
}

// ===== helper functions =====

// (Re)arms the timer of a single source.
fn set_source_timer<V>(
    group: &mut Group<V>,
    ifindex: u32,
    group_addr: V::IpAddr,
    source_addr: V::IpAddr,
    timeout: Duration,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    let record = group.sources.entry(source_addr).or_default();
    record.timer = Some(tasks::source_timer(
        ifindex,
        group_addr,
        source_addr,
        timeout,
        &instance.tx.protocol_input.source_timer,
    ));
}

// (Re)arms the group timer.
fn set_group_timer<V>(
    group: &mut Group<V>,
    ifindex: u32,
    group_addr: V::IpAddr,
    timeout: Duration,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    group.group_timer = Some(tasks::group_timer(
        ifindex,
        group_addr,
        timeout,
        &instance.tx.protocol_input.group_timer,
    ));
}
