//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// Membership state machine tests: instances are driven through their
// public message interfaces, with timer expiries injected explicitly so
// the scenarios run deterministically.
//

use const_addrs::ip4;
use tokio::sync::mpsc;
use velo_gmp::instance::Instance;
use velo_gmp::network::RxPacketInfo;
use velo_gmp::packet::{Leave, Packet, Report};
use velo_gmp::tasks::messages::ProtocolOutputMsg;
use velo_gmp::tasks::messages::input::{
    GroupTimerMsg, NetRxPacketMsg, OtherQuerierTimerMsg, RexmitTimerMsg,
};
use velo_gmp::tasks::messages::input::ProtocolMsg as ProtocolInputMsg;
use velo_gmp::version::Igmp;
use velo_protocol::{InstanceChannelsTx, InstanceShared, ProtocolInstance};
use velo_utils::ibus::{IbusChannelsRx, IbusMsg, ibus_channels};
use velo_utils::southbound::{AddressFlags, AddressMsg, InterfaceFlags, InterfaceUpdateMsg};

struct TestInstance {
    instance: Instance<Igmp>,
    ibus_rx: IbusChannelsRx,
    output_rx: mpsc::Receiver<ProtocolOutputMsg<Igmp>>,
}

// Creates an IGMP instance with one active interface.
fn test_instance(primary: &str) -> TestInstance {
    let ((ibus_tx, _ibus_tx_interface), ibus_rx) = ibus_channels();
    let (protocol_input_tx, _protocol_input_rx) =
        Instance::<Igmp>::protocol_input_channels();
    let (output_tx, output_rx) = mpsc::channel(64);

    let channels_tx =
        InstanceChannelsTx::new(ibus_tx, protocol_input_tx, output_tx);
    let mut instance = Instance::<Igmp>::new(
        "test".to_owned(),
        InstanceShared::default(),
        channels_tx,
    );
    instance.init();

    // Report the interface and its primary address.
    instance.process_ibus_msg(IbusMsg::InterfaceUpd(InterfaceUpdateMsg {
        ifname: "eth0".to_owned(),
        ifindex: 1,
        mtu: 1500,
        flags: InterfaceFlags::OPERATIVE | InterfaceFlags::MULTICAST,
    }));
    instance.process_ibus_msg(IbusMsg::InterfaceAddressAdd(AddressMsg {
        ifname: "eth0".to_owned(),
        addr: format!("{}/24", primary).parse().unwrap(),
        flags: AddressFlags::empty(),
    }));

    TestInstance {
        instance,
        ibus_rx,
        output_rx,
    }
}

// Receives the next message sent toward the upstream routing protocols.
fn recv_ibus(ibus_rx: &mut IbusChannelsRx) -> Option<IbusMsg> {
    ibus_rx.routing.try_recv().ok()
}

// Receives the next transmitted protocol packet.
async fn recv_packet(
    output_rx: &mut mpsc::Receiver<ProtocolOutputMsg<Igmp>>,
) -> Packet<Igmp> {
    let ProtocolOutputMsg::NetTxPacket(msg) = output_rx
        .recv()
        .await
        .expect("no packet was transmitted");
    msg.packet
}

#[tokio::test]
async fn startup_general_query() {
    let mut test = test_instance("10.0.0.1");

    // On startup the interface assumes the querier role and sends a
    // General Query at once.
    let iface = &test.instance.interfaces["eth0"];
    assert!(iface.state.active);
    assert!(iface.state.is_querier);

    let packet = recv_packet(&mut test.output_rx).await;
    let Packet::Query(query) = packet else {
        panic!("expected a General Query, got {:?}", packet);
    };
    assert_eq!(query.version, 2);
    assert_eq!(query.group_addr, ip4!("0.0.0.0"));
    // 10 seconds in tenths of a second.
    assert_eq!(query.max_resp_code, 100);
}

#[tokio::test]
async fn v2_join_leave() {
    let mut test = test_instance("10.0.0.1");

    // Skip the startup General Query.
    let _ = recv_packet(&mut test.output_rx).await;

    // A v2 Report creates the group and notifies a join with the
    // unspecified source address.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.2"),
            info: RxPacketInfo {
                dst: Some(ip4!("239.1.1.1")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Report(Report {
                version: 2,
                group_addr: ip4!("239.1.1.1"),
            })),
        },
    ));
    match recv_ibus(&mut test.ibus_rx) {
        Some(IbusMsg::MembershipAdd(msg)) => {
            assert_eq!(msg.ifindex, 1);
            assert_eq!(msg.source, ip4!("0.0.0.0"));
            assert_eq!(msg.group, ip4!("239.1.1.1"));
        }
        msg => panic!("expected a join notification, got {:?}", msg),
    }
    assert!(test.instance.interfaces["eth0"]
        .groups
        .contains_key(&ip4!("239.1.1.1")));

    // A Leave triggers a Group-Specific Query with a retransmission
    // pending.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.2"),
            info: RxPacketInfo {
                dst: Some(ip4!("224.0.0.2")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Leave(Leave {
                group_addr: ip4!("239.1.1.1"),
            })),
        },
    ));
    let packet = recv_packet(&mut test.output_rx).await;
    let Packet::Query(query) = packet else {
        panic!("expected a Group-Specific Query, got {:?}", packet);
    };
    assert_eq!(query.group_addr, ip4!("239.1.1.1"));
    // 1 second in tenths of a second.
    assert_eq!(query.max_resp_code, 10);
    {
        let group =
            &test.instance.interfaces["eth0"].groups[&ip4!("239.1.1.1")];
        assert_eq!(group.rexmit_count, 1);
    }

    // The query is retransmitted Last Member Query Count times in total.
    test.instance.process_protocol_msg(ProtocolInputMsg::RexmitTimer(
        RexmitTimerMsg {
            ifindex: 1,
            group_addr: ip4!("239.1.1.1"),
        },
    ));
    let packet = recv_packet(&mut test.output_rx).await;
    assert!(matches!(packet, Packet::Query(_)));

    // With no member reporting back, the group timer expiry deletes the
    // record and notifies the prune.
    test.instance.process_protocol_msg(ProtocolInputMsg::GroupTimer(
        GroupTimerMsg {
            ifindex: 1,
            group_addr: ip4!("239.1.1.1"),
        },
    ));
    match recv_ibus(&mut test.ibus_rx) {
        Some(IbusMsg::MembershipDel(msg)) => {
            assert_eq!(msg.source, ip4!("0.0.0.0"));
            assert_eq!(msg.group, ip4!("239.1.1.1"));
        }
        msg => panic!("expected a prune notification, got {:?}", msg),
    }
    assert!(!test.instance.interfaces["eth0"]
        .groups
        .contains_key(&ip4!("239.1.1.1")));
}

#[tokio::test]
async fn querier_yield_and_takeover() {
    use velo_gmp::packet::Query;

    let mut test = test_instance("10.0.0.2");
    let _ = recv_packet(&mut test.output_rx).await;

    // A General Query from a lower address takes the querier role over.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.1"),
            info: RxPacketInfo {
                dst: Some(ip4!("224.0.0.1")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Query(Query {
                version: 2,
                max_resp_code: 100,
                group_addr: ip4!("0.0.0.0"),
                ssm: None,
            })),
        },
    ));
    {
        let iface = &test.instance.interfaces["eth0"];
        assert!(!iface.state.is_querier);
        assert_eq!(iface.state.querier_addr, Some(ip4!("10.0.0.1")));
        assert!(iface.state.other_querier_timer.is_some());
    }

    // Once the other querier goes quiet, the interface takes the role
    // back and sends a General Query immediately.
    test.instance.process_protocol_msg(
        ProtocolInputMsg::OtherQuerierTimer(OtherQuerierTimerMsg {
            ifindex: 1,
        }),
    );
    {
        let iface = &test.instance.interfaces["eth0"];
        assert!(iface.state.is_querier);
        assert_eq!(iface.state.querier_addr, Some(ip4!("10.0.0.2")));
    }
    let packet = recv_packet(&mut test.output_rx).await;
    assert!(matches!(packet, Packet::Query(_)));
}

#[tokio::test]
async fn v1_compat_ignores_leave() {
    let mut test = test_instance("10.0.0.1");
    let _ = recv_packet(&mut test.output_rx).await;

    // A v1 Report arms the v1-host-present timer.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.3"),
            info: RxPacketInfo {
                dst: Some(ip4!("239.1.1.1")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Report(Report {
                version: 1,
                group_addr: ip4!("239.1.1.1"),
            })),
        },
    ));
    let _ = recv_ibus(&mut test.ibus_rx);

    // A Leave for the same group is disregarded while v1 hosts are
    // present: no query goes out and the group stays.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.2"),
            info: RxPacketInfo {
                dst: Some(ip4!("224.0.0.2")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Leave(Leave {
                group_addr: ip4!("239.1.1.1"),
            })),
        },
    ));
    let group = &test.instance.interfaces["eth0"].groups[&ip4!("239.1.1.1")];
    assert_eq!(group.rexmit_count, 0);
    assert!(group.rexmit_timer.is_none());
}

#[tokio::test]
async fn v3_source_filtering() {
    use velo_gmp::group::FilterMode;
    use velo_gmp::packet::{GroupRecord, RecordType, ReportSsm};

    let ((ibus_tx, _ibus_tx_interface), mut ibus_rx) = ibus_channels();
    let (protocol_input_tx, _protocol_input_rx) =
        Instance::<Igmp>::protocol_input_channels();
    let (output_tx, mut output_rx) = mpsc::channel(64);

    let channels_tx =
        InstanceChannelsTx::new(ibus_tx, protocol_input_tx, output_tx);
    let mut instance = Instance::<Igmp>::new(
        "test".to_owned(),
        InstanceShared::default(),
        channels_tx,
    );
    instance.init();

    // Switch the interface to IGMPv3 before it comes up.
    instance.process_ibus_msg(IbusMsg::InterfaceUpd(InterfaceUpdateMsg {
        ifname: "eth0".to_owned(),
        ifindex: 1,
        mtu: 1500,
        flags: InterfaceFlags::OPERATIVE | InterfaceFlags::MULTICAST,
    }));
    instance
        .interfaces
        .get_mut("eth0")
        .unwrap()
        .config
        .set_version(3)
        .unwrap();
    instance.process_ibus_msg(IbusMsg::InterfaceAddressAdd(AddressMsg {
        ifname: "eth0".to_owned(),
        addr: "10.0.0.1/24".parse().unwrap(),
        flags: AddressFlags::empty(),
    }));
    let _ = recv_packet(&mut output_rx).await;

    let rx_records = |records| {
        ProtocolInputMsg::NetRxPacket(NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("10.0.0.2"),
            info: RxPacketInfo {
                dst: Some(ip4!("239.2.2.2")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::ReportSsm(ReportSsm { records })),
        })
    };

    // ALLOW_NEW_SOURCES creates an INCLUDE record and joins the source.
    instance.process_protocol_msg(rx_records(vec![GroupRecord {
        record_type: RecordType::AllowNewSources,
        group_addr: ip4!("239.2.2.2"),
        sources: vec![ip4!("10.0.0.5")],
    }]));
    match ibus_rx.routing.try_recv() {
        Ok(IbusMsg::MembershipAdd(msg)) => {
            assert_eq!(msg.source, ip4!("10.0.0.5"));
            assert_eq!(msg.group, ip4!("239.2.2.2"));
        }
        msg => panic!("expected a source join, got {:?}", msg),
    }
    {
        let group = &instance.interfaces["eth0"].groups[&ip4!("239.2.2.2")];
        assert_eq!(group.filter_mode, FilterMode::Include);
        assert!(group.sources[&ip4!("10.0.0.5")].timer.is_some());
    }

    // MODE_IS_EXCLUDE with no sources switches the record to any-source
    // state: the group is joined as a whole, the include source is pruned.
    instance.process_protocol_msg(rx_records(vec![GroupRecord {
        record_type: RecordType::ModeIsExclude,
        group_addr: ip4!("239.2.2.2"),
        sources: vec![],
    }]));
    match ibus_rx.routing.try_recv() {
        Ok(IbusMsg::MembershipAdd(msg)) => {
            assert_eq!(msg.source, ip4!("0.0.0.0"));
        }
        msg => panic!("expected an any-source join, got {:?}", msg),
    }
    match ibus_rx.routing.try_recv() {
        Ok(IbusMsg::MembershipDel(msg)) => {
            assert_eq!(msg.source, ip4!("10.0.0.5"));
        }
        msg => panic!("expected a source prune, got {:?}", msg),
    }
    {
        let group = &instance.interfaces["eth0"].groups[&ip4!("239.2.2.2")];
        assert_eq!(group.filter_mode, FilterMode::Exclude);
        assert!(group.group_timer.is_some());
    }

    // CHANGE_TO_INCLUDE in EXCLUDE mode triggers a Group-Specific Query.
    instance.process_protocol_msg(rx_records(vec![GroupRecord {
        record_type: RecordType::ChangeToInclude,
        group_addr: ip4!("239.2.2.2"),
        sources: vec![],
    }]));
    let packet = recv_packet(&mut output_rx).await;
    let Packet::Query(query) = packet else {
        panic!("expected a Group-Specific Query, got {:?}", packet);
    };
    assert_eq!(query.version, 3);
    assert_eq!(query.group_addr, ip4!("239.2.2.2"));
    assert!(query.ssm.is_some());
}

#[tokio::test]
async fn source_not_directly_connected() {
    let mut test = test_instance("10.0.0.1");
    let _ = recv_packet(&mut test.output_rx).await;

    // Reports from an off-subnet source are dropped.
    test.instance.process_protocol_msg(ProtocolInputMsg::NetRxPacket(
        NetRxPacketMsg {
            ifindex: 1,
            src: ip4!("192.168.1.2"),
            info: RxPacketInfo {
                dst: Some(ip4!("239.1.1.1")),
                ttl: Some(1),
                router_alert: Some(true),
            },
            packet: Ok(Packet::Report(Report {
                version: 2,
                group_addr: ip4!("239.1.1.1"),
            })),
        },
    ));
    assert!(recv_ibus(&mut test.ibus_rx).is_none());
    assert!(test.instance.interfaces["eth0"].groups.is_empty());
}
