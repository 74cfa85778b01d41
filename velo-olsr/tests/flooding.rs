//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//
//
// Neighbor discovery, flooding and route computation tests: the instance
// is driven through its public message interfaces, with timer expiries and
// coalesced background work injected explicitly so the scenarios run
// deterministically.
//

use const_addrs::ip4;
use tokio::sync::mpsc;
use velo_olsr::instance::Instance;
use velo_olsr::packet::{
    HelloMessage, LinkCode, LinkType, Message, MessageBody, MessageHdr,
    NeighborType, Packet, TcMessage, WILL_DEFAULT, encode_vtime,
};
use velo_olsr::tasks::messages::ProtocolOutputMsg;
use velo_olsr::tasks::messages::input::{
    HelloIntervalMsg, MprRecountMsg, NetRxPacketMsg,
    ProtocolMsg as ProtocolInputMsg, RouteUpdateMsg,
};
use velo_protocol::{InstanceChannelsTx, InstanceShared, ProtocolInstance};
use velo_utils::ibus::{IbusChannelsRx, IbusMsg, ibus_channels};
use velo_utils::southbound::{
    AddressFlags, AddressMsg, InterfaceFlags, InterfaceUpdateMsg,
};

struct TestInstance {
    instance: Instance,
    ibus_rx: IbusChannelsRx,
    output_rx: mpsc::Receiver<ProtocolOutputMsg>,
}

// Creates an OLSR instance with one active interface.
fn test_instance(primary: &str) -> TestInstance {
    let ((ibus_tx, _ibus_tx_interface), ibus_rx) = ibus_channels();
    let (protocol_input_tx, _protocol_input_rx) =
        Instance::protocol_input_channels();
    let (output_tx, output_rx) = mpsc::channel(64);

    let channels_tx =
        InstanceChannelsTx::new(ibus_tx, protocol_input_tx, output_tx);
    let mut instance = Instance::new(
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
        flags: InterfaceFlags::OPERATIVE | InterfaceFlags::BROADCAST,
    }));
    instance.process_ibus_msg(IbusMsg::InterfaceAddressAdd(AddressMsg {
        ifname: "eth0".to_owned(),
        addr: format!("{}/24", primary).parse().unwrap(),
        flags: AddressFlags::empty(),
    }));

    // Leak the protocol input receiver so the scheduled background work
    // requests keep a live channel; the tests inject those messages
    // explicitly instead.
    std::mem::forget(_protocol_input_rx);

    TestInstance {
        instance,
        ibus_rx,
        output_rx,
    }
}

async fn recv_packet(
    output_rx: &mut mpsc::Receiver<ProtocolOutputMsg>,
) -> Packet {
    let ProtocolOutputMsg::NetTxPacket(msg) =
        output_rx.recv().await.expect("no packet was transmitted");
    msg.packet
}

// Returns the next transmitted packet, if any.
async fn try_recv_packet(
    output_rx: &mut mpsc::Receiver<ProtocolOutputMsg>,
) -> Option<Packet> {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    output_rx
        .try_recv()
        .ok()
        .map(|ProtocolOutputMsg::NetTxPacket(msg)| msg.packet)
}

// Builds a HELLO received from a direct neighbor.
fn hello_from(
    origin: &str,
    seqno: u16,
    links: Vec<(LinkCode, Vec<std::net::Ipv4Addr>)>,
) -> Packet {
    Packet {
        seqno,
        messages: vec![Message {
            hdr: MessageHdr {
                vtime: encode_vtime(std::time::Duration::from_secs(6)),
                origin: origin.parse().unwrap(),
                ttl: 1,
                hops: 0,
                seqno,
            },
            body: MessageBody::Hello(HelloMessage {
                htime: encode_vtime(std::time::Duration::from_secs(2)),
                willingness: WILL_DEFAULT,
                links,
            }),
        }],
    }
}

fn rx(ifindex: u32, src: &str, packet: Packet) -> ProtocolInputMsg {
    ProtocolInputMsg::NetRxPacket(NetRxPacketMsg {
        ifindex,
        src: src.parse().unwrap(),
        packet: Ok(packet),
    })
}

#[tokio::test]
async fn hello_advertises_neighborhood() {
    let mut test = test_instance("192.0.2.1");

    // The first HELLO goes out with an empty link list.
    test.instance.process_protocol_msg(ProtocolInputMsg::HelloInterval(
        HelloIntervalMsg { ifindex: 1 },
    ));
    let packet = recv_packet(&mut test.output_rx).await;
    let MessageBody::Hello(hello) = &packet.messages[0].body else {
        panic!("expected a HELLO, got {:?}", packet);
    };
    assert!(hello.links.is_empty());
    assert_eq!(packet.messages[0].hdr.ttl, 1);

    // A HELLO that does not list our address creates an asymmetric link,
    // advertised as such in the next HELLO.
    test.instance.process_protocol_msg(rx(
        1,
        "192.0.2.2",
        hello_from("192.0.2.2", 1, vec![]),
    ));
    test.instance.process_protocol_msg(ProtocolInputMsg::HelloInterval(
        HelloIntervalMsg { ifindex: 1 },
    ));
    let packet = recv_packet(&mut test.output_rx).await;
    let MessageBody::Hello(hello) = &packet.messages[0].body else {
        panic!("expected a HELLO, got {:?}", packet);
    };
    assert_eq!(
        hello.links,
        vec![(
            LinkCode {
                neighbor_type: NeighborType::Not,
                link_type: LinkType::Asym,
            },
            vec![ip4!("192.0.2.2")],
        )]
    );

    // Once the neighbor echoes our address, the link becomes symmetric.
    test.instance.process_protocol_msg(rx(
        1,
        "192.0.2.2",
        hello_from(
            "192.0.2.2",
            2,
            vec![(
                LinkCode {
                    neighbor_type: NeighborType::Not,
                    link_type: LinkType::Asym,
                },
                vec![ip4!("192.0.2.1")],
            )],
        ),
    ));
    test.instance.process_protocol_msg(ProtocolInputMsg::HelloInterval(
        HelloIntervalMsg { ifindex: 1 },
    ));
    let packet = recv_packet(&mut test.output_rx).await;
    let MessageBody::Hello(hello) = &packet.messages[0].body else {
        panic!("expected a HELLO, got {:?}", packet);
    };
    assert_eq!(
        hello.links,
        vec![(
            LinkCode {
                neighbor_type: NeighborType::Sym,
                link_type: LinkType::Sym,
            },
            vec![ip4!("192.0.2.2")],
        )]
    );
}

#[tokio::test]
async fn flooding_and_routes() {
    let mut test = test_instance("192.0.2.1");

    // Become symmetric with 192.0.2.2, which selects us as an MPR and
    // reaches the two-hop neighbor 192.0.2.5.
    test.instance.process_protocol_msg(rx(
        1,
        "192.0.2.2",
        hello_from("192.0.2.2", 1, vec![]),
    ));
    test.instance.process_protocol_msg(rx(
        1,
        "192.0.2.2",
        hello_from(
            "192.0.2.2",
            2,
            vec![
                (
                    LinkCode {
                        neighbor_type: NeighborType::Mpr,
                        link_type: LinkType::Sym,
                    },
                    vec![ip4!("192.0.2.1")],
                ),
                (
                    LinkCode {
                        neighbor_type: NeighborType::Sym,
                        link_type: LinkType::Sym,
                    },
                    vec![ip4!("192.0.2.5")],
                ),
            ],
        ),
    ));

    // Run the coalesced background work.
    test.instance
        .process_protocol_msg(ProtocolInputMsg::MprRecount(MprRecountMsg {}));
    test.instance
        .process_protocol_msg(ProtocolInputMsg::RouteUpdate(RouteUpdateMsg {}));

    // Host routes toward the neighbor and the two-hop neighbor.
    let mut installed = vec![];
    while let Ok(msg) = test.ibus_rx.routing.try_recv() {
        if let IbusMsg::RouteIpAdd(msg) = msg {
            installed.push(msg.prefix.to_string());
        }
    }
    assert!(installed.contains(&"192.0.2.2/32".to_owned()));
    assert!(installed.contains(&"192.0.2.5/32".to_owned()));

    // A TC originated by the two-hop neighbor and relayed by our MPR
    // selector is processed and forwarded.
    let tc = Packet {
        seqno: 3,
        messages: vec![Message {
            hdr: MessageHdr {
                vtime: encode_vtime(std::time::Duration::from_secs(15)),
                origin: ip4!("192.0.2.5"),
                ttl: 254,
                hops: 1,
                seqno: 10,
            },
            body: MessageBody::Tc(TcMessage {
                ansn: 5,
                neighbors: vec![ip4!("192.0.2.7")],
            }),
        }],
    };
    test.instance.process_protocol_msg(rx(1, "192.0.2.2", tc.clone()));

    let forwarded = recv_packet(&mut test.output_rx).await;
    assert_eq!(forwarded.messages[0].hdr.ttl, 253);
    assert_eq!(forwarded.messages[0].hdr.hops, 2);
    assert!(matches!(
        forwarded.messages[0].body,
        MessageBody::Tc(_)
    ));

    // The advertised destination becomes routable through the TC origin.
    test.instance
        .process_protocol_msg(ProtocolInputMsg::RouteUpdate(RouteUpdateMsg {}));
    let mut installed = vec![];
    while let Ok(msg) = test.ibus_rx.routing.try_recv() {
        if let IbusMsg::RouteIpAdd(msg) = msg {
            installed.push(msg.prefix.to_string());
        }
    }
    assert!(installed.contains(&"192.0.2.7/32".to_owned()));

    // A duplicate of the same TC is neither reprocessed nor forwarded.
    test.instance.process_protocol_msg(rx(1, "192.0.2.2", tc));
    assert!(try_recv_packet(&mut test.output_rx).await.is_none());
}
