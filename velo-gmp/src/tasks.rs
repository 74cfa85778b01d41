//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{Sender, UnboundedReceiver};
use tracing::{Instrument, debug_span};
use velo_utils::socket::{AsyncFd, Socket};
use velo_utils::task::{Task, TimeoutTask};

use crate::network;
use crate::version::Version;

//
// Group-membership tasks diagram:
//                                 +--------------+
//                 net_rx (Nx) ->  |              |
//            query_timer (Nx) ->  |              |
//    other_querier_timer (Nx) ->  |              |
//            group_timer (Nx) ->  |   instance   | -> (Nx) net_tx
//           source_timer (Nx) ->  |              |
//           rexmit_timer (Nx) ->  |              |
//           compat_timer (Nx) ->  |              |
//                                 +--------------+
//                          ibus_tx (1x) | ^ (1x) ibus_rx
//                                       | |
//                                       V |
//                                 +--------------+
//                                 |     ibus     |
//                                 +--------------+
//

// Group-membership inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    use crate::network::RxPacketInfo;
    use crate::packet::{DecodeError, Packet};
    use crate::version::Version;

    // Type aliases.
    pub type ProtocolInputMsg<V> = input::ProtocolMsg<V>;
    pub type ProtocolOutputMsg<V> = output::ProtocolMsg<V>;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            NetRxPacket(NetRxPacketMsg<V>),
            QueryTimer(QueryTimerMsg),
            OtherQuerierTimer(OtherQuerierTimerMsg),
            GroupTimer(GroupTimerMsg<V>),
            SourceTimer(SourceTimerMsg<V>),
            RexmitTimer(RexmitTimerMsg<V>),
            CompatTimer(CompatTimerMsg<V>),
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetRxPacketMsg<V: Version> {
            pub ifindex: u32,
            pub src: V::IpAddr,
            pub info: RxPacketInfo<V>,
            pub packet: Result<Packet<V>, DecodeError>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct QueryTimerMsg {
            pub ifindex: u32,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct OtherQuerierTimerMsg {
            pub ifindex: u32,
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct GroupTimerMsg<V: Version> {
            pub ifindex: u32,
            pub group_addr: V::IpAddr,
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct SourceTimerMsg<V: Version> {
            pub ifindex: u32,
            pub group_addr: V::IpAddr,
            pub source_addr: V::IpAddr,
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct RexmitTimerMsg<V: Version> {
            pub ifindex: u32,
            pub group_addr: V::IpAddr,
        }

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct CompatTimerMsg<V: Version> {
            pub ifindex: u32,
            pub group_addr: V::IpAddr,
            pub version: u8,
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            NetTxPacket(NetTxPacketMsg<V>),
        }

        #[derive(Debug, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetTxPacketMsg<V: Version> {
            #[cfg(feature = "testing")]
            pub ifname: String,
            pub src: V::IpAddr,
            pub dst: V::IpAddr,
            pub packet: Packet<V>,
        }
    }
}

// ===== Group-membership tasks =====

// Network Rx task.
pub(crate) fn net_rx<V>(
    socket: Arc<AsyncFd<Socket>>,
    ifindex: u32,
    net_packet_rxp: &Sender<messages::input::NetRxPacketMsg<V>>,
) -> Task<()>
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("input");
        let _span2_guard = span2.enter();

        let net_packet_rxp = net_packet_rxp.clone();

        Task::spawn_supervised(move || {
            let socket = socket.clone();
            let net_packet_rxp = net_packet_rxp.clone();
            async move {
                let _ =
                    network::read_loop(socket, ifindex, net_packet_rxp).await;
            }
            .in_current_span()
        })
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// Network Tx task.
#[allow(unused_mut)]
pub(crate) fn net_tx<V>(
    socket: Arc<AsyncFd<Socket>>,
    ifname: &str,
    ifindex: u32,
    mut net_tx_packetc: UnboundedReceiver<messages::output::NetTxPacketMsg<V>>,
    #[cfg(feature = "testing")] proto_output_tx: &Sender<
        messages::ProtocolOutputMsg<V>,
    >,
) -> Task<()>
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("output");
        let _span2_guard = span2.enter();

        let ifname = ifname.to_owned();
        Task::spawn(
            async move {
                network::write_loop(socket, ifname, ifindex, net_tx_packetc)
                    .await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        let proto_output_tx = proto_output_tx.clone();
        Task::spawn(async move {
            // Relay message to the test framework.
            while let Some(msg) = net_tx_packetc.recv().await {
                let msg = messages::ProtocolOutputMsg::NetTxPacket(msg);
                let _ = proto_output_tx.send(msg).await;
            }
        })
    }
}

// General query timer task.
pub(crate) fn query_timer<V>(
    ifindex: u32,
    timeout: Duration,
    query_timerp: &Sender<messages::input::QueryTimerMsg>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let query_timerp = query_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::QueryTimerMsg { ifindex };
            let _ = query_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Other-querier-present timer task.
pub(crate) fn other_querier_timer<V>(
    ifindex: u32,
    timeout: Duration,
    other_querier_timerp: &Sender<messages::input::OtherQuerierTimerMsg>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let other_querier_timerp = other_querier_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::OtherQuerierTimerMsg { ifindex };
            let _ = other_querier_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Group membership timer task.
pub(crate) fn group_timer<V>(
    ifindex: u32,
    group_addr: V::IpAddr,
    timeout: Duration,
    group_timerp: &Sender<messages::input::GroupTimerMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let group_timerp = group_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::GroupTimerMsg {
                ifindex,
                group_addr,
            };
            let _ = group_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Source timer task.
pub(crate) fn source_timer<V>(
    ifindex: u32,
    group_addr: V::IpAddr,
    source_addr: V::IpAddr,
    timeout: Duration,
    source_timerp: &Sender<messages::input::SourceTimerMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let source_timerp = source_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::SourceTimerMsg {
                ifindex,
                group_addr,
                source_addr,
            };
            let _ = source_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Last-member query retransmission timer task.
pub(crate) fn rexmit_timer<V>(
    ifindex: u32,
    group_addr: V::IpAddr,
    timeout: Duration,
    rexmit_timerp: &Sender<messages::input::RexmitTimerMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let rexmit_timerp = rexmit_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::RexmitTimerMsg {
                ifindex,
                group_addr,
            };
            let _ = rexmit_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Older-version-host-present timer task.
pub(crate) fn compat_timer<V>(
    ifindex: u32,
    group_addr: V::IpAddr,
    version: u8,
    timeout: Duration,
    compat_timerp: &Sender<messages::input::CompatTimerMsg<V>>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let compat_timerp = compat_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::CompatTimerMsg {
                ifindex,
                group_addr,
                version,
            };
            let _ = compat_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}
