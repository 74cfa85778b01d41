//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{Sender, UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug_span};
use velo_utils::socket::UdpSocket;
use velo_utils::task::{IntervalTask, Task, TimeoutTask};

use crate::network;
use crate::neighborhood::{LinkId, NeighborId, TwoHopLinkId};
use crate::topology::{MidEntryId, TopologyId};

//
// OLSR tasks diagram:
//                                 +--------------+
//                 net_rx (Nx) ->  |              |
//         hello_interval (Nx) ->  |              |
//            tc_interval (1x) ->  |              |
//           mid_interval (1x) ->  |              |
//            link_timers (Nx) ->  |              |
//    mpr_selector_timer  (Nx) ->  |   instance   | -> (Nx) net_tx
//      twohop_dead_timer (Nx) ->  |              |
//     tc/mid_entry_timer (Nx) ->  |              |
//              dup_timer (Nx) ->  |              |
//            mpr_recount (1x) ->  |              |
//           route_update (1x) ->  |              |
//                                 +--------------+
//                          ibus_tx (1x) | ^ (1x) ibus_rx
//                                       | |
//                                       V |
//                                 +--------------+
//                                 |     ibus     |
//                                 +--------------+
//

// OLSR inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::packet::{DecodeError, Packet};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;
    pub type ProtocolOutputMsg = output::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            NetRxPacket(NetRxPacketMsg),
            HelloInterval(HelloIntervalMsg),
            TcInterval(TcIntervalMsg),
            MidInterval(MidIntervalMsg),
            LinkSymTimer(LinkTimerMsg),
            LinkAsymTimer(LinkTimerMsg),
            LinkDeadTimer(LinkTimerMsg),
            MprSelectorTimer(MprSelectorTimerMsg),
            TwoHopDeadTimer(TwoHopDeadTimerMsg),
            TcEntryTimer(TcEntryTimerMsg),
            MidEntryTimer(MidEntryTimerMsg),
            DupTimer(DupTimerMsg),
            MprRecount(MprRecountMsg),
            RouteUpdate(RouteUpdateMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxPacketMsg {
            pub ifindex: u32,
            pub src: Ipv4Addr,
            pub packet: Result<Packet, DecodeError>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct HelloIntervalMsg {
            pub ifindex: u32,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct TcIntervalMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct MidIntervalMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LinkTimerMsg {
            pub link_id: LinkId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct MprSelectorTimerMsg {
            pub neighbor_id: NeighborId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct TwoHopDeadTimerMsg {
            pub twohop_link_id: TwoHopLinkId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct TcEntryTimerMsg {
            pub topology_id: TopologyId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct MidEntryTimerMsg {
            pub mid_id: MidEntryId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct DupTimerMsg {
            pub origin: Ipv4Addr,
            pub seqno: u16,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct MprRecountMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct RouteUpdateMsg {}
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        pub enum ProtocolMsg {
            NetTxPacket(NetTxPacketMsg),
        }

        #[derive(Debug, Serialize)]
        pub struct NetTxPacketMsg {
            #[cfg(feature = "testing")]
            pub ifname: String,
            pub packet: Packet,
        }
    }
}

// ===== OLSR tasks =====

// Network Rx task.
pub(crate) fn net_rx(
    socket: Arc<UdpSocket>,
    ifindex: u32,
    net_packet_rxp: &Sender<messages::input::NetRxPacketMsg>,
) -> Task<()> {
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
pub(crate) fn net_tx(
    socket: Arc<UdpSocket>,
    ifname: &str,
    ifindex: u32,
    mut net_tx_packetc: UnboundedReceiver<messages::output::NetTxPacketMsg>,
    #[cfg(feature = "testing")] proto_output_tx: &Sender<
        messages::ProtocolOutputMsg,
    >,
) -> Task<()> {
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

// HELLO emission interval task.
pub(crate) fn hello_interval(
    ifindex: u32,
    interval: Duration,
    hello_intervalp: &Sender<messages::input::HelloIntervalMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        use rand::Rng;

        // Jitter the emission interval by up to MAXJITTER = HELLO_INTERVAL/4
        // so co-located nodes do not synchronize (RFC 3626, Section 18.2).
        let jitter = interval.mul_f64(rand::rng().random::<f64>() * 0.25);
        let interval = interval - jitter;

        let hello_intervalp = hello_intervalp.clone();
        IntervalTask::new(interval, true, move || {
            let hello_intervalp = hello_intervalp.clone();
            async move {
                let msg = messages::input::HelloIntervalMsg { ifindex };
                let _ = hello_intervalp.send(msg).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// TC emission interval task.
pub(crate) fn tc_interval(
    interval: Duration,
    tc_intervalp: &Sender<messages::input::TcIntervalMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let tc_intervalp = tc_intervalp.clone();
        IntervalTask::new(interval, true, move || {
            let tc_intervalp = tc_intervalp.clone();
            async move {
                let msg = messages::input::TcIntervalMsg {};
                let _ = tc_intervalp.send(msg).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// MID emission interval task.
pub(crate) fn mid_interval(
    interval: Duration,
    mid_intervalp: &Sender<messages::input::MidIntervalMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let mid_intervalp = mid_intervalp.clone();
        IntervalTask::new(interval, false, move || {
            let mid_intervalp = mid_intervalp.clone();
            async move {
                let msg = messages::input::MidIntervalMsg {};
                let _ = mid_intervalp.send(msg).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Link SYM timer task.
pub(crate) fn link_sym_timer(
    link_id: LinkId,
    timeout: Duration,
    link_sym_timerp: &Sender<messages::input::LinkTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let link_sym_timerp = link_sym_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LinkTimerMsg { link_id };
            let _ = link_sym_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Link ASYM timer task.
pub(crate) fn link_asym_timer(
    link_id: LinkId,
    timeout: Duration,
    link_asym_timerp: &Sender<messages::input::LinkTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let link_asym_timerp = link_asym_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LinkTimerMsg { link_id };
            let _ = link_asym_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Link dead timer task.
pub(crate) fn link_dead_timer(
    link_id: LinkId,
    timeout: Duration,
    link_dead_timerp: &Sender<messages::input::LinkTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let link_dead_timerp = link_dead_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LinkTimerMsg { link_id };
            let _ = link_dead_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// MPR selector expiry timer task.
pub(crate) fn mpr_selector_timer(
    neighbor_id: NeighborId,
    timeout: Duration,
    mpr_selector_timerp: &Sender<messages::input::MprSelectorTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let mpr_selector_timerp = mpr_selector_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::MprSelectorTimerMsg { neighbor_id };
            let _ = mpr_selector_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Two-hop link expiry timer task.
pub(crate) fn twohop_dead_timer(
    twohop_link_id: TwoHopLinkId,
    timeout: Duration,
    twohop_dead_timerp: &Sender<messages::input::TwoHopDeadTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let twohop_dead_timerp = twohop_dead_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::TwoHopDeadTimerMsg { twohop_link_id };
            let _ = twohop_dead_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Topology entry expiry timer task.
pub(crate) fn tc_entry_timer(
    topology_id: TopologyId,
    timeout: Duration,
    tc_entry_timerp: &Sender<messages::input::TcEntryTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let tc_entry_timerp = tc_entry_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::TcEntryTimerMsg { topology_id };
            let _ = tc_entry_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// MID entry expiry timer task.
pub(crate) fn mid_entry_timer(
    mid_id: MidEntryId,
    timeout: Duration,
    mid_entry_timerp: &Sender<messages::input::MidEntryTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let mid_entry_timerp = mid_entry_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::MidEntryTimerMsg { mid_id };
            let _ = mid_entry_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Duplicate set entry expiry timer task.
pub(crate) fn dup_timer(
    origin: Ipv4Addr,
    seqno: u16,
    timeout: Duration,
    dup_timerp: &Sender<messages::input::DupTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let dup_timerp = dup_timerp.clone();
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::DupTimerMsg { origin, seqno };
            let _ = dup_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// MPR recount request.
pub(crate) fn schedule_mpr_recount(
    mpr_recountp: &UnboundedSender<messages::input::MprRecountMsg>,
) {
    let _ = mpr_recountp.send(messages::input::MprRecountMsg {});
}

// Route update request.
pub(crate) fn schedule_route_update(
    route_updatep: &UnboundedSender<messages::input::RouteUpdateMsg>,
) {
    let _ = route_updatep.send(messages::input::RouteUpdateMsg {});
}
