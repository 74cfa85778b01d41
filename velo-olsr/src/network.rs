//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::SendError;
use velo_utils::UnboundedReceiver;
use velo_utils::socket::UdpSocket;

use crate::error::IoError;
use crate::packet::Packet;
use crate::tasks::messages::input::NetRxPacketMsg;
use crate::tasks::messages::output::NetTxPacketMsg;

// UDP port used by the protocol (RFC 3626, Section 18.1).
pub const UDP_PORT: u16 = 698;

// ===== global functions =====

pub(crate) fn socket(ifname: &str) -> Result<UdpSocket, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        use velo_utils::capabilities;
        use velo_utils::socket::UdpSocketExt;

        let sockaddr =
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, UDP_PORT));
        let socket =
            capabilities::raise(|| UdpSocket::bind_reuseaddr(sockaddr))?;
        capabilities::raise(|| socket.bind_device(Some(ifname.as_bytes())))?;
        socket.set_broadcast(true)?;
        socket.set_ttl(1)?;
        Ok(socket)
    }
    #[cfg(feature = "testing")]
    {
        Ok(UdpSocket {})
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn write_loop(
    socket: Arc<UdpSocket>,
    _ifname: String,
    _ifindex: u32,
    mut net_tx_packetc: UnboundedReceiver<NetTxPacketMsg>,
) {
    // Packets are broadcast on the attached network segment.
    let dst =
        SocketAddrV4::new(Ipv4Addr::new(255, 255, 255, 255), UDP_PORT);

    while let Some(NetTxPacketMsg { packet }) = net_tx_packetc.recv().await {
        let buf = packet.encode();
        if let Err(error) = socket.send_to(&buf, dst).await {
            IoError::SendError(error).log();
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn read_loop(
    socket: Arc<UdpSocket>,
    ifindex: u32,
    net_packet_rxp: Sender<NetRxPacketMsg>,
) -> Result<(), SendError<NetRxPacketMsg>> {
    let mut buf = [0; 16384];

    loop {
        // Receive data packet.
        match socket.recv_from(&mut buf).await {
            Ok((bytes, src)) => {
                let SocketAddr::V4(src) = src else {
                    continue;
                };

                // Decode packet.
                let packet = Packet::decode(&buf[0..bytes]);
                let msg = NetRxPacketMsg {
                    ifindex,
                    src: *src.ip(),
                    packet,
                };
                net_packet_rxp.send(msg).await?;
            }
            Err(error)
                if error.kind() == std::io::ErrorKind::Interrupted =>
            {
                // Retry if the syscall was interrupted (EINTR).
                continue;
            }
            Err(error) => {
                IoError::RecvError(error).log();
            }
        }
    }
}
