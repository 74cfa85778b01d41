//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::io::{IoSlice, IoSliceMut};
use std::ops::Deref;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::socket::{self, SockaddrLike};
use serde::Serialize;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::Sender;
use velo_utils::UnboundedReceiver;
use velo_utils::socket::{AsyncFd, Socket};

use crate::debug::Debug;
use crate::error::IoError;
use crate::packet::{DecodeResult, Packet};
use crate::tasks::messages::input::NetRxPacketMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;

// Ancillary information extracted from a received packet.
#[derive(Clone, Copy, Debug)]
#[derive(serde::Deserialize, Serialize)]
#[serde(bound = "V: Version")]
pub struct RxPacketInfo<V: Version> {
    // Destination address, when the platform surfaces it.
    pub dst: Option<V::IpAddr>,
    // TTL or Hop Limit of the received packet.
    pub ttl: Option<u8>,
    // Presence of the Router Alert option; `None` when the receive path
    // cannot observe IP options.
    pub router_alert: Option<bool>,
}

// Group-membership version-specific code.
pub trait NetworkVersion<V: Version> {
    type SocketAddr: SockaddrLike + Send + Sync;
    type Pktinfo: Send + Sync;

    // IP protocol number of the membership protocol.
    const IP_PROTO: i32;

    // Create the protocol socket for the given interface.
    fn socket(ifname: &str) -> Result<Socket, std::io::Error>;

    // Join the given multicast group on the interface.
    fn join_multicast(
        socket: &Socket,
        group: &V::IpAddr,
        ifindex: u32,
    ) -> Result<(), std::io::Error>;

    // Leave the given multicast group on the interface.
    fn leave_multicast(
        socket: &Socket,
        group: &V::IpAddr,
        ifindex: u32,
    ) -> Result<(), std::io::Error>;

    // Create new IP_PKTINFO/IPV6_PKTINFO struct.
    fn new_pktinfo(src: Option<V::IpAddr>, ifindex: u32) -> Self::Pktinfo;

    // Initialize the control message used by `sendmsg`.
    fn set_cmsg_data(pktinfo: &Self::Pktinfo) -> socket::ControlMessage<'_>;

    // Extract ancillary packet information from the received control
    // messages.
    fn get_cmsg_data(cmsgs: socket::CmsgIterator<'_>) -> RxPacketInfo<V>;

    // Convert packet destination to socket address.
    fn dst_to_sockaddr(ifindex: u32, addr: V::IpAddr) -> Self::SocketAddr;

    // Convert socket address to packet source address.
    fn src_from_sockaddr(sockaddr: &Self::SocketAddr) -> V::IpAddr;

    // Validate and strip the IP header when the raw socket delivers it,
    // merging TTL and Router Alert information into `info`.
    fn validate_ip_hdr(
        buf: &mut Bytes,
        info: &mut RxPacketInfo<V>,
    ) -> DecodeResult<()>;
}

// ===== global functions =====

#[cfg(not(feature = "testing"))]
pub(crate) async fn send_packet<V>(
    socket: &AsyncFd<Socket>,
    ifname: &str,
    ifindex: u32,
    src: V::IpAddr,
    dst: V::IpAddr,
    packet: &Packet<V>,
) -> Result<usize, IoError>
where
    V: Version,
{
    Debug::<V>::PacketTx(ifname, &dst, packet).log();

    // Encode packet.
    let buf = packet.encode(&src, &dst);

    // Send packet.
    let iov = [IoSlice::new(&buf)];
    let sockaddr = V::dst_to_sockaddr(ifindex, dst);
    let pktinfo = V::new_pktinfo(Some(src), ifindex);
    let cmsg = [V::set_cmsg_data(&pktinfo)];
    socket
        .async_io(tokio::io::Interest::WRITABLE, |socket| {
            socket::sendmsg(
                socket.as_raw_fd(),
                &iov,
                &cmsg,
                socket::MsgFlags::empty(),
                Some(&sockaddr),
            )
            .map_err(|errno| errno.into())
        })
        .await
        .map_err(IoError::SendError)
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn write_loop<V>(
    socket: Arc<AsyncFd<Socket>>,
    ifname: String,
    ifindex: u32,
    mut net_tx_packetc: UnboundedReceiver<NetTxPacketMsg<V>>,
) where
    V: Version,
{
    while let Some(NetTxPacketMsg { src, dst, packet }) =
        net_tx_packetc.recv().await
    {
        if let Err(error) =
            send_packet(&socket, &ifname, ifindex, src, dst, &packet).await
        {
            error.log();
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn read_loop<V>(
    socket: Arc<AsyncFd<Socket>>,
    ifindex: u32,
    net_packet_rxp: Sender<NetRxPacketMsg<V>>,
) -> Result<(), SendError<NetRxPacketMsg<V>>>
where
    V: Version,
{
    let mut buf = [0; 16384];
    let mut iov = [IoSliceMut::new(&mut buf)];
    let mut cmsgspace = nix::cmsg_space!(V::Pktinfo, u32);

    loop {
        // Receive data packet.
        match socket
            .async_io(tokio::io::Interest::READABLE, |socket| {
                match socket::recvmsg::<V::SocketAddr>(
                    socket.as_raw_fd(),
                    &mut iov,
                    Some(&mut cmsgspace),
                    socket::MsgFlags::empty(),
                ) {
                    Ok(msg) => {
                        // Retrieve source address and ancillary data.
                        let src = msg
                            .address
                            .as_ref()
                            .map(|addr| V::src_from_sockaddr(addr));
                        let info = V::get_cmsg_data(msg.cmsgs().unwrap());
                        Ok((src, info, msg.bytes))
                    }
                    Err(errno) => Err(errno.into()),
                }
            })
            .await
        {
            Ok((src, mut info, bytes)) => {
                let src = match src {
                    Some(addr) => addr,
                    None => {
                        IoError::RecvMissingSourceAddr.log();
                        continue;
                    }
                };

                // Validate the IP header (if delivered) and decode the
                // protocol message.
                let mut buf = Bytes::copy_from_slice(&iov[0].deref()[0..bytes]);
                let packet = V::validate_ip_hdr(&mut buf, &mut info)
                    .and_then(|_| {
                        let dst = info.dst.unwrap_or_else(V::all_systems);
                        Packet::decode(&buf, &src, &dst)
                    });
                let msg = NetRxPacketMsg {
                    ifindex,
                    src,
                    info,
                    packet,
                };
                net_packet_rxp.send(msg).await?;
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {
                // Retry if the syscall was interrupted (EINTR).
                continue;
            }
            Err(error) => {
                IoError::RecvError(error).log();
            }
        }
    }
}

impl<V> Default for RxPacketInfo<V>
where
    V: Version,
{
    fn default() -> RxPacketInfo<V> {
        RxPacketInfo {
            dst: None,
            ttl: None,
            router_alert: None,
        }
    }
}
