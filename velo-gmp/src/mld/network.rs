//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use bytes::Bytes;
use nix::sys::socket::{self, SockaddrIn6};
use velo_utils::capabilities;
use velo_utils::socket::{RawSocketExt, Socket, SocketExt};

use crate::mld::packet::{
    MSG_LISTENER_DONE, MSG_LISTENER_QUERY, MSG_LISTENER_REPORT,
    MSG_LISTENER_REPORT_V2,
};
use crate::network::{NetworkVersion, RxPacketInfo};
use crate::packet::DecodeResult;
use crate::version::Mld;

// ===== impl Mld =====

impl NetworkVersion<Self> for Mld {
    type SocketAddr = SockaddrIn6;
    type Pktinfo = libc::in6_pktinfo;

    const IP_PROTO: i32 = libc::IPPROTO_ICMPV6;

    fn socket(ifname: &str) -> Result<Socket, std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            use velo_utils::ip::AddressFamily;

            let socket = capabilities::raise(|| {
                <Socket as RawSocketExt>::new_raw(AddressFamily::Ipv6, Self::IP_PROTO)
            })?;

            socket.bind_device(Some(ifname.as_bytes()))?;
            socket.set_ipv6_multicast_loop(false)?;
            socket.set_ipv6_multicast_hops(1)?;
            socket.set_ipv6_pktinfo(true)?;
            socket.set_ipv6_recv_hoplimit(true)?;
            socket.set_ipv6_tclass(libc::IPTOS_PREC_INTERNETCONTROL)?;
            // Receive only MLD message types.
            socket.set_icmpv6_filter(&[
                MSG_LISTENER_QUERY,
                MSG_LISTENER_REPORT,
                MSG_LISTENER_DONE,
                MSG_LISTENER_REPORT_V2,
            ])?;

            Ok(socket)
        }
        #[cfg(feature = "testing")]
        {
            Ok(Socket {})
        }
    }

    fn join_multicast(
        socket: &Socket,
        group: &Ipv6Addr,
        ifindex: u32,
    ) -> Result<(), std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            socket.join_multicast_ifindex_v6(group, ifindex)
        }
        #[cfg(feature = "testing")]
        {
            Ok(())
        }
    }

    fn leave_multicast(
        socket: &Socket,
        group: &Ipv6Addr,
        ifindex: u32,
    ) -> Result<(), std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            socket.leave_multicast_ifindex_v6(group, ifindex)
        }
        #[cfg(feature = "testing")]
        {
            Ok(())
        }
    }

    fn new_pktinfo(src: Option<Ipv6Addr>, ifindex: u32) -> libc::in6_pktinfo {
        libc::in6_pktinfo {
            ipi6_ifindex: ifindex,
            ipi6_addr: libc::in6_addr {
                s6_addr: src.unwrap_or(Ipv6Addr::UNSPECIFIED).octets(),
            },
        }
    }

    fn set_cmsg_data(
        pktinfo: &libc::in6_pktinfo,
    ) -> socket::ControlMessage<'_> {
        socket::ControlMessage::Ipv6PacketInfo(pktinfo)
    }

    fn get_cmsg_data(cmsgs: socket::CmsgIterator<'_>) -> RxPacketInfo<Self> {
        let mut info = RxPacketInfo::default();

        for cmsg in cmsgs {
            match cmsg {
                socket::ControlMessageOwned::Ipv6PacketInfo(pktinfo) => {
                    info.dst = Some(Ipv6Addr::from(pktinfo.ipi6_addr.s6_addr));
                }
                socket::ControlMessageOwned::Ipv6HopLimit(hoplimit) => {
                    info.ttl = Some(hoplimit as u8);
                }
                _ => (),
            }
        }

        // The kernel strips hop-by-hop options before delivering ICMPv6
        // messages; the Router Alert option cannot be observed here.
        info.router_alert = None;

        info
    }

    fn dst_to_sockaddr(ifindex: u32, addr: Ipv6Addr) -> SockaddrIn6 {
        std::net::SocketAddrV6::new(addr, 0, 0, ifindex).into()
    }

    fn src_from_sockaddr(sockaddr: &SockaddrIn6) -> Ipv6Addr {
        sockaddr.ip()
    }

    fn validate_ip_hdr(
        _buf: &mut Bytes,
        _info: &mut RxPacketInfo<Self>,
    ) -> DecodeResult<()> {
        // ICMPv6 raw sockets deliver the payload without the IPv6 header.
        Ok(())
    }
}
