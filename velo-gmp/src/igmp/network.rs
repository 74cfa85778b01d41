//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, Bytes};
use nix::sys::socket::{self, SockaddrIn};
use velo_utils::capabilities;
use velo_utils::socket::{RawSocketExt, Socket, SocketExt};

use crate::network::{NetworkVersion, RxPacketInfo};
use crate::packet::{DecodeError, DecodeResult};
use crate::version::Igmp;

// The IPv4 Router Alert option type (RFC 2113).
const OPT_ROUTER_ALERT: u8 = 0x94;

// ===== impl Igmp =====

impl NetworkVersion<Self> for Igmp {
    type SocketAddr = SockaddrIn;
    type Pktinfo = libc::in_pktinfo;

    const IP_PROTO: i32 = libc::IPPROTO_IGMP;

    fn socket(ifname: &str) -> Result<Socket, std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            use velo_utils::ip::AddressFamily;

            let socket = capabilities::raise(|| {
                <Socket as RawSocketExt>::new_raw(AddressFamily::Ipv4, Self::IP_PROTO)
            })?;

            socket.bind_device(Some(ifname.as_bytes()))?;
            socket.set_ipv4_multicast_loop(false)?;
            socket.set_ipv4_multicast_ttl(1)?;
            socket.set_ipv4_pktinfo(true)?;
            socket.set_ipv4_tos(libc::IPTOS_PREC_INTERNETCONTROL)?;
            // Membership messages must carry the Router Alert option
            // (RFC 2236, Section 2).
            socket.set_ipv4_router_alert()?;

            Ok(socket)
        }
        #[cfg(feature = "testing")]
        {
            Ok(Socket {})
        }
    }

    fn join_multicast(
        socket: &Socket,
        group: &Ipv4Addr,
        ifindex: u32,
    ) -> Result<(), std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            socket.join_multicast_ifindex_v4(group, ifindex)
        }
        #[cfg(feature = "testing")]
        {
            Ok(())
        }
    }

    fn leave_multicast(
        socket: &Socket,
        group: &Ipv4Addr,
        ifindex: u32,
    ) -> Result<(), std::io::Error> {
        #[cfg(not(feature = "testing"))]
        {
            socket.leave_multicast_ifindex_v4(group, ifindex)
        }
        #[cfg(feature = "testing")]
        {
            Ok(())
        }
    }

    fn new_pktinfo(src: Option<Ipv4Addr>, ifindex: u32) -> libc::in_pktinfo {
        libc::in_pktinfo {
            ipi_ifindex: ifindex as i32,
            ipi_spec_dst: libc::in_addr { s_addr: 0 },
            ipi_addr: libc::in_addr {
                s_addr: src.map(u32::from).unwrap_or(0).to_be(),
            },
        }
    }

    fn set_cmsg_data(pktinfo: &libc::in_pktinfo) -> socket::ControlMessage<'_> {
        socket::ControlMessage::Ipv4PacketInfo(pktinfo)
    }

    fn get_cmsg_data(_cmsgs: socket::CmsgIterator<'_>) -> RxPacketInfo<Self> {
        // Everything of interest is carried in the IPv4 header, which raw
        // sockets deliver in full.
        RxPacketInfo::default()
    }

    fn dst_to_sockaddr(_ifindex: u32, addr: Ipv4Addr) -> SockaddrIn {
        std::net::SocketAddrV4::new(addr, 0).into()
    }

    fn src_from_sockaddr(sockaddr: &SockaddrIn) -> Ipv4Addr {
        Ipv4Addr::from(sockaddr.ip())
    }

    fn validate_ip_hdr(
        buf: &mut Bytes,
        info: &mut RxPacketInfo<Self>,
    ) -> DecodeResult<()> {
        use velo_utils::bytes::BytesExt;

        let buf_len = buf.len();
        if buf_len < 20 {
            return Err(DecodeError::LengthTooShort(buf_len));
        }

        // Parse IHL (header length, in 32-bit words).
        let hdr_len = ((buf.get_u8() & 0x0f) as usize) << 2;
        if hdr_len < 20 || buf_len < hdr_len {
            return Err(DecodeError::LengthTooShort(buf_len));
        }

        // Ignore TOS, total length, identification and fragment fields.
        let _ = buf.get_u8();
        let _ = buf.get_u16();
        let _ = buf.get_u32();

        info.ttl = Some(buf.get_u8());
        let _proto = buf.get_u8();
        let _hdr_cksum = buf.get_u16();
        let _src = buf.get_ipv4();
        info.dst = Some(buf.get_ipv4());

        // Scan the IP options for the Router Alert option.
        let mut options = hdr_len - 20;
        let mut router_alert = false;
        while options > 0 {
            let opt_type = buf.get_u8();
            options -= 1;
            match opt_type {
                // End of options.
                0 => {
                    buf.advance(options);
                    options = 0;
                }
                // No-operation.
                1 => (),
                _ => {
                    if options == 0 {
                        return Err(DecodeError::LengthTooShort(buf_len));
                    }
                    let opt_len = buf.get_u8() as usize;
                    options -= 1;
                    if opt_len < 2 || opt_len - 2 > options {
                        return Err(DecodeError::LengthTooShort(buf_len));
                    }
                    if opt_type == OPT_ROUTER_ALERT {
                        router_alert = true;
                    }
                    buf.advance(opt_len - 2);
                    options -= opt_len - 2;
                }
            }
        }
        info.router_alert = Some(router_alert);

        Ok(())
    }
}
