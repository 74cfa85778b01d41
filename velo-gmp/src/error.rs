//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn, warn_span};

use crate::packet::DecodeError;
use crate::version::Version;

// Group-membership errors.
#[derive(Debug)]
pub enum Error<V: Version> {
    // I/O errors
    IoError(IoError),
    InterfaceStartError(String, IoError),
    // Packet input errors
    PacketDecodeError(String, V::IpAddr, DecodeError),
    UnexpectedSourceScope(String, V::IpAddr),
    UnexpectedDestination(String, V::IpAddr),
    SourceNotDirectlyConnected(String, V::IpAddr),
    MissingRouterAlert(String, V::IpAddr),
    InvalidGroupAddress(String, V::IpAddr),
    VersionMismatch(String, u8, u8),
}

// Group-membership I/O errors.
#[derive(Debug)]
pub enum IoError {
    SocketError(std::io::Error),
    MulticastJoinError(std::io::Error),
    MulticastLeaveError(std::io::Error),
    RecvError(std::io::Error),
    RecvMissingSourceAddr,
    SendError(std::io::Error),
}

// ===== impl Error =====

impl<V> Error<V>
where
    V: Version,
{
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::InterfaceStartError(name, error) => {
                error!(%name, error = %with_source(error), "{}", self);
            }
            Error::PacketDecodeError(ifname, source, error) => {
                warn_span!("interface", name = %ifname).in_scope(|| {
                    warn!(%source, error = %error, "{}", self);
                });
            }
            Error::UnexpectedSourceScope(ifname, source)
            | Error::UnexpectedDestination(ifname, source)
            | Error::SourceNotDirectlyConnected(ifname, source)
            | Error::MissingRouterAlert(ifname, source)
            | Error::InvalidGroupAddress(ifname, source) => {
                warn_span!("interface", name = %ifname).in_scope(|| {
                    warn!(address = %source, "{}", self);
                });
            }
            Error::VersionMismatch(ifname, configured, received) => {
                warn_span!("interface", name = %ifname).in_scope(|| {
                    warn!(%configured, %received, "{}", self);
                });
            }
        }
    }
}

impl<V> std::fmt::Display for Error<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::InterfaceStartError(..) => {
                write!(f, "failed to start interface")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::UnexpectedSourceScope(..) => {
                write!(f, "invalid source address scope")
            }
            Error::UnexpectedDestination(..) => {
                write!(f, "invalid destination address")
            }
            Error::SourceNotDirectlyConnected(..) => {
                write!(f, "source is not directly connected")
            }
            Error::MissingRouterAlert(..) => {
                write!(f, "missing IP Router Alert option")
            }
            Error::InvalidGroupAddress(..) => {
                write!(f, "invalid group address")
            }
            Error::VersionMismatch(..) => {
                write!(f, "protocol version mismatch on subnet")
            }
        }
    }
}

impl<V> std::error::Error for Error<V>
where
    V: Version,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::InterfaceStartError(_, error) => Some(error),
            Error::PacketDecodeError(_, _, error) => Some(error),
            _ => None,
        }
    }
}

impl<V> From<IoError> for Error<V>
where
    V: Version,
{
    fn from(error: IoError) -> Error<V> {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::SocketError(error)
            | IoError::MulticastJoinError(error)
            | IoError::MulticastLeaveError(error)
            | IoError::RecvError(error)
            | IoError::SendError(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            IoError::RecvMissingSourceAddr => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::SocketError(..) => {
                write!(f, "failed to create raw socket")
            }
            IoError::MulticastJoinError(..) => {
                write!(f, "failed to join multicast group")
            }
            IoError::MulticastLeaveError(..) => {
                write!(f, "failed to leave multicast group")
            }
            IoError::RecvError(..) => {
                write!(f, "failed to receive packet")
            }
            IoError::RecvMissingSourceAddr => {
                write!(f, "missing source address on received packet")
            }
            IoError::SendError(..) => {
                write!(f, "failed to send packet")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::SocketError(error)
            | IoError::MulticastJoinError(error)
            | IoError::MulticastLeaveError(error)
            | IoError::RecvError(error)
            | IoError::SendError(error) => Some(error),
            IoError::RecvMissingSourceAddr => None,
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
