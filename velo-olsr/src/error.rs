//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{error, warn, warn_span};

use crate::packet::DecodeError;

// OLSR errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    InterfaceStartError(String, IoError),
    // Message input errors
    PacketDecodeError(String, Ipv4Addr, DecodeError),
    InvalidHelloTtlHops(Ipv4Addr, u8, u8),
    MsgFromNonNeighbor(Ipv4Addr, Ipv4Addr),
    TcAnsnOutOfOrder(Ipv4Addr, u16),
}

// OLSR I/O errors.
#[derive(Debug)]
pub enum IoError {
    SocketError(std::io::Error),
    RecvError(std::io::Error),
    SendError(std::io::Error),
}

// ===== impl Error =====

impl Error {
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
            Error::InvalidHelloTtlHops(origin, ttl, hops) => {
                warn!(%origin, %ttl, %hops, "{}", self);
            }
            Error::MsgFromNonNeighbor(origin, source) => {
                warn!(%origin, %source, "{}", self);
            }
            Error::TcAnsnOutOfOrder(origin, ansn) => {
                warn!(%origin, %ansn, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::InterfaceStartError(..) => {
                write!(f, "failed to start interface")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::InvalidHelloTtlHops(..) => {
                write!(f, "HELLO with invalid TTL or hop count")
            }
            Error::MsgFromNonNeighbor(..) => {
                write!(f, "message from a non-symmetric neighbor")
            }
            Error::TcAnsnOutOfOrder(..) => {
                write!(f, "TC received out of order")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::InterfaceStartError(_, error) => Some(error),
            Error::PacketDecodeError(_, _, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::SocketError(error)
            | IoError::RecvError(error)
            | IoError::SendError(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::SocketError(..) => {
                write!(f, "failed to create UDP socket")
            }
            IoError::RecvError(..) => {
                write!(f, "failed to receive packet")
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
            | IoError::RecvError(error)
            | IoError::SendError(error) => Some(error),
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
