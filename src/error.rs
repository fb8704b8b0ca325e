use std::net::Ipv4Addr;

use thiserror::Error;

use crate::protocol::packet::PacketError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no route to {0}")]
    NoRoute(Ipv4Addr),

    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("malformed packet: {0}")]
    Malformed(#[from] PacketError),

    #[error("too many packets waiting for {0} to resolve")]
    ArpQueueFull(Ipv4Addr),

    #[error("transport error on {interface}: {reason}")]
    Transport { interface: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RouterError>;
