use std::{fmt, net::SocketAddr};

/// Peer endpoint of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetAddress {
    /// Not connected to any endpoint
    #[default]
    None,
    /// A unicast IP endpoint
    Ip(SocketAddr),
    /// Every host of the local network on the given port
    Broadcast(u16),
    /// The local host on the given port
    Loopback(u16),
}

impl NetAddress {
    /// Port of the endpoint, if any
    pub fn port(&self) -> Option<u16> {
        match self {
            NetAddress::None => None,
            NetAddress::Ip(addr) => Some(addr.port()),
            NetAddress::Broadcast(port) | NetAddress::Loopback(port) => Some(*port),
        }
    }

    /// Returns true for [NetAddress::None]
    pub fn is_none(&self) -> bool {
        matches!(self, NetAddress::None)
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        NetAddress::Ip(addr)
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAddress::None => f.write_str("none"),
            NetAddress::Ip(addr) => write!(f, "{}", addr),
            NetAddress::Broadcast(port) => write!(f, "broadcast:{}", port),
            NetAddress::Loopback(port) => write!(f, "loopback:{}", port),
        }
    }
}
