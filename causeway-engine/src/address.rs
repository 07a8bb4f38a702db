use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Transport network of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Self::Udp)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a flow: either a numeric socket address or a named host.
///
/// The dispatcher only ever dials numeric endpoints; domain endpoints
/// can still appear on flows surfaced by stacks that synthesize names
/// (fake-DNS layers), and are rejected at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl Endpoint {
    #[inline]
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }

    #[inline]
    pub fn from_domain(domain: impl Into<String>, port: u16) -> Self {
        Self::Domain(domain.into(), port)
    }

    #[inline]
    pub fn port(&self) -> u16 {
        match self {
            Self::Ip(addr) => addr.port(),
            Self::Domain(_, port) => *port,
        }
    }

    #[inline]
    pub fn host(&self) -> String {
        match self {
            Self::Ip(addr) => addr.ip().to_string(),
            Self::Domain(domain, _) => domain.clone(),
        }
    }

    #[inline]
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ip(addr) => Some(addr.ip()),
            Self::Domain(..) => None,
        }
    }

    /// Returns the numeric socket address, or `None` for domain ends.
    #[inline]
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Ip(addr) => Some(*addr),
            Self::Domain(..) => None,
        }
    }

    #[inline]
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(..))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{}", addr),
            Self::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// A dial target handed to the engine: network plus endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub network: Network,
    pub endpoint: Endpoint,
}

impl Destination {
    pub fn tcp(endpoint: Endpoint) -> Self {
        Self {
            network: Network::Tcp,
            endpoint,
        }
    }

    pub fn udp(endpoint: Endpoint) -> Self {
        Self {
            network: Network::Udp,
            endpoint,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.endpoint)
    }
}
