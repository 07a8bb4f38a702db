use crate::address::{Destination, Endpoint};
use crate::error::Result;
use crate::session::InboundSession;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A proxied byte stream returned by [`Engine::dial`].
pub trait ProxyStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ProxyStream for T {}

/// A proxied packet connection returned by [`Engine::dial_udp`].
///
/// One `PacketConn` carries a whole UDP conversation: each outgoing
/// datagram names its own destination, and each incoming datagram is
/// labelled with the address it was received from.
#[async_trait::async_trait]
pub trait PacketConn: Send + Sync {
    async fn send_to(&self, payload: &[u8], dst: &Endpoint) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Close the connection. Pending and subsequent reads and writes
    /// fail. Must be safe to call more than once.
    fn close(&self);
}

/// The outbound proxy core.
///
/// Implementations receive the fully resolved [`InboundSession`] for
/// every flow and are free to route, sniff, or transform as they see
/// fit; the dispatcher only shuttles bytes through whatever comes back.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Open a stream to `dst` on behalf of `session`.
    async fn dial(&self, session: InboundSession, dst: Destination) -> Result<Box<dyn ProxyStream>>;

    /// Open a packet connection on behalf of `session`. Destinations
    /// ride on each datagram.
    async fn dial_udp(&self, session: InboundSession) -> Result<Arc<dyn PacketConn>>;
}
