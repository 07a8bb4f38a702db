//! Byte-counting connection wrappers
//!
//! Thin delegating wrappers around the outbound conn that add every
//! successful read or write length to the owning uid's counters.
//! Uplink is bytes moving from the TUN toward the outbound (writes);
//! downlink is the reverse (reads). No payload bytes are copied.

use crate::stats::AppStats;
use causeway_engine::{Endpoint, PacketConn};
use pin_project_lite::pin_project;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pin_project! {
    /// Stream wrapper used for proxied TCP flows.
    pub struct CountedStream<S> {
        #[pin]
        inner: S,
        stats: Arc<AppStats>,
    }
}

impl<S> CountedStream<S> {
    pub fn new(inner: S, stats: Arc<AppStats>) -> Self {
        Self { inner, stats }
    }
}

impl<S: AsyncRead> AsyncRead for CountedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        match this.inner.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                this.stats.add_downlink(n as u64);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S: AsyncWrite> AsyncWrite for CountedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        match this.inner.poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.stats.add_uplink(n as u64);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// Packet-conn wrapper used for proxied UDP flows.
pub struct CountedPacketConn {
    inner: Arc<dyn PacketConn>,
    stats: Arc<AppStats>,
}

impl CountedPacketConn {
    pub fn new(inner: Arc<dyn PacketConn>, stats: Arc<AppStats>) -> Self {
        Self { inner, stats }
    }
}

#[async_trait::async_trait]
impl PacketConn for CountedPacketConn {
    async fn send_to(&self, payload: &[u8], dst: &Endpoint) -> io::Result<usize> {
        let n = self.inner.send_to(payload, dst).await?;
        self.stats.add_uplink(n as u64);
        Ok(n)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (n, addr) = self.inner.recv_from(buf).await?;
        self.stats.add_downlink(n as u64);
        Ok((n, addr))
    }

    fn close(&self) {
        self.inner.close();
    }
}
