//! Userspace stack contracts
//!
//! The bridge does not reassemble packets itself; an in-process TCP/IP
//! stack drains the TUN device and surfaces whole flows. This module
//! defines the seam: the [`FlowSink`] callbacks the stack invokes for
//! every new flow, the per-flow objects it hands over, and the
//! [`StackDriver`] the embedder supplies to wire a concrete stack to
//! the opened [`TunDevice`].
//!
//! The stack keeps only a weak reference back to the bridge (through
//! the sink it was given), so tearing the bridge down never has to
//! break a reference cycle.

use crate::error::{BridgeError, Result};
use bytes::Bytes;
use causeway_engine::Endpoint;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Both ends of a reconstructed flow as the stack saw them.
///
/// `source` is the TUN-side origin; `target` is where the host
/// application was trying to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowId {
    pub source: Endpoint,
    pub target: Endpoint,
}

impl FlowId {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self { source, target }
    }
}

/// A synthesized TCP connection: an ordered byte stream plus identity.
/// Dropping the flow closes the TUN side.
pub trait TcpFlow: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {
    fn id(&self) -> &FlowId;
}

/// One inbound UDP datagram held by the stack.
///
/// The handler may keep the packet alive past the callback (the first
/// packet of a flow backs the downstream pump); the stack releases the
/// underlying buffers when the last reference drops.
#[async_trait::async_trait]
pub trait InboundPacket: Send + Sync {
    fn id(&self) -> &FlowId;

    fn payload(&self) -> Bytes;

    /// Write a reply datagram back to the TUN. `source` labels who the
    /// reply is from; `None` makes the stack use the flow's original
    /// target, which DNS replies require.
    async fn write_back(&self, data: &[u8], source: Option<SocketAddr>) -> io::Result<usize>;
}

/// The bridge-side sink the stack delivers flows into.
pub trait FlowSink: Send + Sync {
    fn add(&self, conn: Box<dyn TcpFlow>);

    fn add_packet(&self, packet: Arc<dyn InboundPacket>);
}

/// Handle to a running stack; closing it terminates every flow.
pub trait NetStack: Send + Sync {
    fn close(&self);
}

/// Builds a concrete stack over the opened device, delivering flows
/// into `sink`.
pub trait StackDriver: Send + Sync {
    fn build(&self, device: TunDevice, sink: Arc<dyn FlowSink>) -> Result<Box<dyn NetStack>>;
}

/// The TUN device as handed over by the platform: a raw descriptor the
/// VPN service opened, plus the negotiated MTU.
///
/// The descriptor is duplicated on construction; the platform's own fd
/// stays untouched and remains valid however the stack ends.
#[derive(Debug)]
pub struct TunDevice {
    fd: OwnedFd,
    mtu: u32,
}

impl TunDevice {
    pub fn from_raw_fd(fd: RawFd, mtu: i32) -> Result<Self> {
        if fd < 0 {
            return Err(BridgeError::InvalidFd(fd));
        }
        if mtu <= 0 {
            return Err(BridgeError::InvalidMtu(mtu));
        }

        let dup = unsafe { libc::dup(fd) };
        if dup < 0 {
            return Err(BridgeError::Device(format!(
                "failed to duplicate TUN fd {}: {}",
                fd,
                io::Error::last_os_error()
            )));
        }
        // dup just handed us sole ownership of this descriptor
        let fd = unsafe { OwnedFd::from_raw_fd(dup) };

        Ok(Self {
            fd,
            mtu: mtu as u32,
        })
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

impl AsRawFd for TunDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
