//! Bridge facade
//!
//! The facade owns everything with process lifetime: the stack handle,
//! the engine, the NAT table, the stats registry, and the policy
//! flags. The embedding platform constructs one bridge per VPN
//! session; the stack calls back into it through [`FlowSink`] for
//! every reconstructed flow.

use crate::dns::{self, EngineDnsDialer};
use crate::error::Result;
use crate::logging;
use crate::nat::NatTable;
use crate::pool::BufferPool;
use crate::stack::{FlowSink, InboundPacket, NetStack, StackDriver, TcpFlow, TunDevice};
use crate::stats::StatsRegistry;
use causeway_engine::Engine;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Policy flags the platform decides per VPN session.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeOptions {
    /// Treat UDP payloads that parse as DNS queries as DNS flows even
    /// when they are not addressed to the router.
    pub hijack_dns: bool,
    /// Ask the engine to sniff non-DNS flows.
    pub sniffing: bool,
    /// Include the fake-DNS detector in sniff requests.
    pub fakedns: bool,
    pub debug: bool,
    /// Resolve the owning uid even when stats are off.
    pub dump_uid: bool,
    /// Keep per-application counters.
    pub traffic_stats: bool,
}

/// Shared state every flow handler task hangs on to.
pub(crate) struct BridgeInner {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) router: IpAddr,
    pub(crate) opts: BridgeOptions,
    pub(crate) nat: NatTable,
    pub(crate) stats: Arc<StatsRegistry>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) closed: AtomicBool,
}

impl BridgeInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Sink handed to the stack. Holds the bridge weakly so the stack can
/// never keep a dead bridge alive.
struct SinkHandle {
    inner: Weak<BridgeInner>,
}

impl FlowSink for SinkHandle {
    fn add(&self, conn: Box<dyn TcpFlow>) {
        if let Some(inner) = self.inner.upgrade() {
            tokio::spawn(inner.handle_stream(conn));
        }
    }

    fn add_packet(&self, packet: Arc<dyn InboundPacket>) {
        // Handled on its own task so the stack never blocks on a flow.
        if let Some(inner) = self.inner.upgrade() {
            tokio::spawn(inner.handle_datagram(packet));
        }
    }
}

pub struct Bridge {
    inner: Arc<BridgeInner>,
    stack: Mutex<Option<Box<dyn NetStack>>>,
}

impl Bridge {
    /// Open the device over `fd`, stand up the stack through `driver`,
    /// and install the process-wide DNS override.
    ///
    /// `router` is the synthetic DNS address: flows addressed to it are
    /// always treated as DNS.
    pub fn new(
        fd: RawFd,
        mtu: i32,
        engine: Arc<dyn Engine>,
        router: IpAddr,
        opts: BridgeOptions,
        driver: &dyn StackDriver,
    ) -> Result<Arc<Self>> {
        logging::init(opts.debug);

        let device = TunDevice::from_raw_fd(fd, mtu)?;

        let inner = Arc::new(BridgeInner {
            engine: engine.clone(),
            router,
            opts,
            nat: NatTable::new(),
            stats: Arc::new(StatsRegistry::new()),
            pool: BufferPool::relay(),
            closed: AtomicBool::new(false),
        });

        let sink: Arc<dyn FlowSink> = Arc::new(SinkHandle {
            inner: Arc::downgrade(&inner),
        });
        let stack = driver.build(device, sink)?;

        dns::set_override(Arc::new(EngineDnsDialer::new(engine)?));
        info!("bridge up, router {}, mtu {}", router, mtu);

        Ok(Arc::new(Self {
            inner,
            stack: Mutex::new(Some(stack)),
        }))
    }

    /// Tear the session down: clear the DNS override and close the
    /// stack, which surfaces as I/O errors in every active flow. A
    /// closed bridge stays closed; construct a new one to resume.
    pub fn close(&self) {
        let mut stack = self.stack.lock();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        dns::clear_override();
        if let Some(stack) = stack.take() {
            stack.close();
        }
        self.inner.nat.clear();
        info!("bridge closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> Arc<StatsRegistry> {
        self.inner.stats.clone()
    }

    pub fn options(&self) -> BridgeOptions {
        self.inner.opts
    }

    pub fn router(&self) -> IpAddr {
        self.inner.router
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!("bridge dropped without close");
            self.close();
        }
    }
}
