//! Process-wide DNS override
//!
//! While a bridge is alive, the platform's default resolver must reach
//! its upstream through the proxy core rather than the (now captive)
//! default route. The bridge installs an engine-backed dialer here on
//! construction and clears it on close; whatever resolver the embedder
//! runs consults [`override_dialer`] before falling back to the OS.

use crate::error::Result;
use causeway_engine::{Destination, Endpoint, Engine, InboundSession, ProxyStream, TAG_DNS_IN};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;

/// Upstream the override dials, over TCP, tagged [`TAG_DNS_IN`].
pub const DNS_UPSTREAM: &str = "1.0.0.1:53";

/// Opens a stream to a DNS upstream.
#[async_trait::async_trait]
pub trait DnsDialer: Send + Sync {
    async fn dial(&self) -> Result<Box<dyn ProxyStream>>;
}

static OVERRIDE: RwLock<Option<Arc<dyn DnsDialer>>> = RwLock::new(None);

pub fn set_override(dialer: Arc<dyn DnsDialer>) {
    *OVERRIDE.write() = Some(dialer);
}

pub fn clear_override() {
    *OVERRIDE.write() = None;
}

/// The currently installed override, if a bridge is alive.
pub fn override_dialer() -> Option<Arc<dyn DnsDialer>> {
    OVERRIDE.read().clone()
}

/// Dialer that routes resolver traffic through the proxy core's
/// DNS inbound.
pub(crate) struct EngineDnsDialer {
    engine: Arc<dyn Engine>,
    upstream: SocketAddr,
}

impl EngineDnsDialer {
    pub(crate) fn new(engine: Arc<dyn Engine>) -> Result<Self> {
        let upstream = DNS_UPSTREAM
            .parse()
            .map_err(|e| crate::error::BridgeError::Parse(format!("dns upstream: {e}")))?;
        Ok(Self { engine, upstream })
    }
}

#[async_trait::async_trait]
impl DnsDialer for EngineDnsDialer {
    async fn dial(&self) -> Result<Box<dyn ProxyStream>> {
        let session = InboundSession::tagged(TAG_DNS_IN);
        let dest = Destination::tcp(Endpoint::from_socket_addr(self.upstream));
        Ok(self.engine.dial(session, dest).await?)
    }
}
