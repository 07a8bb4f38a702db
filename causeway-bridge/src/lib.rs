//! Causeway bridge - TUN flow dispatcher
//!
//! Causeway drains a TUN device on a mobile host, reconstructs the
//! TCP and UDP flows inside its byte stream (through an embedded
//! userspace stack), and relays each flow through a pluggable outbound
//! proxy core. On the way it resolves which application owns each
//! flow, applies DNS-hijacking and protocol-sniffing policy, and keeps
//! per-application traffic counters.
//!
//! # Architecture
//!
//! ```text
//! +------------------------------------------------------------+
//! |                  Embedding platform                        |
//! | (VPN service: TUN fd, uid resolver, foreground markers)    |
//! +------------------------------------------------------------+
//!                |  fd                       ^ stats
//!                v                           |
//! +------------------------------------------------------------+
//! |                        Bridge                              |
//! | +-----------+ +-----------+ +----------------------------+ |
//! | | NAT table | | Stats     | | Metadata resolver          | |
//! | |           | | registry  | | (uid / DNS / sniff policy) | |
//! | +-----------+ +-----------+ +----------------------------+ |
//! |        TCP flow handler        UDP flow handler            |
//! +------------------------------------------------------------+
//!        ^ flows from stack          | dials
//!        |                           v
//! +----------------+      +---------------------------+
//! | Userspace      |      | Outbound engine           |
//! | TCP/IP stack   |      | (proxy core)              |
//! +----------------+      +---------------------------+
//! ```
//!
//! The stack and the engine are collaborators behind traits; see
//! [`stack`] and the `causeway-engine` crate for the contracts.
//!
//! # Example
//!
//! ```rust,ignore
//! use causeway_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! let engine: Arc<dyn causeway_engine::Engine> = my_proxy_core();
//! let bridge = Bridge::new(
//!     tun_fd,
//!     1500,
//!     engine,
//!     "172.19.0.2".parse()?,
//!     BridgeOptions {
//!         hijack_dns: true,
//!         sniffing: true,
//!         traffic_stats: true,
//!         ..Default::default()
//!     },
//!     &my_stack_driver,
//! )?;
//!
//! // ... VPN session runs ...
//!
//! bridge.close();
//! ```

pub mod bridge;
pub mod counter;
pub mod dns;
pub mod error;
pub mod logging;
mod metadata;
pub mod nat;
pub mod pool;
pub mod stack;
pub mod stats;
mod tcp;
mod udp;
pub mod uid;

// Re-exports for convenience
pub use bridge::{Bridge, BridgeOptions};
pub use counter::{CountedPacketConn, CountedStream};
pub use error::{BridgeError, Result};
pub use nat::{NatSlot, NatTable};
pub use pool::{BufferPool, PooledBuf, RELAY_BUFFER_SIZE};
pub use stack::{FlowId, FlowSink, InboundPacket, NetStack, StackDriver, TcpFlow, TunDevice};
pub use stats::{AppStats, AppStatsSnapshot, FlowGuard, FlowKind, StatsRegistry};
pub use uid::{UidDumper, UidInfo};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::bridge::{Bridge, BridgeOptions};
    pub use crate::error::{BridgeError, Result};
    pub use crate::stats::{AppStatsSnapshot, StatsRegistry};
    pub use crate::uid::{UidDumper, UidInfo};
}

#[cfg(test)]
mod tests;
