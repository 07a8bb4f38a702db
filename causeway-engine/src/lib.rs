//! Causeway engine contracts
//!
//! This crate defines the seam between the Causeway flow dispatcher and
//! the outbound proxy core it drives. The dispatcher reconstructs TCP
//! and UDP flows from a TUN device; for every flow it builds an
//! [`InboundSession`] describing where the flow came from and how it
//! should be treated, then asks an [`Engine`] implementation for an
//! outbound connection.
//!
//! A proxy core embeds Causeway by implementing [`Engine`] (and, for
//! UDP, [`PacketConn`]); nothing in this crate assumes a particular
//! proxy protocol.

pub mod address;
pub mod engine;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use address::{Destination, Endpoint, Network};
pub use engine::{Engine, PacketConn, ProxyStream};
pub use error::{EngineError, Result};
pub use session::{AppStatus, InboundSession, SniffRequest, TAG_DNS_IN, TAG_SOCKS};
