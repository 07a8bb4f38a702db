//! Per-flow metadata resolution
//!
//! Before a flow is dialed, the dispatcher works out who owns it and
//! how the engine should treat it: the owning application uid (and
//! whether that app is in the foreground), whether the flow carries
//! DNS, and which sniffing policy applies. Resolver failures degrade
//! the flow to anonymous instead of dropping it.

use crate::bridge::BridgeOptions;
use crate::uid::{is_foreground, process_uid, uid_dumper};
use causeway_engine::{
    AppStatus, Endpoint, InboundSession, Network, SniffRequest, TAG_DNS_IN,
};
use hickory_proto::op::{Message, MessageType};
use hickory_proto::serialize::binary::BinDecodable;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info};

/// Resolved uids below this floor are not real applications.
const APP_UID_FLOOR: u16 = 10_000;
/// Sentinel every sub-app uid collapses to, so system traffic shares
/// one stats record instead of fragmenting across daemon uids.
const SYSTEM_UID: u16 = 1_000;

const SNIFF_PROTOCOLS: [&str; 2] = ["http", "tls"];
const SNIFF_PROTOCOLS_FAKEDNS: [&str; 3] = ["fakedns", "http", "tls"];

/// Everything the flow handlers need to know about one flow.
#[derive(Debug, Clone)]
pub(crate) struct FlowMetadata {
    pub session: InboundSession,
    pub is_dns: bool,
    pub is_self: bool,
    /// Whether the uid resolver produced an answer for this flow.
    pub resolved: bool,
    /// Normalized uid; meaningful only when `resolved`.
    pub uid: u16,
}

impl FlowMetadata {
    pub fn accountable(&self, opts: &BridgeOptions) -> bool {
        opts.traffic_stats && self.resolved && !self.is_self && !self.is_dns
    }
}

/// Resolve metadata for the flow `src -> dst`. For UDP flows with DNS
/// hijacking enabled, `payload` must carry the first datagram so it
/// can be inspected.
pub(crate) async fn resolve(
    opts: &BridgeOptions,
    router: IpAddr,
    network: Network,
    src: SocketAddr,
    dst: SocketAddr,
    payload: Option<&[u8]>,
) -> FlowMetadata {
    resolve_with(process_uid(), opts, router, network, src, dst, payload).await
}

pub(crate) async fn resolve_with(
    self_uid: u32,
    opts: &BridgeOptions,
    router: IpAddr,
    network: Network,
    src: SocketAddr,
    dst: SocketAddr,
    payload: Option<&[u8]>,
) -> FlowMetadata {
    let mut session = InboundSession::new(Endpoint::from_socket_addr(src));

    let mut is_dns = dst.ip() == router;
    match network {
        Network::Tcp => is_dns = is_dns || dst.port() == 53,
        Network::Udp => {
            if !is_dns && opts.hijack_dns {
                is_dns = payload.map_or(false, is_dns_query);
            }
        }
    }

    let mut uid: u16 = 0;
    let mut is_self = false;
    let mut resolved = false;

    if opts.dump_uid || opts.traffic_stats {
        if let Some(dumper) = uid_dumper() {
            match dumper.dump_uid(dst.is_ipv6(), network.is_udp(), src, dst).await {
                Ok(raw) => {
                    resolved = true;
                    uid = raw as u16;
                    is_self = uid > 0 && u32::from(uid) == self_uid;

                    if opts.debug && !is_self && uid >= APP_UID_FLOOR {
                        let kind = match (network, is_dns) {
                            (Network::Tcp, _) => "TCP",
                            (Network::Udp, true) => "DNS",
                            (Network::Udp, false) => "UDP",
                        };
                        match dumper.uid_info(i32::from(uid)).await {
                            Ok(app) => info!(
                                "[{}][{} ({}/{})] {} ==> {}",
                                kind, app.label, uid, app.package_name, src, dst
                            ),
                            Err(_) => info!("[{}] {} ==> {}", kind, src, dst),
                        }
                    }

                    uid = normalize_uid(uid);
                    session.uid = u32::from(uid);
                    session.app_status.push(if is_foreground(session.uid) {
                        AppStatus::Foreground
                    } else {
                        AppStatus::Background
                    });
                }
                Err(e) => {
                    debug!("uid lookup for {} ==> {} failed: {}", src, dst, e);
                }
            }
        }
    }

    if is_dns {
        session.tag = TAG_DNS_IN;
    } else if opts.sniffing {
        let protocols = if opts.fakedns {
            SNIFF_PROTOCOLS_FAKEDNS.to_vec()
        } else {
            SNIFF_PROTOCOLS.to_vec()
        };
        session.sniffing = Some(SniffRequest::for_protocols(protocols));
    }

    FlowMetadata {
        session,
        is_dns,
        is_self,
        resolved,
        uid,
    }
}

/// Collapse system and daemon uids to the shared sentinel; real
/// application uids pass through unchanged.
pub(crate) fn normalize_uid(raw: u16) -> u16 {
    if raw < APP_UID_FLOOR {
        SYSTEM_UID
    } else {
        raw
    }
}

/// A payload counts as DNS when it parses as a query with at least one
/// question. Parse failures mean "not DNS".
pub(crate) fn is_dns_query(payload: &[u8]) -> bool {
    match Message::from_bytes(payload) {
        Ok(msg) => msg.message_type() == MessageType::Query && !msg.queries().is_empty(),
        Err(_) => false,
    }
}
