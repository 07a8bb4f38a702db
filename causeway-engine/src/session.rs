use crate::address::Endpoint;

/// Tag for ordinary proxied flows.
pub const TAG_SOCKS: &str = "socks";
/// Tag for flows that carry DNS and should be routed to the core's
/// internal DNS inbound.
pub const TAG_DNS_IN: &str = "dns-in";

/// Whether the owning application is currently in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Foreground,
    Background,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}

/// Request to sniff the application protocol of a flow.
///
/// `protocols` lists the detectors the engine should run, in order;
/// detection may override the destination (fake-DNS resolution).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffRequest {
    pub enabled: bool,
    pub metadata_only: bool,
    pub protocols: Vec<&'static str>,
}

impl SniffRequest {
    pub fn for_protocols(protocols: Vec<&'static str>) -> Self {
        Self {
            enabled: true,
            metadata_only: false,
            protocols,
        }
    }
}

/// Per-flow descriptor handed to the engine with every dial.
///
/// `uid` is 0 when the owning application could not be resolved, and
/// otherwise a normalized value of at least 1000.
#[derive(Debug, Clone)]
pub struct InboundSession {
    /// TUN-side origin of the flow. Absent for internally originated
    /// dials (the process-wide DNS override).
    pub source: Option<Endpoint>,
    pub tag: &'static str,
    pub uid: u32,
    pub app_status: Vec<AppStatus>,
    pub sniffing: Option<SniffRequest>,
}

impl InboundSession {
    /// A plain session for a flow originating at `source`.
    pub fn new(source: Endpoint) -> Self {
        Self {
            source: Some(source),
            tag: TAG_SOCKS,
            uid: 0,
            app_status: Vec::new(),
            sniffing: None,
        }
    }

    /// A sourceless session carrying only a tag.
    pub fn tagged(tag: &'static str) -> Self {
        Self {
            source: None,
            tag,
            uid: 0,
            app_status: Vec::new(),
            sniffing: None,
        }
    }

    pub fn is_dns(&self) -> bool {
        self.tag == TAG_DNS_IN
    }
}
