//! Mock collaborators shared by the scenario tests: an engine that
//! records every dial, a scriptable packet conn, stack-side flow
//! objects, and a canned uid resolver.

use crate::bridge::{BridgeInner, BridgeOptions};
use crate::error::{BridgeError, Result as BridgeResult};
use crate::nat::NatTable;
use crate::pool::BufferPool;
use crate::stack::{FlowId, FlowSink, InboundPacket, NetStack, StackDriver, TcpFlow, TunDevice};
use crate::stats::StatsRegistry;
use crate::uid::{UidDumper, UidInfo};
use bytes::Bytes;
use causeway_engine::{
    Destination, Endpoint, Engine, EngineError, InboundSession, PacketConn, ProxyStream,
    Result as EngineResult,
};
use parking_lot::Mutex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Serializes tests that touch process-wide state (uid resolver,
/// foreground markers, the DNS override).
pub(crate) fn lock_globals() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
}

pub(crate) fn sa(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

pub(crate) fn ep(addr: &str) -> Endpoint {
    Endpoint::from_socket_addr(sa(addr))
}

pub(crate) fn make_inner(
    engine: Arc<dyn Engine>,
    router: IpAddr,
    opts: BridgeOptions,
) -> Arc<BridgeInner> {
    Arc::new(BridgeInner {
        engine,
        router,
        opts,
        nat: NatTable::new(),
        stats: Arc::new(StatsRegistry::new()),
        pool: BufferPool::relay(),
        closed: AtomicBool::new(false),
    })
}

/// Poll `cond` until it holds, or panic after two seconds.
pub(crate) async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Engine that records each dial and hands back scriptable conns.
#[derive(Default)]
pub(crate) struct MockEngine {
    pub tcp_dials: Mutex<Vec<(InboundSession, Destination)>>,
    pub tcp_peers: Mutex<Vec<DuplexStream>>,
    pub udp_dials: Mutex<Vec<InboundSession>>,
    pub udp_conns: Mutex<Vec<Arc<MockPacketConn>>>,
    pub refuse: AtomicBool,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tcp_dial_count(&self) -> usize {
        self.tcp_dials.lock().len()
    }

    pub fn udp_dial_count(&self) -> usize {
        self.udp_dials.lock().len()
    }

    pub fn take_tcp_peer(&self) -> Option<DuplexStream> {
        let mut peers = self.tcp_peers.lock();
        if peers.is_empty() {
            None
        } else {
            Some(peers.remove(0))
        }
    }

    pub fn udp_conn(&self, index: usize) -> Arc<MockPacketConn> {
        self.udp_conns.lock()[index].clone()
    }
}

#[async_trait::async_trait]
impl Engine for MockEngine {
    async fn dial(
        &self,
        session: InboundSession,
        dst: Destination,
    ) -> EngineResult<Box<dyn ProxyStream>> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(EngineError::Dial("refused".to_string()));
        }
        let (near, far) = tokio::io::duplex(64 * 1024);
        self.tcp_dials.lock().push((session, dst));
        self.tcp_peers.lock().push(far);
        Ok(Box::new(near))
    }

    async fn dial_udp(&self, session: InboundSession) -> EngineResult<Arc<dyn PacketConn>> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(EngineError::Dial("refused".to_string()));
        }
        let conn = MockPacketConn::new();
        self.udp_dials.lock().push(session);
        self.udp_conns.lock().push(conn.clone());
        Ok(conn)
    }
}

type Datagram = Option<(Vec<u8>, SocketAddr)>;

/// Packet conn the test scripts: outgoing datagrams are recorded,
/// incoming ones are fed through [`MockPacketConn::push`], and
/// [`MockPacketConn::finish`] ends the conversation.
pub(crate) struct MockPacketConn {
    pub sent: Mutex<Vec<(Vec<u8>, Endpoint)>>,
    inbound_tx: mpsc::UnboundedSender<Datagram>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    pub closed: AtomicBool,
}

impl MockPacketConn {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
        })
    }

    pub fn push(&self, data: &[u8], from: SocketAddr) {
        let _ = self.inbound_tx.send(Some((data.to_vec(), from)));
    }

    pub fn finish(&self) {
        let _ = self.inbound_tx.send(None);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait::async_trait]
impl PacketConn for MockPacketConn {
    async fn send_to(&self, payload: &[u8], dst: &Endpoint) -> io::Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.sent.lock().push((payload.to_vec(), dst.clone()));
        Ok(payload.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(Some((data, from))) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, from))
            }
            _ => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let _ = self.inbound_tx.send(None);
    }
}

/// Stack-side TCP flow over an in-memory duplex; the test drives the
/// other end.
pub(crate) struct MockTcpFlow {
    id: FlowId,
    io: DuplexStream,
}

impl MockTcpFlow {
    pub fn pair(source: Endpoint, target: Endpoint) -> (Box<dyn TcpFlow>, DuplexStream) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let flow = Self {
            id: FlowId::new(source, target),
            io: near,
        };
        (Box::new(flow), far)
    }
}

impl TcpFlow for MockTcpFlow {
    fn id(&self) -> &FlowId {
        &self.id
    }
}

impl AsyncRead for MockTcpFlow {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockTcpFlow {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

/// Stack-side UDP packet; records what gets written back to the TUN.
pub(crate) struct MockPacket {
    id: FlowId,
    payload: Bytes,
    pub written: Mutex<Vec<(Vec<u8>, Option<SocketAddr>)>>,
    pub fail_write: AtomicBool,
}

impl MockPacket {
    pub fn new(source: Endpoint, target: Endpoint, payload: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            id: FlowId::new(source, target),
            payload: Bytes::copy_from_slice(payload),
            written: Mutex::new(Vec::new()),
            fail_write: AtomicBool::new(false),
        })
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().len()
    }
}

#[async_trait::async_trait]
impl InboundPacket for MockPacket {
    fn id(&self) -> &FlowId {
        &self.id
    }

    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    async fn write_back(&self, data: &[u8], source: Option<SocketAddr>) -> io::Result<usize> {
        if self.fail_write.load(Ordering::Relaxed) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.written.lock().push((data.to_vec(), source));
        Ok(data.len())
    }
}

/// Canned uid resolver.
pub(crate) struct MockDumper {
    pub uid: i32,
    pub fail: bool,
}

impl MockDumper {
    pub fn returning(uid: i32) -> Arc<Self> {
        Arc::new(Self { uid, fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { uid: 0, fail: true })
    }
}

#[async_trait::async_trait]
impl UidDumper for MockDumper {
    async fn dump_uid(
        &self,
        _ipv6: bool,
        _udp: bool,
        _src: SocketAddr,
        _dst: SocketAddr,
    ) -> BridgeResult<i32> {
        if self.fail {
            Err(BridgeError::Resolver("no owner".to_string()))
        } else {
            Ok(self.uid)
        }
    }

    async fn uid_info(&self, uid: i32) -> BridgeResult<UidInfo> {
        Ok(UidInfo {
            package_name: format!("com.example.app{uid}"),
            label: format!("App {uid}"),
        })
    }
}

/// Stack that only remembers whether it was closed.
pub(crate) struct NoopStack {
    closed: Arc<AtomicBool>,
}

impl NetStack for NoopStack {
    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Driver that captures the sink so tests can play the stack's part.
pub(crate) struct NoopDriver {
    pub sink: Mutex<Option<Arc<dyn FlowSink>>>,
    pub stack_closed: Arc<AtomicBool>,
}

impl NoopDriver {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            stack_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sink(&self) -> Arc<dyn FlowSink> {
        self.sink.lock().clone().unwrap()
    }
}

impl StackDriver for NoopDriver {
    fn build(
        &self,
        _device: TunDevice,
        sink: Arc<dyn FlowSink>,
    ) -> BridgeResult<Box<dyn NetStack>> {
        *self.sink.lock() = Some(sink);
        Ok(Box::new(NoopStack {
            closed: self.stack_closed.clone(),
        }))
    }
}

/// Build a DNS A query for `domain`.
pub(crate) fn dns_query_bytes(domain: &str) -> Vec<u8> {
    use hickory_proto::op::{Message, MessageType, Query};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    let mut msg = Message::new();
    msg.set_id(0x2b2b);
    msg.set_message_type(MessageType::Query);
    msg.add_query(Query::query(Name::from_str(domain).unwrap(), RecordType::A));
    msg.to_vec().unwrap()
}
