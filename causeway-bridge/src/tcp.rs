//! TCP flow handling
//!
//! One task per proxied TCP connection: validate the flow's endpoints,
//! resolve metadata, dial the engine, then splice bytes both ways until
//! either side finishes. Every failure ends this flow only.

use crate::bridge::BridgeInner;
use crate::counter::CountedStream;
use crate::metadata;
use crate::stack::TcpFlow;
use crate::stats::{FlowGuard, FlowKind};
use causeway_engine::{Destination, Endpoint, Network, ProxyStream};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

impl BridgeInner {
    pub(crate) async fn handle_stream(self: Arc<Self>, conn: Box<dyn TcpFlow>) {
        if self.is_closed() {
            debug!("[TCP] flow after close dropped");
            return;
        }

        let id = conn.id().clone();
        let Some(src) = id.source.as_socket_addr() else {
            error!("[TCP] conn with domain source {} dropped", id.source);
            return;
        };
        let Some(dst) = id.target.as_socket_addr() else {
            error!("[TCP] conn with domain destination {} dropped", id.target);
            return;
        };

        let meta =
            metadata::resolve(&self.opts, self.router, Network::Tcp, src, dst, None).await;

        let dest = Destination::tcp(Endpoint::from_socket_addr(dst));
        let outbound = match self.engine.dial(meta.session.clone(), dest).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("[TCP] dial {} failed: {}", dst, e);
                return;
            }
        };

        let mut outbound: Box<dyn ProxyStream> = outbound;
        let _guard = if meta.accountable(&self.opts) {
            let stats = self.stats.record(meta.uid);
            outbound = Box::new(CountedStream::new(outbound, stats.clone()));
            Some(FlowGuard::new(stats, FlowKind::Tcp))
        } else {
            None
        };

        splice(conn, outbound).await;
        debug!("[TCP] {} ==> {} done", src, dst);
    }
}

/// Copy in both directions until either direction finishes, then shut
/// both writers down. Each endpoint closes exactly once, when its half
/// is dropped at the end of this call.
async fn splice(inbound: Box<dyn TcpFlow>, outbound: Box<dyn ProxyStream>) {
    let (mut ir, mut iw) = tokio::io::split(inbound);
    let (mut or, mut ow) = tokio::io::split(outbound);

    tokio::select! {
        result = tokio::io::copy(&mut ir, &mut ow) => {
            if let Err(e) = result {
                debug!("[TCP] uplink copy ended: {}", e);
            }
        }
        result = tokio::io::copy(&mut or, &mut iw) => {
            if let Err(e) = result {
                debug!("[TCP] downlink copy ended: {}", e);
            }
        }
    }

    let _ = ow.shutdown().await;
    let _ = iw.shutdown().await;
}
