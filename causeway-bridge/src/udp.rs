//! UDP flow handling
//!
//! A UDP flow is keyed by its TUN-side source alone: one outbound
//! packet conn and one downstream pump serve every destination that
//! source talks to. The first packet of a flow dials the engine; while
//! the dial is being set up, concurrent first packets of the same flow
//! are gated through a pending lock in the NAT table so the engine is
//! dialed exactly once per flow key.

use crate::bridge::BridgeInner;
use crate::counter::CountedPacketConn;
use crate::metadata;
use crate::nat::{NatSlot, NatTable};
use crate::stack::InboundPacket;
use crate::stats::{FlowGuard, FlowKind};
use causeway_engine::{Network, PacketConn};
use std::sync::Arc;
use tracing::{debug, error};

impl BridgeInner {
    pub(crate) async fn handle_datagram(self: Arc<Self>, packet: Arc<dyn InboundPacket>) {
        if self.is_closed() {
            debug!("[UDP] packet after close dropped");
            return;
        }

        let id = packet.id().clone();
        let Some(src) = id.source.as_socket_addr() else {
            error!("[UDP] packet with domain source {} dropped", id.source);
            return;
        };
        let Some(dst) = id.target.as_socket_addr() else {
            error!("[UDP] packet with domain destination {} dropped", id.target);
            return;
        };

        let nat_key = src.to_string();

        // Fast path: a live conn already serves this source.
        if self.send_through(&nat_key, &packet).await {
            return;
        }

        let lock_key = NatTable::lock_key(&nat_key);
        let (slot, loaded) = self.nat.get_or_create_lock(&lock_key);
        if loaded {
            if let NatSlot::Pending(notify) = slot {
                let notified = notify.notified();
                tokio::pin!(notified);
                // Register before re-checking the key so the creator's
                // broadcast cannot slip between the check and the wait.
                if !notified.as_mut().enable() && self.nat.contains(&lock_key) {
                    notified.await;
                }
            }
            self.send_through(&nat_key, &packet).await;
            return;
        }

        let notify = match slot {
            NatSlot::Pending(notify) => notify,
            // Lock keys only ever hold pending slots.
            NatSlot::Conn(_) => return,
        };

        // Wake waiters before the dial; they retry the send path and
        // give up if no entry has appeared yet.
        self.nat.delete(&lock_key);
        notify.notify_waiters();

        let payload = packet.payload();
        let meta = metadata::resolve(
            &self.opts,
            self.router,
            Network::Udp,
            src,
            dst,
            Some(&payload),
        )
        .await;
        drop(payload);

        let conn = match self.engine.dial_udp(meta.session.clone()).await {
            Ok(conn) => conn,
            // No NAT entry was installed; the flow's next packet
            // starts over.
            Err(e) => {
                error!("[UDP] dial for {} failed: {}", src, e);
                return;
            }
        };

        let mut conn: Arc<dyn PacketConn> = conn;
        let _guard = if meta.accountable(&self.opts) {
            let stats = self.stats.record(meta.uid);
            conn = Arc::new(CountedPacketConn::new(conn, stats.clone()));
            Some(FlowGuard::new(stats, FlowKind::Udp))
        } else {
            None
        };

        self.nat.set(&nat_key, conn.clone());

        // Drain the held first packet through the fresh entry without
        // delaying the pump.
        {
            let this = self.clone();
            let key = nat_key.clone();
            let first = packet.clone();
            tokio::spawn(async move {
                this.send_through(&key, &first).await;
            });
        }

        let mut buf = self.pool.get();
        loop {
            let (n, from) = match conn.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    debug!("[UDP] {} read ended: {}", src, e);
                    break;
                }
            };
            // DNS replies must come from the address the host queried,
            // not from wherever the engine resolved it.
            let source = if meta.is_dns { None } else { Some(from) };
            if let Err(e) = packet.write_back(&buf[..n], source).await {
                debug!("[UDP] {} write back failed: {}", src, e);
                break;
            }
        }

        drop(buf);
        conn.close();
        self.nat.delete(&nat_key);
        debug!("[UDP] {} reclaimed", src);
    }

    /// Deliver `packet` through the live entry for `nat_key`, if one
    /// exists. A failed write closes the conn; its pump notices and
    /// reclaims the flow.
    pub(crate) async fn send_through(&self, nat_key: &str, packet: &Arc<dyn InboundPacket>) -> bool {
        let Some(conn) = self.nat.get(nat_key) else {
            return false;
        };

        let target = packet.id().target.clone();
        if let Err(e) = conn.send_to(&packet.payload(), &target).await {
            debug!("[UDP] write to {} failed: {}", target, e);
            conn.close();
        }
        true
    }
}
