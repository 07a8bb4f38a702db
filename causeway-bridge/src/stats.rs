//! Per-application traffic statistics
//!
//! Each uid owns one [`AppStats`] record with atomic counters; records
//! are created lazily on the first accounted flow and live for the
//! registry's lifetime. The registry lock is only ever held long
//! enough to materialize a record, never while counters move.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which flavor of flow a guard accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Tcp,
    Udp,
}

/// Counters for one application uid.
#[derive(Debug, Default)]
pub struct AppStats {
    tcp_conn: AtomicI32,
    udp_conn: AtomicI32,
    tcp_conn_total: AtomicU32,
    udp_conn_total: AtomicU32,
    uplink: AtomicU64,
    downlink: AtomicU64,
    /// 0 while any flow is active; otherwise the wall-clock second the
    /// last flow closed.
    deactivate_at: AtomicI64,
}

impl AppStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tcp_conn(&self) -> i32 {
        self.tcp_conn.load(Ordering::Relaxed)
    }

    pub fn udp_conn(&self) -> i32 {
        self.udp_conn.load(Ordering::Relaxed)
    }

    pub fn tcp_conn_total(&self) -> u32 {
        self.tcp_conn_total.load(Ordering::Relaxed)
    }

    pub fn udp_conn_total(&self) -> u32 {
        self.udp_conn_total.load(Ordering::Relaxed)
    }

    pub fn uplink(&self) -> u64 {
        self.uplink.load(Ordering::Relaxed)
    }

    pub fn downlink(&self) -> u64 {
        self.downlink.load(Ordering::Relaxed)
    }

    pub fn deactivate_at(&self) -> i64 {
        self.deactivate_at.load(Ordering::Relaxed)
    }

    pub(crate) fn add_uplink(&self, n: u64) {
        self.uplink.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_downlink(&self, n: u64) {
        self.downlink.fetch_add(n, Ordering::Relaxed);
    }

    fn activate(&self, kind: FlowKind) {
        match kind {
            FlowKind::Tcp => {
                self.tcp_conn.fetch_add(1, Ordering::Relaxed);
                self.tcp_conn_total.fetch_add(1, Ordering::Relaxed);
            }
            FlowKind::Udp => {
                self.udp_conn.fetch_add(1, Ordering::Relaxed);
                self.udp_conn_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.deactivate_at.store(0, Ordering::Relaxed);
    }

    fn deactivate(&self, kind: FlowKind) {
        let remaining = match kind {
            FlowKind::Tcp => {
                self.tcp_conn.fetch_sub(1, Ordering::Relaxed) - 1
                    + self.udp_conn.load(Ordering::Relaxed)
            }
            FlowKind::Udp => {
                self.udp_conn.fetch_sub(1, Ordering::Relaxed) - 1
                    + self.tcp_conn.load(Ordering::Relaxed)
            }
        };
        if remaining == 0 {
            self.deactivate_at.store(unix_now(), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> AppStatsSnapshot {
        AppStatsSnapshot {
            tcp_conn: self.tcp_conn(),
            udp_conn: self.udp_conn(),
            tcp_conn_total: self.tcp_conn_total(),
            udp_conn_total: self.udp_conn_total(),
            uplink: self.uplink(),
            downlink: self.downlink(),
            deactivate_at: self.deactivate_at(),
        }
    }
}

/// Point-in-time copy of one uid's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppStatsSnapshot {
    pub tcp_conn: i32,
    pub udp_conn: i32,
    pub tcp_conn_total: u32,
    pub udp_conn_total: u32,
    pub uplink: u64,
    pub downlink: u64,
    pub deactivate_at: i64,
}

/// Accounts one flow against an [`AppStats`] record for its lifetime.
///
/// Construction increments the active and cumulative counters and
/// clears `deactivate_at`; dropping decrements the active counter and
/// stamps `deactivate_at` when the uid's last flow closed.
pub struct FlowGuard {
    stats: Arc<AppStats>,
    kind: FlowKind,
}

impl FlowGuard {
    pub fn new(stats: Arc<AppStats>, kind: FlowKind) -> Self {
        stats.activate(kind);
        Self { stats, kind }
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        self.stats.deactivate(self.kind);
    }
}

/// Registry of per-uid records, shared by all flow handlers.
#[derive(Default)]
pub struct StatsRegistry {
    records: DashMap<u16, Arc<AppStats>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Stable record for `uid`, created on first use.
    pub fn record(&self, uid: u16) -> Arc<AppStats> {
        self.records
            .entry(uid)
            .or_insert_with(|| Arc::new(AppStats::new()))
            .clone()
    }

    pub fn get(&self, uid: u16) -> Option<Arc<AppStats>> {
        self.records.get(&uid).map(|r| r.clone())
    }

    pub fn snapshot(&self, uid: u16) -> Option<AppStatsSnapshot> {
        self.get(uid).map(|r| r.snapshot())
    }

    pub fn snapshot_all(&self) -> Vec<(u16, AppStatsSnapshot)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    pub fn reset(&self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_created_lazily() {
        let registry = StatsRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(1000).is_none());

        let a = registry.record(1000);
        let b = registry.record(1000);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_guard_lifecycle() {
        let registry = StatsRegistry::new();
        let stats = registry.record(12345);

        let tcp = FlowGuard::new(stats.clone(), FlowKind::Tcp);
        assert_eq!(stats.tcp_conn(), 1);
        assert_eq!(stats.tcp_conn_total(), 1);
        assert_eq!(stats.deactivate_at(), 0);

        let udp = FlowGuard::new(stats.clone(), FlowKind::Udp);
        drop(tcp);
        // UDP flow still active: no deactivation stamp yet
        assert_eq!(stats.tcp_conn(), 0);
        assert_eq!(stats.deactivate_at(), 0);

        drop(udp);
        assert_eq!(stats.udp_conn(), 0);
        assert!(stats.deactivate_at() > 0);
        assert_eq!(stats.tcp_conn_total(), 1);
        assert_eq!(stats.udp_conn_total(), 1);
    }

    #[test]
    fn test_reactivation_clears_stamp() {
        let stats = Arc::new(AppStats::new());
        drop(FlowGuard::new(stats.clone(), FlowKind::Tcp));
        assert!(stats.deactivate_at() > 0);

        let guard = FlowGuard::new(stats.clone(), FlowKind::Tcp);
        assert_eq!(stats.deactivate_at(), 0);
        drop(guard);
    }

    #[test]
    fn test_byte_counters() {
        let stats = Arc::new(AppStats::new());
        stats.add_uplink(1000);
        stats.add_downlink(500);
        let snap = stats.snapshot();
        assert_eq!(snap.uplink, 1000);
        assert_eq!(snap.downlink, 500);
    }

    #[test]
    fn test_snapshot_all() {
        let registry = StatsRegistry::new();
        registry.record(1000).add_uplink(1);
        registry.record(12345).add_downlink(2);

        let mut all = registry.snapshot_all();
        all.sort_by_key(|(uid, _)| *uid);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, 1000);
        assert_eq!(all[1].0, 12345);

        registry.reset();
        assert!(registry.is_empty());
    }
}
