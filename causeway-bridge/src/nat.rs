//! UDP NAT table
//!
//! Maps a flow key (the textual TUN-side `ip:port` source) to the one
//! outbound packet connection serving that source. The same keyspace
//! also carries pending locks under `<key>-lock`, used to single-flight
//! the outbound dial when several first packets of one flow arrive
//! together: the first caller becomes the creator and dials, the rest
//! wait on the lock's [`Notify`] and retry the send path once woken.
//!
//! Lookups never block writers; no lock is held across caller code.

use causeway_engine::PacketConn;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

const LOCK_SUFFIX: &str = "-lock";

/// A value in the table: a live outbound conn, or a pending lock
/// installed by the creator of a flow that is still being set up.
#[derive(Clone)]
pub enum NatSlot {
    Conn(Arc<dyn PacketConn>),
    Pending(Arc<Notify>),
}

impl fmt::Debug for NatSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conn(_) => f.write_str("NatSlot::Conn"),
            Self::Pending(_) => f.write_str("NatSlot::Pending"),
        }
    }
}

/// Concurrent NAT table shared by every UDP flow handler.
#[derive(Default)]
pub struct NatTable {
    mapping: DashMap<String, NatSlot>,
}

impl NatTable {
    pub fn new() -> Self {
        Self {
            mapping: DashMap::new(),
        }
    }

    /// Derive the pending-lock key for a flow key.
    pub fn lock_key(key: &str) -> String {
        format!("{key}{LOCK_SUFFIX}")
    }

    /// Insert or overwrite the live entry for `key`.
    pub fn set(&self, key: &str, conn: Arc<dyn PacketConn>) {
        self.mapping.insert(key.to_string(), NatSlot::Conn(conn));
    }

    /// Live entry for `key`, if any. Pending locks are not returned.
    pub fn get(&self, key: &str) -> Option<Arc<dyn PacketConn>> {
        match self.mapping.get(key).map(|slot| slot.clone()) {
            Some(NatSlot::Conn(conn)) => Some(conn),
            _ => None,
        }
    }

    /// Atomically return the slot under `key`, or install a fresh
    /// pending lock. `true` means the slot already existed and the
    /// caller is a waiter; `false` means the caller installed the lock
    /// and is the single task responsible for setting up the flow.
    pub fn get_or_create_lock(&self, key: &str) -> (NatSlot, bool) {
        match self.mapping.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), true),
            Entry::Vacant(vacant) => {
                let slot = NatSlot::Pending(Arc::new(Notify::new()));
                vacant.insert(slot.clone());
                (slot, false)
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.mapping.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.mapping.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Drop every entry. Live conns are released, not closed; their
    /// owning flows observe the close through I/O errors.
    pub fn clear(&self) {
        self.mapping.clear();
    }
}
