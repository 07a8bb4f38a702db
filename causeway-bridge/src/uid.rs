//! Process-wide application identity
//!
//! The embedding platform installs one [`UidDumper`] for the whole
//! process and keeps two foreground markers (the active app's uid and
//! its input method's uid) current as the user switches apps. Flow
//! handlers read the markers with relaxed atomic loads; writes only
//! happen on user interaction.

use crate::error::Result;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Package metadata for a resolved uid, used for debug logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidInfo {
    pub package_name: String,
    pub label: String,
}

/// Maps a 5-tuple to the owning application uid on the host OS.
#[async_trait::async_trait]
pub trait UidDumper: Send + Sync {
    async fn dump_uid(
        &self,
        ipv6: bool,
        udp: bool,
        src: SocketAddr,
        dst: SocketAddr,
    ) -> Result<i32>;

    async fn uid_info(&self, uid: i32) -> Result<UidInfo>;
}

static UID_DUMPER: RwLock<Option<Arc<dyn UidDumper>>> = RwLock::new(None);

static FOREGROUND_UID: AtomicU32 = AtomicU32::new(0);
static FOREGROUND_IME_UID: AtomicU32 = AtomicU32::new(0);

/// Install the process-wide uid resolver.
pub fn set_uid_dumper(dumper: Arc<dyn UidDumper>) {
    *UID_DUMPER.write() = Some(dumper);
}

/// Remove the process-wide uid resolver.
pub fn clear_uid_dumper() {
    *UID_DUMPER.write() = None;
}

pub(crate) fn uid_dumper() -> Option<Arc<dyn UidDumper>> {
    UID_DUMPER.read().clone()
}

/// Mark `uid` as the foreground application.
pub fn set_foreground_uid(uid: u32) {
    FOREGROUND_UID.store(uid, Ordering::Relaxed);
}

/// Mark `uid` as the foreground input method.
pub fn set_foreground_ime_uid(uid: u32) {
    FOREGROUND_IME_UID.store(uid, Ordering::Relaxed);
}

pub(crate) fn is_foreground(uid: u32) -> bool {
    uid == FOREGROUND_UID.load(Ordering::Relaxed)
        || uid == FOREGROUND_IME_UID.load(Ordering::Relaxed)
}

/// The uid this process runs as; flows it originates itself are
/// excluded from accounting to avoid recursion.
pub(crate) fn process_uid() -> u32 {
    unsafe { libc::getuid() }
}
