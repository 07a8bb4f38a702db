//! Lock-free relay buffer pool
//!
//! The UDP downstream pump reads into pooled buffers of the standard
//! relay size so long-lived sessions do not allocate per flow. Buffers
//! are handed out as RAII handles and return to the pool on drop; when
//! the pool is empty a fresh buffer is allocated, and when it is full
//! the returning buffer is simply freed.

use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Standard relay buffer size for proxied datagrams.
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Default number of buffers kept in the pool.
pub const DEFAULT_POOL_CAPACITY: usize = 512;

pub struct BufferPool {
    buffers: ArrayQueue<Vec<u8>>,
    buf_size: usize,
}

impl BufferPool {
    pub fn new(capacity: usize, buf_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buffers: ArrayQueue::new(capacity.max(1)),
            buf_size,
        })
    }

    /// Pool with the standard relay geometry.
    pub fn relay() -> Arc<Self> {
        Self::new(DEFAULT_POOL_CAPACITY, RELAY_BUFFER_SIZE)
    }

    pub fn get(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .buffers
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }
}

/// A buffer checked out of a [`BufferPool`]; returns on drop.
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let _ = self.pool.buffers.push(buf);
        }
    }
}
