//! Buffer pool implementation for relay buffer reuse
//!
//! This module provides a thread-safe pool of fixed-size byte buffers. The
//! relay takes one buffer per direction and hands it back when the direction
//! ends, so a long-lived tunnel does not allocate per transfer.

use bytes::BytesMut;
use log::trace;
use once_cell::sync::Lazy;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Size of a relay buffer (20 KiB)
pub const RELAY_BUFFER_SIZE: usize = 20 * 1024;

/// Default number of idle buffers kept around
pub const DEFAULT_MAX_IDLE: usize = 16;

static SHARED_POOL: Lazy<BufferPool> = Lazy::new(|| BufferPool::new(RELAY_BUFFER_SIZE));

/// A pool of reusable, fixed-size byte buffers
///
/// Cloning is cheap; clones share the same free list.
#[derive(Clone, Debug)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

#[derive(Debug)]
struct BufferPoolInner {
    /// Buffers waiting to be handed out again
    free: Mutex<Vec<BytesMut>>,
    /// Exact length of every buffer this pool hands out
    buffer_size: usize,
    /// Upper bound on the free list
    max_idle: usize,
}

/// A buffer borrowed from the pool
///
/// Derefs to a `[u8]` of exactly the pool's buffer size. Dropping it returns
/// the memory to the pool, however the borrower's loop ended.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<BytesMut>,
    pool: BufferPool,
}

impl BufferPool {
    /// Create a new buffer pool
    ///
    /// # Parameters
    ///
    /// * `buffer_size` - Length of every buffer handed out by `acquire`
    pub fn new(buffer_size: usize) -> Self {
        Self::with_max_idle(buffer_size, DEFAULT_MAX_IDLE)
    }

    /// Create a pool that retains at most `max_idle` released buffers
    pub fn with_max_idle(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                free: Mutex::new(Vec::new()),
                buffer_size,
                max_idle,
            }),
        }
    }

    /// Process-wide pool of `RELAY_BUFFER_SIZE` buffers
    pub fn shared() -> &'static BufferPool {
        &SHARED_POOL
    }

    /// Length of the buffers this pool hands out
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of released buffers currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.free().len()
    }

    /// Take a buffer out of the pool, allocating one if the pool is empty
    pub fn acquire(&self) -> PooledBuffer {
        let reused = self.free().pop();
        let buffer = match reused {
            Some(buffer) => buffer,
            None => {
                trace!("Buffer pool empty, allocating {} bytes", self.inner.buffer_size);
                BytesMut::zeroed(self.inner.buffer_size)
            }
        };

        PooledBuffer {
            buffer: Some(buffer),
            pool: self.clone(),
        }
    }

    /// Return a buffer to the pool
    ///
    /// Buffers whose length differs from the pool's size are dropped, as are
    /// buffers that would push the free list past its idle limit.
    pub fn release(&self, buffer: BytesMut) {
        if buffer.len() != self.inner.buffer_size {
            trace!(
                "Discarding buffer of {} bytes (pool size {})",
                buffer.len(),
                self.inner.buffer_size
            );
            return;
        }

        let mut free = self.free();
        if free.len() < self.inner.max_idle {
            free.push(buffer);
        }
    }

    fn free(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        // The free list stays consistent even if a holder panicked.
        self.inner.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(RELAY_BUFFER_SIZE)
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}
