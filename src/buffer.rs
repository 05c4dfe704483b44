//! Reusable buffers for a session's read/write/column-scratch memory, plus
//! a pool so repeated connect/close cycles don't re-allocate them.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

const DEFAULT_READ_CAPACITY: usize = 8192;
const DEFAULT_WRITE_CAPACITY: usize = 4096;
const DEFAULT_COLUMN_CAPACITY: usize = 1024;
const POOL_CAPACITY: usize = 128;

/// The three scratch buffers a session needs: the raw read buffer, the
/// pending-write buffer (subject to the save/restore discipline around
/// `Sync`), and a small scratch buffer used while assembling one column's
/// worth of `Bind` parameter bytes.
#[derive(Debug)]
pub struct BufferSet {
    pub read_buffer: Vec<u8>,
    pub write_buffer: Vec<u8>,
    pub column_buffer: Vec<u8>,
    /// Type byte of the most recently read message, kept alongside the
    /// buffers it was read into.
    pub type_byte: u8,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(DEFAULT_READ_CAPACITY),
            write_buffer: Vec::with_capacity(DEFAULT_WRITE_CAPACITY),
            column_buffer: Vec::with_capacity(DEFAULT_COLUMN_CAPACITY),
            type_byte: 0,
        }
    }

    fn reset(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.column_buffer.clear();
        self.type_byte = 0;
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool of `BufferSet`s, so opening and closing many short-lived sessions
/// doesn't repeatedly pay for the underlying `Vec` allocations.
#[derive(Debug)]
pub struct BufferPool {
    buffer_sets: ArrayQueue<BufferSet>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer_sets: ArrayQueue::new(capacity),
        }
    }

    /// Take a buffer set from the pool, or allocate a fresh one if empty.
    pub fn acquire(self: &Arc<Self>) -> PooledBufferSet {
        let buffer_set = self.buffer_sets.pop().unwrap_or_default();
        PooledBufferSet::new(Arc::clone(self), buffer_set)
    }

    fn release(&self, mut buffer_set: BufferSet) {
        buffer_set.reset();
        let _ = self.buffer_sets.push(buffer_set);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(POOL_CAPACITY)
    }
}

/// A `BufferSet` borrowed from a `BufferPool`; returns itself to the pool
/// on drop instead of being deallocated.
pub struct PooledBufferSet {
    pool: Arc<BufferPool>,
    inner: ManuallyDrop<BufferSet>,
}

impl PooledBufferSet {
    fn new(pool: Arc<BufferPool>, buffer_set: BufferSet) -> Self {
        Self {
            pool,
            inner: ManuallyDrop::new(buffer_set),
        }
    }
}

impl Deref for PooledBufferSet {
    type Target = BufferSet;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledBufferSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for PooledBufferSet {
    fn drop(&mut self) {
        // SAFETY: `inner` is not touched again after this `take`.
        let buffer_set = unsafe { ManuallyDrop::take(&mut self.inner) };
        self.pool.release(buffer_set);
    }
}
