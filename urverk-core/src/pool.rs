//! ## urverk-core::pool
//! **Recycled per-bag buffers**
//!
//! Events are short-lived: they exist from the λ call that emits them until
//! the transition that consumes them, never past the end of the bag. The
//! pool hands out cleared `Vec`s and takes them back when the bag closes, so
//! steady-state simulation allocates nothing on the hot path.

/// A free-list of reusable `Vec<T>` buffers.
pub struct BufferPool<T> {
    free: Vec<Vec<T>>,
    buffer_capacity: usize,
    max_free: usize,
    taken: usize,
    recycled: usize,
}

impl<T> BufferPool<T> {
    /// `buffer_capacity` sizes fresh buffers; `max_free` bounds how many idle
    /// buffers the pool retains between bags.
    pub fn new(buffer_capacity: usize, max_free: usize) -> Self {
        Self {
            free: Vec::with_capacity(max_free),
            buffer_capacity,
            max_free,
            taken: 0,
            recycled: 0,
        }
    }

    /// Hands out an empty buffer, reusing a recycled one when available.
    pub fn take(&mut self) -> Vec<T> {
        self.taken += 1;
        match self.free.pop() {
            Some(buf) => {
                self.recycled += 1;
                buf
            }
            None => Vec::with_capacity(self.buffer_capacity),
        }
    }

    /// Returns a buffer to the pool. Contents are dropped here; capacity is
    /// kept for the next bag.
    pub fn put_back(&mut self, mut buf: Vec<T>) {
        buf.clear();
        if self.free.len() < self.max_free {
            self.free.push(buf);
        }
    }

    /// Rebounds the idle-buffer retention, dropping surplus buffers.
    pub fn set_max_free(&mut self, max_free: usize) {
        self.max_free = max_free;
        self.free.truncate(max_free);
    }

    /// Buffers handed out since construction.
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// How many of those avoided a fresh allocation.
    pub fn recycled(&self) -> usize {
        self.recycled
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new(16, 64)
    }
}
