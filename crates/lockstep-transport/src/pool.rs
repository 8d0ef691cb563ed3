//! Size-classed byte buffer pool for the send/receive hot path.
//!
//! Buffers are grouped into classes of fixed length:
//! `min, min + step, min + 2*step, ..., max` with `step = 1 << step_bits`.
//! [`BufferPool::get`] rounds a request up to the next class and pops a free
//! buffer of that length, allocating only when the class queue is empty.
//! Requests above `max` bypass the pool entirely.
//!
//! A buffer may be longer than what the caller asked for. Callers track how
//! many bytes they actually wrote and only use that prefix.
//!
//! All mutations go through one lock, so the pool is shared freely between
//! the lobby connections, the battle poll loop and every room's tick task.
//! The pool never blocks and never fails: exhaustion falls back to the heap.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Free buffers kept per class. Releases beyond this are dropped.
pub const MAX_QUEUE_LEN: usize = 32;

/// Size-class layout for a [`BufferPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Smallest class length. Clamped to at least 2.
    pub min: usize,
    /// Largest class length. Clamped to at least `min`.
    pub max: usize,
    /// Class spacing is `1 << step_bits` bytes.
    pub step_bits: u32,
    /// Buffers pre-allocated in each class.
    pub per_class: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 16,
            max: 4096,
            step_bits: 4,
            per_class: 4,
        }
    }
}

/// What [`BufferPool::release`] did with a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Pushed back onto its class queue.
    Pooled,
    /// Length doesn't match any class; dropped.
    Untracked,
    /// The class queue was already full; dropped.
    QueueFull,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers served from a class queue.
    pub reused: u64,
    /// Buffers allocated because a class queue was empty.
    pub allocated: u64,
    /// Buffers allocated outside the pool (request above `max`).
    pub oversize: u64,
}

#[derive(Debug)]
struct Inner {
    classes: HashMap<usize, VecDeque<Vec<u8>>>,
    stats: PoolStats,
}

/// A thread-safe pool of reusable byte buffers. See the module docs.
#[derive(Debug)]
pub struct BufferPool {
    min: usize,
    max: usize,
    step: usize,
    inner: Mutex<Inner>,
}

impl BufferPool {
    /// Builds the size classes and pre-populates each with
    /// `config.per_class` zeroed buffers.
    pub fn new(config: &PoolConfig) -> Self {
        let min = config.min.max(2);
        let max = config.max.max(min);
        let step = 1usize << config.step_bits;

        let mut classes = HashMap::new();
        let mut size = min;
        while size <= max {
            let queue: VecDeque<Vec<u8>> =
                (0..config.per_class).map(|_| vec![0u8; size]).collect();
            classes.insert(size, queue);
            size += step;
        }

        Self {
            min,
            max,
            step,
            inner: Mutex::new(Inner {
                classes,
                stats: PoolStats::default(),
            }),
        }
    }

    /// A pool with no classes. Every `get` allocates exactly `size`.
    pub fn unpooled() -> Self {
        Self {
            min: 2,
            max: 0,
            step: 1,
            inner: Mutex::new(Inner {
                classes: HashMap::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    /// The class length `size` rounds up to, or `None` if it is served
    /// outside the pool.
    pub fn class_for(&self, size: usize) -> Option<usize> {
        if size > self.max {
            return None;
        }
        if size <= self.min {
            return Some(self.min);
        }
        let steps = (size - self.min).div_ceil(self.step);
        let class = self.min + steps * self.step;
        (class <= self.max).then_some(class)
    }

    /// Returns a buffer of at least `size` bytes.
    ///
    /// The buffer's length is the class length, not `size`. Contents are
    /// whatever the previous user left there.
    pub fn get(&self, size: usize) -> Vec<u8> {
        let Some(class) = self.class_for(size) else {
            self.inner.lock().stats.oversize += 1;
            return vec![0u8; size];
        };

        let mut inner = self.inner.lock();
        if let Some(buf) = inner.classes.get_mut(&class).and_then(VecDeque::pop_front) {
            inner.stats.reused += 1;
            return buf;
        }
        inner.stats.allocated += 1;
        drop(inner);
        vec![0u8; class]
    }

    /// Hands a buffer back to the pool.
    ///
    /// Takes the buffer by value, so a caller can't release the same
    /// allocation twice; once released it belongs to the queue.
    pub fn release(&self, buf: Vec<u8>) -> Release {
        let len = buf.len();
        if len < self.min || len > self.max {
            return Release::Untracked;
        }

        let mut inner = self.inner.lock();
        let Some(queue) = inner.classes.get_mut(&len) else {
            return Release::Untracked;
        };
        if queue.len() >= MAX_QUEUE_LEN {
            return Release::QueueFull;
        }
        queue.push_back(buf);
        Release::Pooled
    }

    /// Number of free buffers queued in the class of length `class`.
    pub fn available(&self, class: usize) -> usize {
        self.inner
            .lock()
            .classes
            .get(&class)
            .map_or(0, VecDeque::len)
    }

    /// Snapshot of the reuse counters.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }

    /// Drops every queued buffer. Classes stay configured.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for queue in inner.classes.values_mut() {
            queue.clear();
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}
