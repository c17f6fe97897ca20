//! Bounded buffer of idle resources

use crossbeam::queue::ArrayQueue;

use crate::resource::PooledResource;

/// Fixed-capacity, lock-free queue of idle records.
///
/// A buffer never changes capacity. Resizing builds a new buffer and the pool
/// swaps its handle, so every buffer a caller has loaded stays valid.
pub(crate) struct IdleBuffer<T> {
    queue: ArrayQueue<PooledResource<T>>,
}

impl<T> IdleBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
        }
    }

    pub fn try_pop(&self) -> Option<PooledResource<T>> {
        self.queue.pop()
    }

    /// Push without blocking, handing the record back when full
    pub fn try_push(&self, record: PooledResource<T>) -> Result<(), PooledResource<T>> {
        self.queue.push(record)
    }

    /// Pop until empty; records pushed concurrently may or may not be seen
    pub fn drain(&self) -> impl Iterator<Item = PooledResource<T>> + '_ {
        std::iter::from_fn(move || self.queue.pop())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }
}
