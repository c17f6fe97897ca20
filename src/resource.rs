//! The record wrapping every pooled resource

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use uuid::Uuid;

/// A resource together with its identity and lifecycle timestamps.
///
/// Whoever holds the record owns the resource exclusively: the idle buffer
/// while it is idle, the caller while it is borrowed. Hand it back with
/// [`ResourcePool::release`](crate::ResourcePool::release) or
/// [`ResourcePool::discard`](crate::ResourcePool::discard); dropping it
/// instead leaks a slot in the pool's total count.
pub struct PooledResource<T> {
    id: Uuid,
    created_at: Instant,
    last_returned_at: Instant,
    temporary: bool,
    value: T,
}

impl<T> PooledResource<T> {
    pub(crate) fn new(value: T, temporary: bool) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_returned_at: now,
            temporary,
            value,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the record last left or re-entered the pool
    pub fn last_returned_at(&self) -> Instant {
        self.last_returned_at
    }

    /// Whether this record was created as overflow after an acquire timed out
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub(crate) fn touch(&mut self) {
        self.last_returned_at = Instant::now();
    }

    pub(crate) fn settle(&mut self) {
        self.temporary = false;
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: std::time::Duration) {
        if let Some(earlier) = self.last_returned_at.checked_sub(by) {
            self.last_returned_at = earlier;
        }
        if let Some(earlier) = self.created_at.checked_sub(by) {
            self.created_at = earlier;
        }
    }

    pub(crate) fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for PooledResource<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T> fmt::Debug for PooledResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("temporary", &self.temporary)
            .field("age", &self.created_at.elapsed())
            .field("idle", &self.last_returned_at.elapsed())
            .finish_non_exhaustive()
    }
}
