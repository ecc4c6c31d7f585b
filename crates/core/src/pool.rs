// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bounded non-blocking object pool.
//!
//! A thin wrapper over a lock-free bounded queue: `push` refuses (and hands
//! the object back) when the pool is full, `pop` returns `None` when it is
//! empty. Producers and consumers may race freely; there is no mutex on any
//! path, so the pool is safe to touch from buffer release running on another
//! thread.

use crossbeam::queue::ArrayQueue;

/// Fixed-capacity recycling pool for objects of type `T`.
pub struct Pool<T> {
    queue: ArrayQueue<T>,
}

impl<T> Pool<T> {
    /// Creates a pool holding at most `capacity` objects.
    ///
    /// A zero capacity is clamped to one; a pool that can never hold
    /// anything would make every release a free.
    pub fn new(capacity: usize) -> Self {
        Self { queue: ArrayQueue::new(capacity.max(1)) }
    }

    /// Offers an object to the pool. Returns it back if the pool is full,
    /// leaving the caller to drop it.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.queue.push(item)
    }

    /// Takes an object out of the pool, if any.
    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Number of objects currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of pooled objects.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drops every pooled object.
    pub fn drain(&self) {
        while self.queue.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_refuses_when_full() {
        let pool = Pool::new(2);
        assert!(pool.push(1).is_ok());
        assert!(pool.push(2).is_ok());
        assert_eq!(pool.push(3), Err(3));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn pop_empties_in_order_of_availability() {
        let pool = Pool::new(4);
        assert!(pool.pop().is_none());
        pool.push(7).unwrap();
        assert_eq!(pool.pop(), Some(7));
        assert!(pool.pop().is_none());
    }

    #[test]
    fn concurrent_producers_and_consumers() {
        let pool = Arc::new(Pool::new(64));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let producer = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000u32 {
                    let _ = producer.push(i);
                }
            }));
            let consumer = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _ = consumer.pop();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.len() <= pool.capacity());
    }
}
