//! Lock-free index ring for the row buffer pool.
//!
//! The queue only tracks indices; the buffers live in
//! [`RefreshState`](crate::RefreshState). There is exactly one writer, the row
//! calculation handler, and one reader, the shift-complete handler.
//!
//! Both counters run modulo `2 * CAP` so that a full queue (`len == CAP`) can
//! be told apart from an empty one without a separate flag. Each counter is
//! only ever stored by its owning side, with release ordering, after the slot
//! it covers has been written or consumed.

use core::sync::atomic::{AtomicUsize, Ordering};

pub struct RowQueue<const CAP: usize> {
    write: AtomicUsize,
    read: AtomicUsize,
}

impl<const CAP: usize> RowQueue<CAP> {
    pub const fn new() -> Self {
        RowQueue { write: AtomicUsize::new(0), read: AtomicUsize::new(0) }
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Number of committed rows not yet released by the reader.
    pub fn len(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        (w + 2 * CAP - r) % (2 * CAP)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == CAP
    }

    /// Slot the writer fills next.
    pub fn next_write_slot(&self) -> usize {
        self.write.load(Ordering::Relaxed) % CAP
    }

    /// Publish the slot returned by [`next_write_slot`](Self::next_write_slot).
    ///
    /// Must only be called by the writer, and only while the queue is not full.
    pub fn commit_write(&self) {
        debug_assert!(!self.is_full(), "commit_write on a full row queue");
        let w = self.write.load(Ordering::Relaxed);
        self.write.store((w + 1) % (2 * CAP), Ordering::Release);
    }

    /// Oldest committed slot.
    pub fn next_read_slot(&self) -> usize {
        self.read.load(Ordering::Relaxed) % CAP
    }

    /// Release the slot returned by [`next_read_slot`](Self::next_read_slot).
    ///
    /// Must only be called by the reader, and only while the queue is not empty.
    pub fn commit_read(&self) {
        debug_assert!(!self.is_empty(), "commit_read on an empty row queue");
        let r = self.read.load(Ordering::Relaxed);
        self.read.store((r + 1) % (2 * CAP), Ordering::Release);
    }

    /// Return both counters to zero.
    pub fn reset(&mut self) {
        *self.write.get_mut() = 0;
        *self.read.get_mut() = 0;
    }
}

impl<const CAP: usize> Default for RowQueue<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_and_drains() {
        let q = RowQueue::<3>::new();
        assert!(q.is_empty());
        for expected in 0..3 {
            assert_eq!(q.next_write_slot(), expected);
            q.commit_write();
        }
        assert!(q.is_full());
        assert_eq!(q.len(), 3);
        assert_eq!(q.next_read_slot(), 0);
        q.commit_read();
        assert_eq!(q.len(), 2);
        assert_eq!(q.next_write_slot(), 0);
        q.commit_write();
        assert!(q.is_full());
        for expected in [1, 2, 0] {
            assert_eq!(q.next_read_slot(), expected);
            q.commit_read();
        }
        assert!(q.is_empty());
    }

    #[test]
    fn counters_wrap() {
        let q = RowQueue::<2>::new();
        for i in 0..100 {
            assert_eq!(q.next_write_slot(), i % 2);
            q.commit_write();
            assert_eq!(q.len(), 1);
            assert_eq!(q.next_read_slot(), i % 2);
            q.commit_read();
            assert!(q.is_empty());
        }
    }

    #[test]
    fn reset_empties() {
        let mut q = RowQueue::<4>::new();
        q.commit_write();
        q.commit_write();
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.next_write_slot(), 0);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn overfull_commit_is_caught() {
        let q = RowQueue::<2>::new();
        q.commit_write();
        q.commit_write();
        q.commit_write();
    }
}
