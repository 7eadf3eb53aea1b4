//! Single-Producer/Single-Consumer Ring Buffer
//!
//! A power-of-two-capacity byte/record queue used as the boundary
//! between a driver's receive path (producer) and the MS/TP FSM
//! (consumer). No dynamic allocation after construction: the caller
//! supplies the backing storage (a `Vec<T>` sized once at
//! construction and never resized).
//!
//! # Concurrency
//!
//! Safe for exactly one producer and one consumer operating
//! concurrently, provided the platform has ordered writes to aligned
//! words. The producer only ever writes `head`; the consumer only
//! ever writes `tail`; each reads the other's counter. A
//! [`Ordering::Release`] store to `head` after the payload write, and
//! an [`Ordering::Acquire`] load of `head` before reading the payload,
//! give the same guarantee the spec describes as "a release fence
//! after writing the payload ... a matching acquire fence before
//! reading" (§5). On most MCU targets this reduces to a compiler
//! barrier; on multi-core hosts it is a real fence.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::sync::atomic::{AtomicUsize, Ordering};

/// Errors produced by ring buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// `put` was called with the buffer already at capacity.
    Full,
    /// `pop`/`peek` was called with no elements queued.
    Empty,
}

/// A fixed-capacity, power-of-two-sized single-producer/
/// single-consumer ring buffer of `T`.
///
/// `T` must implement `Clone` and `Default` — elements are read out
/// by value (`pop`/`peek` clone the slot) rather than borrowed, which
/// keeps the producer/consumer split free of lifetime entanglement.
pub struct RingBuffer<T> {
    storage: Vec<T>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    depth_high_watermark: AtomicUsize,
}

impl<T: Clone + Default> RingBuffer<T> {
    /// Create a new ring buffer. `capacity` must be a power of two and
    /// at least 1; otherwise it is rounded up to the next power of
    /// two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            storage: vec![T::default(); capacity],
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            depth_high_watermark: AtomicUsize::new(0),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Number of queued elements. Computed as `head - tail` under
    /// unsigned wraparound, so it is correct even after the counters
    /// wrap past `usize::MAX`.
    pub fn len(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// High-watermark depth observed since construction, for
    /// diagnostics.
    pub fn high_watermark(&self) -> usize {
        self.depth_high_watermark.load(Ordering::Relaxed)
    }

    /// Producer-side: push `value` onto the back of the queue.
    ///
    /// # Safety / concurrency
    ///
    /// Must only be called from the single producer. Safe to call
    /// concurrently with a consumer calling `pop`/`peek`.
    pub fn put(&mut self, value: T) -> Result<(), RingError> {
        if self.is_full() {
            return Err(RingError::Full);
        }
        let head = self.head.load(Ordering::Relaxed);
        let idx = head & self.mask;
        self.storage[idx] = value;
        // Release: payload write above must be visible before a
        // consumer observes the new head.
        self.head.store(head.wrapping_add(1), Ordering::Release);

        let depth = self.len();
        let mut hw = self.depth_high_watermark.load(Ordering::Relaxed);
        while depth > hw {
            match self.depth_high_watermark.compare_exchange_weak(
                hw,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => hw = observed,
            }
        }
        Ok(())
    }

    /// Single-threaded variant: push `value` onto the *front* of the
    /// queue by decrementing `tail`. Only safe when there is no
    /// concurrent consumer — intended for a port re-queuing a frame it
    /// pulled but could not send (see master FSM retry path).
    pub fn put_front(&mut self, value: T) -> Result<(), RingError> {
        if self.is_full() {
            return Err(RingError::Full);
        }
        let tail = self.tail.load(Ordering::Relaxed);
        let new_tail = tail.wrapping_sub(1);
        let idx = new_tail & self.mask;
        self.storage[idx] = value;
        self.tail.store(new_tail, Ordering::Release);
        Ok(())
    }

    /// Consumer-side: pop the front element.
    ///
    /// # Safety / concurrency
    ///
    /// Must only be called from the single consumer. Safe to call
    /// concurrently with a producer calling `put`.
    pub fn pop(&mut self) -> Result<T, RingError> {
        if self.is_empty() {
            return Err(RingError::Empty);
        }
        let tail = self.tail.load(Ordering::Relaxed);
        let idx = tail & self.mask;
        // Acquire: pairs with the producer's Release store to head,
        // ensuring the payload write is visible here.
        let _ = self.head.load(Ordering::Acquire);
        let value = self.storage[idx].clone();
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(value)
    }

    /// Consumer-side: borrow the front element without removing it.
    pub fn peek(&self) -> Result<T, RingError> {
        if self.is_empty() {
            return Err(RingError::Empty);
        }
        let tail = self.tail.load(Ordering::Relaxed);
        let idx = tail & self.mask;
        let _ = self.head.load(Ordering::Acquire);
        Ok(self.storage[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let rb: RingBuffer<u8> = RingBuffer::new(5);
        assert_eq!(rb.capacity(), 8);
    }

    #[test]
    fn put_then_pop_returns_same_value() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        rb.put(42).unwrap();
        assert_eq!(rb.pop().unwrap(), 42);
        assert!(rb.is_empty());
    }

    #[test]
    fn full_after_capacity_puts() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        for i in 0..4 {
            rb.put(i).unwrap();
        }
        assert!(rb.is_full());
        assert_eq!(rb.put(99), Err(RingError::Full));
    }

    #[test]
    fn pop_on_empty_fails() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        assert_eq!(rb.pop(), Err(RingError::Empty));
    }

    #[test]
    fn fifo_ordering_preserved() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        for i in 0..4 {
            rb.put(i).unwrap();
        }
        for i in 0..4 {
            assert_eq!(rb.pop().unwrap(), i);
        }
    }

    #[test]
    fn peek_does_not_mutate() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        rb.put(7).unwrap();
        assert_eq!(rb.peek().unwrap(), 7);
        assert_eq!(rb.len(), 1);
        assert_eq!(rb.pop().unwrap(), 7);
    }

    #[test]
    fn put_front_prepends() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        rb.put(1).unwrap();
        rb.put(2).unwrap();
        rb.put_front(0).unwrap();
        assert_eq!(rb.pop().unwrap(), 0);
        assert_eq!(rb.pop().unwrap(), 1);
        assert_eq!(rb.pop().unwrap(), 2);
    }

    #[test]
    fn high_watermark_tracks_peak_depth() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(8);
        rb.put(1).unwrap();
        rb.put(2).unwrap();
        rb.put(3).unwrap();
        rb.pop().unwrap();
        assert_eq!(rb.high_watermark(), 3);
    }

    #[test]
    fn wraps_many_times_without_losing_fifo_order() {
        let mut rb: RingBuffer<u8> = RingBuffer::new(4);
        for round in 0u8..50 {
            rb.put(round).unwrap();
            rb.put(round.wrapping_add(100)).unwrap();
            assert_eq!(rb.pop().unwrap(), round);
            assert_eq!(rb.pop().unwrap(), round.wrapping_add(100));
        }
        assert!(rb.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fifo_order_holds_for_any_interleaving_of_puts_and_pops(
            ops in proptest::collection::vec(any::<bool>(), 1..200)
        ) {
            let mut rb: RingBuffer<u32> = RingBuffer::new(16);
            let mut model: std::collections::VecDeque<u32> = std::collections::VecDeque::new();
            let mut next = 0u32;
            for put in ops {
                if put || model.is_empty() {
                    if rb.put(next).is_ok() {
                        model.push_back(next);
                    }
                    next = next.wrapping_add(1);
                } else {
                    let expected = model.pop_front();
                    let got = rb.pop().ok();
                    prop_assert_eq!(got, expected);
                }
            }
            prop_assert!(rb.len() <= rb.capacity());
        }

        #[test]
        fn never_exceeds_capacity_regardless_of_put_count(n in 0usize..40) {
            let mut rb: RingBuffer<u8> = RingBuffer::new(8);
            let mut accepted = 0;
            for i in 0..n {
                if rb.put(i as u8).is_ok() {
                    accepted += 1;
                }
            }
            prop_assert!(accepted <= rb.capacity());
            prop_assert!(rb.len() <= rb.capacity());
        }
    }
}
