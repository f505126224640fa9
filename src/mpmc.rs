//! Lock-free multi-producer/multi-consumer ring.
//!
//! Each of the `N` positions is a single tagged `u64` (see [`slot`]). Two
//! positions are always reserved as sentinels: the slot at the write counter
//! holds `IN` ("nothing published here yet") and the slot at the read counter
//! holds `OUT|seq` (the boundary the next consumer claims). Published
//! payloads live strictly between them, so the counters are never less than
//! one apart and at most `N - 2` elements are stored.
//!
//! A producer at position `cur` claims the ring by moving slot `cur + 1` from
//! `EMPTY|cur+1` to `IN`, writes its payload over the old `IN` at `cur`, then
//! bumps the write counter. A consumer at `cur` reads the payload at
//! `cur + 1`, retires slot `cur` from `OUT|cur` to `EMPTY|cur+N`, moves the
//! boundary to `OUT|cur+1`, then bumps the read counter. Sequence tags keep
//! a stale claim from matching a later generation of the same slot.

use core::fmt;
use core::marker::PhantomData;
use core::mem;

use crossbeam_utils::CachePadded;
use tracing::{debug, trace, warn};

use crate::error::{PopError, PushError};
use crate::ring;
use crate::sync::{self, AtomicU64, AtomicUsize, Ordering};

pub mod payload;
pub(crate) mod slot;

use payload::{Boxed, Encoding, Inline};

/// Fixed-capacity MPMC ring.
///
/// `N` must be a power of two greater than 2. The encoding `E` decides how an
/// element fits in a slot word: [`Boxed`] (the default) works for every `T`,
/// [`Inline`] stores pointer-sized handles such as `Box<U>` without an extra
/// allocation.
pub struct MpmcQueue<T, const N: usize, E: Encoding<T> = Boxed> {
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
    slots: Box<[AtomicU64]>,
    _marker: PhantomData<(T, fn() -> E)>,
}

/// An [`MpmcQueue`] that stores pointer-sized handles directly.
pub type InlineQueue<T, const N: usize> = MpmcQueue<T, N, Inline>;

unsafe impl<T: Send, const N: usize, E: Encoding<T>> Send for MpmcQueue<T, N, E> {}
unsafe impl<T: Send, const N: usize, E: Encoding<T>> Sync for MpmcQueue<T, N, E> {}

impl<T, const N: usize, E: Encoding<T>> MpmcQueue<T, N, E> {
    /// Creates an empty queue.
    ///
    /// # Panics
    ///
    /// If `N` is not a power of two greater than 2.
    pub fn new() -> Self {
        ring::assert_capacity(N, 2);
        debug!(capacity = N, holder = E::OWNS_HOLDER, "created mpmc queue");
        Self::starting_at(0)
    }

    /// Seeds the sentinels so that the read counter sits at `pos`.
    fn starting_at(pos: usize) -> Self {
        let mask = ring::mask(N);
        let boundary = ring::index(pos, mask);
        let claimed = ring::index(pos.wrapping_add(1), mask);
        let first_free = pos.wrapping_add(2);

        let slots = (0..N)
            .map(|i| {
                let word = if i == boundary {
                    slot::out(pos)
                } else if i == claimed {
                    slot::IN
                } else {
                    // The first position at or after `first_free` that maps
                    // to slot `i`.
                    slot::empty(first_free.wrapping_add(i.wrapping_sub(first_free) & mask))
                };
                AtomicU64::new(word)
            })
            .collect();

        Self {
            write: CachePadded::new(AtomicUsize::new(pos.wrapping_add(1))),
            read: CachePadded::new(AtomicUsize::new(pos)),
            slots,
            _marker: PhantomData,
        }
    }

    /// Enqueues `value`.
    ///
    /// Fails with [`PushError::Full`] when the ring is observed full, with
    /// [`PushError::Alloc`] when a holder cannot be allocated and with
    /// [`PushError::Unrepresentable`] when the element's address collides
    /// with the slot tags. On failure the queue is left unchanged and the
    /// value is returned.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let Some(cur) = self.claim() else {
            return Err(PushError::Full(value));
        };

        match E::encode(value) {
            Ok(word) => {
                self.publish(cur, word);
                Ok(())
            }
            Err(err) => {
                self.rollback(cur);
                warn!(position = cur, error = %err, "payload not stored, released slot claim");
                Err(err)
            }
        }
    }

    /// Dequeues the oldest published element.
    pub fn pop(&self) -> Result<T, PopError> {
        let word = self.take().ok_or(PopError::Empty)?;
        // SAFETY: `take` hands out each published word exactly once.
        Ok(unsafe { E::decode(word) })
    }

    /// Published elements. Advisory under concurrent use.
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        ring::occupancy(write, read)
            .saturating_sub(1)
            .min(self.capacity())
    }

    /// Whether no published element is pending. Advisory under concurrent use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of elements, `N - 2`.
    pub const fn capacity(&self) -> usize {
        N - 2
    }

    #[inline(always)]
    fn slot(&self, pos: usize) -> &AtomicU64 {
        &self.slots[ring::index(pos, ring::mask(N))]
    }

    /// Reserves the slot at the current write position.
    ///
    /// On success the caller must either [`publish`](Self::publish) or
    /// [`rollback`](Self::rollback) the returned position; every other
    /// producer waits until it does.
    fn claim(&self) -> Option<usize> {
        loop {
            let cur = self.write.load(Ordering::Acquire);
            let next = cur.wrapping_add(1);
            let guard = self.slot(next);

            if slot::is_out(guard.load(Ordering::Acquire)) {
                if self.write.load(Ordering::Acquire) == cur {
                    return None;
                }
                continue;
            }

            if guard
                .compare_exchange(slot::empty(next), slot::IN, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(cur);
            }
            sync::spin_loop();
        }
    }

    fn publish(&self, cur: usize, word: u64) {
        self.slot(cur).store(word, Ordering::Release);
        self.write.fetch_add(1, Ordering::Release);
    }

    /// Returns a claimed but unwritten slot to the free pool.
    fn rollback(&self, cur: usize) {
        let next = cur.wrapping_add(1);
        self.slot(next).store(slot::empty(next), Ordering::Release);
    }

    /// Removes the payload word at the front of the ring.
    fn take(&self) -> Option<u64> {
        loop {
            let cur = self.read.load(Ordering::Acquire);
            let next = cur.wrapping_add(1);
            let word = self.slot(next).load(Ordering::Acquire);

            if word == slot::IN {
                if self.read.load(Ordering::Acquire) == cur {
                    return None;
                }
                continue;
            }

            if self
                .slot(cur)
                .compare_exchange(
                    slot::out(cur),
                    slot::empty(cur.wrapping_add(N)),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                debug_assert!(slot::is_payload(word));
                self.slot(next).store(slot::out(next), Ordering::Release);
                self.read.fetch_add(1, Ordering::Release);
                return Some(word);
            }
            sync::spin_loop();
        }
    }
}

impl<T, const N: usize, E: Encoding<T>> Default for MpmcQueue<T, N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, E: Encoding<T>> fmt::Debug for MpmcQueue<T, N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T, const N: usize, E: Encoding<T>> Drop for MpmcQueue<T, N, E> {
    fn drop(&mut self) {
        // Raw pointers and other plain words own nothing.
        if !E::OWNS_HOLDER && !mem::needs_drop::<T>() {
            return;
        }
        let mut released = 0usize;
        while let Ok(value) = self.pop() {
            drop(value);
            released += 1;
        }
        if released > 0 {
            trace!(released, "released pending mpmc elements");
        }
    }
}
