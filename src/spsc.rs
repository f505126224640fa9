//! Wait-free single-producer/single-consumer ring.
//!
//! The producer only ever advances the write counter and the consumer only
//! ever advances the read counter. A slot written by the producer becomes
//! visible to the consumer through the `Release` store of the write counter
//! paired with the consumer's `Acquire` load of it, and vice versa for slots
//! handed back to the producer. No other state is shared.
//!
//! The single-writer/single-reader contract is carried by the handles
//! returned from [`SpscQueue::split`]: neither is `Clone`, and every
//! operation that moves a counter takes `&mut self`.

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::{self, MaybeUninit};
use core::ptr;

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use crate::error::{PopError, PushError};
use crate::ring;
use crate::sync::{Arc, AtomicUsize, Ordering};

/// Fixed-capacity SPSC ring holding up to `N` elements in place.
///
/// `N` must be a non-zero power of two.
pub struct SpscQueue<T, const N: usize> {
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
    buffer: UnsafeCell<[MaybeUninit<T>; N]>,
}

// SAFETY: the producer and consumer never touch the same slot at the same
// time; ownership of each slot is handed over through the counters.
unsafe impl<T: Send, const N: usize> Sync for SpscQueue<T, N> {}

impl<T, const N: usize> SpscQueue<T, N> {
    /// Creates an empty ring.
    ///
    /// # Panics
    ///
    /// If `N` is zero or not a power of two.
    pub fn new() -> Self {
        ring::assert_capacity(N, 0);
        debug!(capacity = N, "created spsc queue");

        Self {
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
            // SAFETY: an array of `MaybeUninit` needs no initialization.
            buffer: UnsafeCell::new(unsafe { MaybeUninit::uninit().assume_init() }),
        }
    }

    /// Splits the queue into its producer and consumer halves.
    pub fn split(self) -> (Producer<T, N>, Consumer<T, N>) {
        let ring = Arc::new(self);
        (
            Producer { ring: ring.clone() },
            Consumer { ring },
        )
    }

    /// Number of slots, `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Elements currently in the ring. Advisory under concurrent use.
    pub fn read_available(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        ring::occupancy(write, read).min(N)
    }

    #[inline(always)]
    fn slot(&self, counter: usize) -> *mut T {
        // SAFETY: `index` is always below `N`.
        unsafe { self.base().add(ring::index(counter, ring::mask(N))) }
    }

    #[inline(always)]
    fn base(&self) -> *mut T {
        self.buffer.get().cast()
    }
}

impl<T, const N: usize> Default for SpscQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for SpscQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscQueue")
            .field("capacity", &N)
            .field("len", &self.read_available())
            .finish()
    }
}

impl<T, const N: usize> Drop for SpscQueue<T, N> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Relaxed);
        let pending = ring::occupancy(write, read);
        for i in 0..pending {
            // SAFETY: every slot in `read..write` holds an initialized value.
            unsafe { ptr::drop_in_place(self.slot(read.wrapping_add(i))) };
        }
        trace!(pending, "dropped pending spsc elements");
    }
}

/// Writing half of an [`SpscQueue`].
pub struct Producer<T, const N: usize> {
    ring: Arc<SpscQueue<T, N>>,
}

impl<T, const N: usize> Producer<T, N> {
    /// Appends `value`, or hands it back if all `N` slots are occupied.
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        let ring = &*self.ring;
        let write = ring.write.load(Ordering::Relaxed);
        let read = ring.read.load(Ordering::Acquire);
        if ring::occupancy(write, read) == N {
            return Err(PushError::Full(value));
        }

        // SAFETY: the slot at `write` is outside `read..write` and only this
        // producer writes to it.
        unsafe { ring.slot(write).write(value) };
        ring.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Copies as many leading elements of `items` as fit, in one pass per
    /// contiguous segment. Returns the number enqueued.
    pub fn push_slice(&mut self, items: &[T]) -> usize
    where
        T: Copy,
    {
        self.push_batch::<Bitwise>(items)
    }

    /// Like [`push_slice`](Self::push_slice) for types that must be cloned
    /// element by element.
    pub fn push_cloned(&mut self, items: &[T]) -> usize
    where
        T: Clone,
    {
        self.push_batch::<PerElement>(items)
    }

    /// Free slots, as seen by the producer.
    pub fn write_available(&self) -> usize {
        N - self.ring.read_available()
    }

    /// Elements waiting for the consumer.
    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }

    /// Number of slots, `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    fn push_batch<S: BatchWrite<T>>(&mut self, items: &[T]) -> usize {
        let ring = &*self.ring;
        let write = ring.write.load(Ordering::Relaxed);
        let read = ring.read.load(Ordering::Acquire);
        let len = items.len().min(N - ring::occupancy(write, read));
        if len == 0 {
            return 0;
        }

        let (start, first) = ring::segments(write, len, N);
        let base = ring.base();
        // SAFETY: both segments lie within the `len` free slots after `write`.
        unsafe {
            S::write(&items[..first], base.add(start));
            S::write(&items[first..len], base);
        }
        ring.write.store(write.wrapping_add(len), Ordering::Release);
        len
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("ring", &*self.ring).finish()
    }
}

/// Reading half of an [`SpscQueue`].
pub struct Consumer<T, const N: usize> {
    ring: Arc<SpscQueue<T, N>>,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Removes the oldest element.
    pub fn pop(&mut self) -> Result<T, PopError> {
        let ring = &*self.ring;
        let read = ring.read.load(Ordering::Relaxed);
        let write = ring.write.load(Ordering::Acquire);
        if ring::occupancy(write, read) == 0 {
            return Err(PopError::Empty);
        }

        // SAFETY: the slot at `read` was published by the producer and is
        // not reused until the read counter moves past it.
        let value = unsafe { ring.slot(read).read() };
        ring.read.store(read.wrapping_add(1), Ordering::Release);
        Ok(value)
    }

    /// Copies up to `out.len()` elements into `out`. Returns the number
    /// dequeued.
    pub fn pop_slice(&mut self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        self.pop_batch::<Bitwise>(out)
    }

    /// Moves up to `out.len()` elements into `out`, dropping the values they
    /// replace. Returns the number dequeued.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        self.pop_batch::<PerElement>(out)
    }

    /// Elements ready to be popped. Never an overestimate.
    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }

    /// Number of slots, `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    fn pop_batch<S: BatchRead<T>>(&mut self, out: &mut [T]) -> usize {
        let ring = &*self.ring;
        let read = ring.read.load(Ordering::Relaxed);
        let write = ring.write.load(Ordering::Acquire);
        let len = out.len().min(ring::occupancy(write, read));
        if len == 0 {
            return 0;
        }

        let (start, first) = ring::segments(read, len, N);
        let base = ring.base();
        let (head, tail) = out[..len].split_at_mut(first);
        // Publishes exactly the slots moved out, even if dropping a replaced
        // value in `out` unwinds partway through the batch.
        let mut guard = ReadGuard {
            counter: &ring.read,
            start: read,
            moved: 0,
        };
        // SAFETY: both segments lie within the `len` published slots after
        // `read`, and `moved` never exceeds what was taken from them.
        unsafe {
            S::read(base.add(start), head, &mut guard.moved);
            S::read(base, tail, &mut guard.moved);
        }
        len
    }
}

/// Stores `start + moved` into the read counter when dropped.
struct ReadGuard<'a> {
    counter: &'a AtomicUsize,
    start: usize,
    moved: usize,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.counter
            .store(self.start.wrapping_add(self.moved), Ordering::Release);
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("ring", &*self.ring).finish()
    }
}

/// Moves a batch into contiguous ring storage.
trait BatchWrite<T> {
    /// # Safety
    ///
    /// `dst` must be valid for `src.len()` uninitialized writes.
    unsafe fn write(src: &[T], dst: *mut T);
}

/// Moves a batch out of contiguous ring storage.
trait BatchRead<T> {
    /// # Safety
    ///
    /// `src` must point to `dst.len()` initialized values that the caller
    /// gives up ownership of. `moved` is bumped as soon as each value leaves
    /// `src`, before anything that may unwind.
    unsafe fn read(src: *const T, dst: &mut [T], moved: &mut usize);
}

/// Single block copy; only sound for `Copy` types.
struct Bitwise;

/// One element at a time, preserving ownership semantics.
struct PerElement;

impl<T: Copy> BatchWrite<T> for Bitwise {
    unsafe fn write(src: &[T], dst: *mut T) {
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) }
    }
}

impl<T: Copy> BatchRead<T> for Bitwise {
    unsafe fn read(src: *const T, dst: &mut [T], moved: &mut usize) {
        unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        *moved += dst.len();
    }
}

impl<T: Clone> BatchWrite<T> for PerElement {
    unsafe fn write(src: &[T], dst: *mut T) {
        for (i, item) in src.iter().enumerate() {
            unsafe { dst.add(i).write(item.clone()) };
        }
    }
}

impl<T> BatchRead<T> for PerElement {
    unsafe fn read(src: *const T, dst: &mut [T], moved: &mut usize) {
        for (i, item) in dst.iter_mut().enumerate() {
            let old = mem::replace(item, unsafe { src.add(i).read() });
            *moved += 1;
            drop(old);
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn smoke() {
        let (mut tx, mut rx) = SpscQueue::<i32, 8>::new().split();
        tx.push(42).unwrap();
        assert_eq!(rx.pop(), Ok(42));
        assert_eq!(rx.pop(), Err(PopError::Empty));
    }

    #[test]
    fn boundary_is_exact() {
        let (mut tx, mut rx) = SpscQueue::<u32, 4>::new().split();
        for i in 0..4 {
            tx.push(i).unwrap();
        }
        assert_eq!(tx.write_available(), 0);
        assert_eq!(tx.push(99), Err(PushError::Full(99)));

        assert_eq!(rx.pop(), Ok(0));
        assert_eq!(tx.write_available(), 1);
        tx.push(4).unwrap();
        assert_eq!(tx.push(5), Err(PushError::Full(5)));

        let mut out = [0; 8];
        assert_eq!(rx.pop_slice(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn batches_split_at_wrap() {
        let (mut tx, mut rx) = SpscQueue::<u8, 8>::new().split();
        assert_eq!(tx.push_slice(&[0, 1, 2, 3, 4, 5]), 6);
        let mut out = [0; 5];
        assert_eq!(rx.pop_slice(&mut out), 5);
        assert_eq!(out, [0, 1, 2, 3, 4]);

        // Write counter sits at 6: this batch wraps after two slots and is
        // cut short by the one element still pending.
        assert_eq!(tx.push_slice(&[6, 7, 8, 9, 10, 11, 12, 13, 14]), 7);
        assert_eq!(rx.read_available(), 8);

        let mut out = [0; 16];
        assert_eq!(rx.pop_slice(&mut out), 8);
        assert_eq!(&out[..8], &[5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(rx.pop_slice(&mut out), 0);
    }

    #[test]
    fn per_element_batches_keep_ownership() {
        let (mut tx, mut rx) = SpscQueue::<String, 4>::new().split();
        let words = ["a", "b", "c", "d", "e"].map(String::from);
        assert_eq!(tx.push_cloned(&words[..3]), 3);
        let mut out = vec![String::from("old"); 2];
        assert_eq!(rx.pop_into(&mut out), 2);
        assert_eq!(out, ["a", "b"]);

        assert_eq!(tx.push_cloned(&words[3..]), 2);
        let mut out = vec![String::new(); 4];
        assert_eq!(rx.pop_into(&mut out), 3);
        assert_eq!(&out[..3], &["c", "d", "e"]);
        assert_eq!(out[3], "");
    }

    #[test]
    fn drops_pending_on_teardown() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropCounter;
        impl Drop for DropCounter {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (mut tx, mut rx) = SpscQueue::<DropCounter, 8>::new().split();
        for _ in 0..5 {
            assert!(tx.push(DropCounter).is_ok());
        }
        drop(rx.pop());
        drop(tx);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
        drop(rx);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn panicking_drop_in_pop_into_releases_moved_slots() {
        use std::panic::{self, AssertUnwindSafe};
        use std::sync::Mutex;

        static DROPS: Mutex<[usize; 4]> = Mutex::new([0; 4]);

        struct Noisy {
            id: usize,
            explode: bool,
        }
        impl Drop for Noisy {
            fn drop(&mut self) {
                DROPS.lock().unwrap()[self.id] += 1;
                if self.explode {
                    panic!("drop of {} failed", self.id);
                }
            }
        }
        let noisy = |id, explode| Noisy { id, explode };

        let (mut tx, mut rx) = SpscQueue::<Noisy, 4>::new().split();
        assert!(tx.push(noisy(0, false)).is_ok());
        assert!(tx.push(noisy(1, false)).is_ok());

        let mut out = vec![noisy(2, false), noisy(3, true)];
        let result = panic::catch_unwind(AssertUnwindSafe(|| rx.pop_into(&mut out)));
        assert!(result.is_err());
        assert_eq!(rx.read_available(), 0);
        assert_eq!(out.iter().map(|n| n.id).collect::<Vec<_>>(), [0, 1]);

        drop(out);
        drop(tx);
        drop(rx);
        assert_eq!(*DROPS.lock().unwrap(), [1, 1, 1, 1]);
    }

    #[test]
    #[should_panic(expected = "capacity must be a power of 2")]
    fn non_power_of_two_panics() {
        let _queue = SpscQueue::<i32, 6>::new();
    }

    #[test]
    fn random_batches_threaded() {
        const TOTAL: u32 = 10_000;
        let (mut tx, mut rx) = SpscQueue::<u32, 64>::new().split();

        std::thread::scope(|cx| {
            cx.spawn(move || {
                let input = (0..TOTAL).collect::<Vec<_>>();
                let mut sent = 0;
                while sent < input.len() {
                    let want = fastrand::usize(1..=24).min(input.len() - sent);
                    let n = tx.push_slice(&input[sent..sent + want]);
                    if n == 0 {
                        std::thread::yield_now();
                    }
                    sent += n;
                }
            });
            cx.spawn(move || {
                let mut expected = 0;
                let mut buf = [0; 24];
                while expected < TOTAL {
                    let n = rx.pop_slice(&mut buf[..fastrand::usize(1..=24)]);
                    if n == 0 {
                        std::thread::yield_now();
                    }
                    for v in &buf[..n] {
                        assert_eq!(*v, expected);
                        expected += 1;
                    }
                }
            });
        });
    }
}
