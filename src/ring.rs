//! Ring index arithmetic shared by both engines.
//!
//! Positions are unbounded `usize` counters that wrap modulo `2^usize::BITS`.
//! A counter maps to a physical slot through `counter & mask`, which is only
//! equivalent to `counter % capacity` because the capacity is a power of two
//! (and therefore divides the counter's modulus).

/// Validates a ring capacity at construction.
///
/// Panics if `capacity` is not a power of two or is not strictly greater
/// than `exclusive_min`.
#[track_caller]
pub(crate) fn assert_capacity(capacity: usize, exclusive_min: usize) {
    assert!(capacity > 0, "capacity must be greater than 0");
    assert!(capacity.is_power_of_two(), "capacity must be a power of 2");
    assert!(
        capacity > exclusive_min,
        "capacity must be greater than {exclusive_min}"
    );
}

/// `capacity - 1` for a power-of-two capacity.
#[inline(always)]
pub(crate) const fn mask(capacity: usize) -> usize {
    capacity - 1
}

/// Physical slot addressed by `counter`.
#[inline(always)]
pub(crate) const fn index(counter: usize, mask: usize) -> usize {
    counter & mask
}

/// Number of positions between the read and write counters.
///
/// Correct across counter wraparound as long as the true distance never
/// exceeds the capacity.
#[inline(always)]
pub(crate) const fn occupancy(write: usize, read: usize) -> usize {
    write.wrapping_sub(read)
}

/// Splits a run of `len` slots starting at `counter` at the wrap boundary.
///
/// Returns the physical start index and the length of the first contiguous
/// segment. The remaining `len - first` slots start at physical index 0.
#[inline]
pub(crate) const fn segments(counter: usize, len: usize, capacity: usize) -> (usize, usize) {
    let start = index(counter, mask(capacity));
    let first = if len < capacity - start {
        len
    } else {
        capacity - start
    };
    (start, first)
}
