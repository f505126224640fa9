//! Tagged slot words.
//!
//! Every ring position is one `u64`. The top three bits are reserved flags;
//! the remaining 61 bits hold either a sequence number (for tagged states) or
//! a payload word whose flag bits are clear.
//!
//! ```text
//!  63   62    61   60 ................................ 0
//! [IN][OUT][EMPTY][ sequence number or payload word    ]
//! ```

/// Claimed by a producer; marks "nothing published yet" at the write end.
pub(crate) const IN: u64 = 1 << 63;
/// Readable boundary owned by the consumer side.
pub(crate) const OUT: u64 = 1 << 62;
/// Free, waiting for the producer whose position matches the sequence.
pub(crate) const EMPTY: u64 = 1 << 61;

pub(crate) const FLAGS: u64 = IN | OUT | EMPTY;
pub(crate) const SEQ_MASK: u64 = !FLAGS;

/// `EMPTY` tagged with the position expected to claim the slot next.
#[inline(always)]
pub(crate) const fn empty(seq: usize) -> u64 {
    EMPTY | (seq as u64 & SEQ_MASK)
}

/// `OUT` tagged with the position of the readable boundary.
#[inline(always)]
pub(crate) const fn out(seq: usize) -> u64 {
    OUT | (seq as u64 & SEQ_MASK)
}

#[inline(always)]
pub(crate) const fn is_out(word: u64) -> bool {
    word & OUT != 0
}

/// Whether `word` can be stored as a payload without being mistaken for a
/// tag.
#[inline(always)]
pub(crate) const fn is_payload(word: u64) -> bool {
    word & FLAGS == 0
}
