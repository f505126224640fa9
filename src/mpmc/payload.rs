//! How elements are packed into a slot word.
//!
//! A queue picks its [`Encoding`] once, as a type parameter. [`Inline`]
//! stores pointer-sized handles directly in the slot; [`Boxed`] moves any
//! other element into a heap holder and stores the holder's address.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::slot;
use crate::error::PushError;

mod sealed {
    pub trait Sealed {}
}

/// Strategy for turning an element into a slot word and back.
///
/// This trait is sealed; the implementations are [`Inline`] and [`Boxed`].
pub trait Encoding<T>: sealed::Sealed {
    /// Whether a pending slot word owns memory that must be released even
    /// when `T` itself has no drop glue.
    #[doc(hidden)]
    const OWNS_HOLDER: bool;

    /// Converts `value` into a payload word. Fails with
    /// [`PushError::Alloc`] when a holder cannot be allocated and with
    /// [`PushError::Unrepresentable`] when the word would carry tag bits.
    #[doc(hidden)]
    fn encode(value: T) -> Result<u64, PushError<T>>;

    /// # Safety
    ///
    /// `word` must come from `encode` and be decoded at most once.
    #[doc(hidden)]
    unsafe fn decode(word: u64) -> T;
}

/// Stores the element itself in the slot. Only for [`Word`] types.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

/// Stores the address of a heap holder that owns the element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Boxed;

impl sealed::Sealed for Inline {}
impl sealed::Sealed for Boxed {}

/// A value that is losslessly representable as an address.
///
/// # Safety
///
/// `from_word` must rebuild exactly the value that produced the word, for
/// every word `into_word` can return. Words with any of the top three bits
/// set are rejected at push time and converted straight back.
pub unsafe trait Word: Sized {
    /// Releases the handle as a plain address.
    fn into_word(self) -> u64;

    /// # Safety
    ///
    /// `word` must come from [`into_word`](Self::into_word) and be used at
    /// most once.
    unsafe fn from_word(word: u64) -> Self;
}

unsafe impl<T> Word for Box<T> {
    fn into_word(self) -> u64 {
        Box::into_raw(self) as usize as u64
    }

    unsafe fn from_word(word: u64) -> Self {
        unsafe { Box::from_raw(word as usize as *mut T) }
    }
}

unsafe impl<T> Word for NonNull<T> {
    fn into_word(self) -> u64 {
        self.as_ptr() as usize as u64
    }

    unsafe fn from_word(word: u64) -> Self {
        unsafe { NonNull::new_unchecked(word as usize as *mut T) }
    }
}

unsafe impl<T> Word for *mut T {
    fn into_word(self) -> u64 {
        self as usize as u64
    }

    unsafe fn from_word(word: u64) -> Self {
        word as usize as *mut T
    }
}

unsafe impl<T> Word for *const T {
    fn into_word(self) -> u64 {
        self as usize as u64
    }

    unsafe fn from_word(word: u64) -> Self {
        word as usize as *const T
    }
}

impl<T: Word> Encoding<T> for Inline {
    const OWNS_HOLDER: bool = false;

    #[inline]
    fn encode(value: T) -> Result<u64, PushError<T>> {
        let word = value.into_word();
        if !slot::is_payload(word) {
            // SAFETY: `word` came from `into_word` and is not stored anywhere.
            return Err(PushError::Unrepresentable(unsafe { T::from_word(word) }));
        }
        Ok(word)
    }

    #[inline]
    unsafe fn decode(word: u64) -> T {
        unsafe { T::from_word(word) }
    }
}

impl<T> Encoding<T> for Boxed {
    const OWNS_HOLDER: bool = true;

    fn encode(value: T) -> Result<u64, PushError<T>> {
        let holder = Holder::try_new(value).map_err(PushError::Alloc)?;
        let word = Box::into_raw(holder) as usize as u64;
        if !slot::is_payload(word) {
            // Top-byte-tagged heap addresses land here.
            // SAFETY: `word` is the holder leaked just above.
            let holder = unsafe { Box::from_raw(word as usize as *mut Holder<T>) };
            return Err(PushError::Unrepresentable(holder.value));
        }
        Ok(word)
    }

    unsafe fn decode(word: u64) -> T {
        let holder = unsafe { Box::from_raw(word as usize as *mut Holder<T>) };
        holder.value
    }
}

/// Heap cell owning one element between push and pop.
struct Holder<T> {
    value: T,
}

impl<T> Holder<T> {
    /// Allocates a holder, reporting allocation failure instead of aborting.
    fn try_new(value: T) -> Result<Box<Self>, T> {
        let layout = Layout::new::<Self>();
        if layout.size() == 0 {
            return Ok(Box::new(Holder { value }));
        }

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) }.cast::<Self>();
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(value);
        };
        // SAFETY: `ptr` was allocated by the global allocator with the layout
        // of `Holder<T>`, which is what `Box` expects to free.
        unsafe {
            ptr.as_ptr().write(Holder { value });
            Ok(Box::from_raw(ptr.as_ptr()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_moves_value_through_holder() {
        let word = Boxed::encode(String::from("held")).unwrap();
        assert!(slot::is_payload(word));
        let value: String = unsafe { <Boxed as Encoding<String>>::decode(word) };
        assert_eq!(value, "held");
    }

    #[test]
    fn boxed_zero_sized() {
        let word = Boxed::encode(()).unwrap();
        unsafe { <Boxed as Encoding<()>>::decode(word) };
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn inline_rejects_tagged_addresses() {
        for tag in [slot::IN, slot::OUT, slot::EMPTY | 5] {
            let ptr = tag as usize as *mut u8;
            match Inline::encode(ptr) {
                Err(PushError::Unrepresentable(back)) => assert_eq!(back, ptr),
                other => panic!("{tag:#x} encoded as {other:?}"),
            }
        }
        assert_eq!(Inline::encode(0x1000 as *const u8), Ok(0x1000));
    }

    #[test]
    fn inline_box_keeps_address() {
        let boxed = Box::new(17u64);
        let addr = &*boxed as *const u64 as usize as u64;
        let word = Inline::encode(boxed).unwrap();
        assert_eq!(word, addr);
        let back: Box<u64> = unsafe { Inline::decode(word) };
        assert_eq!(*back, 17);
    }
}
