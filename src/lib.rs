//! ringqueue - fixed-capacity concurrent FIFO queues
//!
//! Two building blocks for producer/consumer pipelines:
//!
//! - [`SpscQueue`]: wait-free single-producer/single-consumer ring that
//!   stores elements in place, with batched slice transfers.
//! - [`MpmcQueue`]: lock-free multi-producer/multi-consumer ring over tagged
//!   `u64` slots. Pointer-sized handles can be stored directly
//!   ([`InlineQueue`]); anything else is moved into a heap holder.
//!
//! Neither queue blocks or resizes. A push on a full ring or a pop on an
//! empty one fails immediately and the caller decides how to wait.
//!
//! ```
//! use ringqueue::{MpmcQueue, SpscQueue};
//!
//! let (mut tx, mut rx) = SpscQueue::<u32, 4>::new().split();
//! assert_eq!(tx.push_slice(&[1, 2, 3, 4, 5]), 4);
//! assert_eq!(rx.pop(), Ok(1));
//!
//! let q = MpmcQueue::<String, 8>::new();
//! q.push("job".to_string()).unwrap();
//! assert_eq!(q.pop().as_deref(), Ok("job"));
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;
pub mod mpmc;
mod ring;
pub mod spsc;
mod sync;

pub use error::{PopError, PushError};
pub use mpmc::payload::{Boxed, Encoding, Inline, Word};
pub use mpmc::{InlineQueue, MpmcQueue};
pub use spsc::{Consumer, Producer, SpscQueue};
