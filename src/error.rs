use thiserror::Error;

/// Error returned by a failed push. The rejected value is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError<T> {
    /// Every slot is occupied.
    #[error("queue is full")]
    Full(T),
    /// The payload holder could not be allocated. The slot claim has been
    /// released, so the queue is unchanged.
    #[error("failed to allocate a payload holder")]
    Alloc(T),
    /// The value's address uses bits reserved for slot tags, so it cannot be
    /// stored in a slot word. The queue is unchanged.
    #[error("value's address overlaps the slot tag bits")]
    Unrepresentable(T),
}

impl<T> PushError<T> {
    /// Recovers the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value)
            | PushError::Alloc(value)
            | PushError::Unrepresentable(value) => value,
        }
    }

    /// Whether the push failed only because the queue had no free slot, so
    /// retrying later can succeed.
    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

/// Error returned by a failed pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// No published element was available.
    #[error("queue is empty")]
    Empty,
}
