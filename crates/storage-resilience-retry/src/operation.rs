/// A caller-supplied unit of storage work.
///
/// Wraps a closure producing one attempt's future. Operations are
/// non-idempotent unless marked otherwise, so a write is never repeated
/// behind the caller's back.
///
/// ```rust
/// use storage_resilience_retry::Operation;
///
/// let read = Operation::idempotent(|| async { Ok::<_, std::io::Error>(42) });
/// assert!(read.is_idempotent());
///
/// let write = Operation::new(|| async { Ok::<_, std::io::Error>(()) });
/// assert!(!write.is_idempotent());
/// ```
pub struct Operation<F> {
    pub(crate) f: F,
    pub(crate) idempotent: bool,
}

impl<F> Operation<F> {
    /// Wraps a non-idempotent operation.
    pub fn new(f: F) -> Self {
        Self {
            f,
            idempotent: false,
        }
    }

    /// Wraps an operation that is safe to repeat.
    pub fn idempotent(f: F) -> Self {
        Self {
            f,
            idempotent: true,
        }
    }

    /// Overrides the idempotence flag.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Whether the operation may be repeated safely.
    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

impl<F> std::fmt::Debug for Operation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("idempotent", &self.idempotent)
            .finish_non_exhaustive()
    }
}
