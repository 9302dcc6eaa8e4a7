//! Result of a cancellable stage.

/// What a cancellable executor produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// The cancel token fired. Work done before that point is kept.
    Cancelled,
}

impl<T> Outcome<T> {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(v) => Outcome::Completed(f(v)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}
