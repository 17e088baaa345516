#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `Span` records what portion of the user's input something (e.g. a token or a rule node)
/// references. Offsets are measured in characters (Unicode code points), since that is the
/// granularity that ATN transitions match on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Create a new span starting at character `start` and ending at character `end`
    /// (exclusive).
    ///
    /// # Panics
    ///
    /// If `end` is less than `start`.
    pub fn new(start: usize, end: usize) -> Self {
        if end < start {
            panic!("Span starts ({}) after it ends ({})!", start, end);
        }
        Span { start, end }
    }

    /// Character offset of the start of the span.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Character offset of the end of the span.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The inclusive stop offset in the form recognisers traditionally print it: one less than
    /// `end`, so that an empty span at `n` prints as `n:n-1`.
    pub fn stop(&self) -> isize {
        self.end as isize - 1
    }

    /// Length in characters of the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if this `Span` covers 0 characters, or `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
