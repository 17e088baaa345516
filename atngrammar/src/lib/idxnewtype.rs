// This macro generates a struct which wraps a `u32` index into one of the ATN's tables. Indices
// are converted to and from `usize` when used to index `Vec`s.

use std::fmt;

macro_rules! IdxNewtype {
    ($(#[$attr:meta])* $n: ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(feature="serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $n(pub u32);

        impl From<usize> for $n {
            fn from(v: usize) -> Self {
                debug_assert!(v <= u32::MAX as usize);
                $n(v as u32)
            }
        }

        impl From<u32> for $n {
            fn from(v: u32) -> Self {
                $n(v)
            }
        }

        impl From<$n> for usize {
            fn from(st: $n) -> Self {
                st.0 as usize
            }
        }

        impl From<$n> for u32 {
            fn from(st: $n) -> Self {
                st.0
            }
        }

        impl fmt::Display for $n {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    }
}

IdxNewtype!(
    /// A type specifically for ATN state indices.
    ///
    /// `StIdx` values are the state numbers used by the serialized form of an ATN, so
    /// `usize::from(stidx)` can be used directly to index [crate::Atn::states].
    StIdx);
IdxNewtype!(
    /// A type specifically for rule indices. Lexer and parser rules are numbered separately, each
    /// from `0` to `rules_len() - 1`.
    RIdx);
IdxNewtype!(
    /// A type specifically for decision indices. Each decision point in a parser ATN (a block with
    /// more than one alternative, or a loop) has its own `DIdx`, and its own DFA at run time.
    DIdx);
