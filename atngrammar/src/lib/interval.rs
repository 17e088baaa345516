use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{vocabulary::Vocabulary, EPSILON, TOKEN_EOF};

/// An inclusive range `a..=b` of symbols (token types or code points).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval {
    pub a: i32,
    pub b: i32,
}

impl Interval {
    pub fn new(a: i32, b: i32) -> Self {
        Interval { a, b }
    }

    pub fn len(&self) -> usize {
        if self.b < self.a {
            0
        } else {
            (self.b as i64 - self.a as i64 + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A set of symbols, stored as a sorted list of disjoint, non-adjacent intervals. Symbol values
/// may be negative ([TOKEN_EOF] and [EPSILON] are both members of many lookahead sets).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet {
            intervals: Vec::new(),
        }
    }

    pub fn of(v: i32) -> Self {
        let mut s = IntervalSet::new();
        s.add_one(v);
        s
    }

    pub fn of_range(a: i32, b: i32) -> Self {
        let mut s = IntervalSet::new();
        s.add_range(a, b);
        s
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The number of symbols (not intervals) in this set.
    pub fn len(&self) -> usize {
        self.intervals.iter().map(|iv| iv.len()).sum()
    }

    pub fn add_one(&mut self, v: i32) {
        self.add_range(v, v);
    }

    pub fn add_range(&mut self, a: i32, b: i32) {
        if b < a {
            return;
        }
        let mut new = Interval::new(a, b);
        let i = self
            .intervals
            .partition_point(|iv| (iv.b as i64) + 1 < a as i64);
        let mut j = i;
        while j < self.intervals.len() && (self.intervals[j].a as i64) <= (b as i64) + 1 {
            new.a = new.a.min(self.intervals[j].a);
            new.b = new.b.max(self.intervals[j].b);
            j += 1;
        }
        self.intervals.splice(i..j, std::iter::once(new));
    }

    pub fn add_set(&mut self, other: &IntervalSet) {
        for iv in &other.intervals {
            self.add_range(iv.a, iv.b);
        }
    }

    pub fn contains(&self, v: i32) -> bool {
        let i = self.intervals.partition_point(|iv| iv.b < v);
        i < self.intervals.len() && self.intervals[i].a <= v
    }

    pub fn remove_one(&mut self, v: i32) {
        self.remove_range(v, v);
    }

    pub fn remove_range(&mut self, a: i32, b: i32) {
        if b < a {
            return;
        }
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        for iv in &self.intervals {
            if iv.b < a || iv.a > b {
                out.push(*iv);
                continue;
            }
            if iv.a < a {
                out.push(Interval::new(iv.a, a - 1));
            }
            if iv.b > b {
                out.push(Interval::new(b + 1, iv.b));
            }
        }
        self.intervals = out;
    }

    /// Returns the union of `self` and `other`.
    pub fn or(&self, other: &IntervalSet) -> IntervalSet {
        let mut s = self.clone();
        s.add_set(other);
        s
    }

    /// Returns the elements of `self` which are not in `other`.
    pub fn subtract(&self, other: &IntervalSet) -> IntervalSet {
        let mut s = self.clone();
        for iv in &other.intervals {
            s.remove_range(iv.a, iv.b);
        }
        s
    }

    /// Returns the elements of `min..=max` which are not in `self`.
    pub fn complement(&self, min: i32, max: i32) -> IntervalSet {
        IntervalSet::of_range(min, max).subtract(self)
    }

    pub fn min_element(&self) -> Option<i32> {
        self.intervals.first().map(|iv| iv.a)
    }

    pub fn max_element(&self) -> Option<i32> {
        self.intervals.last().map(|iv| iv.b)
    }

    /// Iterate over every symbol in the set in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.intervals.iter().flat_map(|iv| iv.a..=iv.b)
    }

    /// Render this set using token names, in the style used by parser error messages: a single
    /// element is printed bare, anything else is wrapped in braces.
    pub fn to_token_string(&self, vocab: &Vocabulary) -> String {
        if self.intervals.is_empty() {
            return "{}".to_owned();
        }
        let names = self
            .iter()
            .map(|t| match t {
                TOKEN_EOF => "<EOF>".to_owned(),
                EPSILON => "<EPSILON>".to_owned(),
                _ => vocab.display_name(t),
            })
            .collect::<Vec<_>>();
        if names.len() > 1 {
            format!("{{{}}}", names.join(", "))
        } else {
            names.join(", ")
        }
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "{{}}");
        }
        let parts = self
            .intervals
            .iter()
            .map(|iv| match (iv.a, iv.b) {
                (a, b) if a == b => match a {
                    TOKEN_EOF => "<EOF>".to_owned(),
                    _ => a.to_string(),
                },
                (a, b) => format!("{}..{}", a, b),
            })
            .collect::<Vec<_>>();
        if self.len() > 1 {
            write!(f, "{{{}}}", parts.join(", "))
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl FromIterator<i32> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut s = IntervalSet::new();
        for v in iter {
            s.add_one(v);
        }
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merge_adjacent() {
        let mut s = IntervalSet::new();
        s.add_range(1, 3);
        s.add_range(7, 9);
        s.add_one(4);
        assert_eq!(s.intervals(), &[Interval::new(1, 4), Interval::new(7, 9)]);
        s.add_range(5, 6);
        assert_eq!(s.intervals(), &[Interval::new(1, 9)]);
        assert_eq!(s.len(), 9);
    }

    #[test]
    fn test_eof_member() {
        let mut s = IntervalSet::of(TOKEN_EOF);
        s.add_range(3, 4);
        assert!(s.contains(-1));
        assert!(!s.contains(0));
        assert_eq!(s.min_element(), Some(-1));
        assert_eq!(s.to_string(), "{<EOF>, 3..4}");
    }

    #[test]
    fn test_subtract_and_complement() {
        let s = IntervalSet::of_range(0, 10);
        let t = IntervalSet::from_iter([3, 4, 5, 10]);
        let d = s.subtract(&t);
        assert_eq!(d.iter().collect::<Vec<_>>(), vec![0, 1, 2, 6, 7, 8, 9]);
        let c = t.complement(0, 12);
        assert_eq!(
            c.intervals(),
            &[Interval::new(0, 2), Interval::new(6, 9), Interval::new(11, 12)]
        );
    }

    #[test]
    fn test_remove_one_splits() {
        let mut s = IntervalSet::of_range(1, 5);
        s.remove_one(3);
        assert_eq!(s.intervals(), &[Interval::new(1, 2), Interval::new(4, 5)]);
    }

    #[test]
    fn test_token_string() {
        let vocab = Vocabulary::new(
            vec![None, Some("'a'".to_owned())],
            vec![None, Some("A".to_owned()), Some("B".to_owned())],
        );
        assert_eq!(IntervalSet::of(1).to_token_string(&vocab), "'a'");
        assert_eq!(
            IntervalSet::from_iter([TOKEN_EOF, 1, 2]).to_token_string(&vocab),
            "{<EOF>, 'a', B}"
        );
    }

    proptest! {
        #[test]
        fn prop_contains_matches_model(xs in proptest::collection::vec(-1i32..200, 0..40)) {
            let s = IntervalSet::from_iter(xs.iter().copied());
            for v in -1..200 {
                prop_assert_eq!(s.contains(v), xs.contains(&v));
            }
            for w in s.intervals().windows(2) {
                prop_assert!(w[0].b + 1 < w[1].a);
            }
        }
    }
}
