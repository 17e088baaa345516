use std::{
    fmt,
    hash::{Hash, Hasher},
};

use vob::Vob;

/// A set of (1-based) alternative numbers.
#[derive(Clone, Debug, Default)]
pub struct AltSet {
    bits: Vob,
}

impl AltSet {
    pub fn new() -> Self {
        AltSet { bits: Vob::new() }
    }

    pub fn of(alt: u32) -> Self {
        let mut s = AltSet::new();
        s.insert(alt);
        s
    }

    pub fn insert(&mut self, alt: u32) {
        let i = alt as usize;
        if i >= self.bits.len() {
            self.bits.resize(i + 1, false);
        }
        self.bits.set(i, true);
    }

    pub fn contains(&self, alt: u32) -> bool {
        self.bits.get(alt as usize).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.bits.iter_set_bits(..).count()
    }

    pub fn is_empty(&self) -> bool {
        self.min().is_none()
    }

    /// The lowest alternative in the set.
    pub fn min(&self) -> Option<u32> {
        self.bits.iter_set_bits(..).next().map(|i| i as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter_set_bits(..).map(|i| i as u32)
    }

    pub fn union(&mut self, other: &AltSet) {
        for a in other.iter() {
            self.insert(a);
        }
    }
}

impl PartialEq for AltSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for AltSet {}

impl Hash for AltSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for a in self.iter() {
            a.hash(state);
        }
    }
}

impl FromIterator<u32> for AltSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut s = AltSet::new();
        for a in iter {
            s.insert(a);
        }
        s
    }
}

impl fmt::Display for AltSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let alts = self.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        write!(f, "{{{}}}", alts.join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::AltSet;

    #[test]
    fn test_altset() {
        let mut s = AltSet::of(3);
        s.insert(1);
        assert_eq!(s.len(), 2);
        assert_eq!(s.min(), Some(1));
        assert!(s.contains(3));
        assert!(!s.contains(2));
        assert!(!s.contains(40));
        assert_eq!(s.to_string(), "{1, 3}");
        // Trailing capacity doesn't affect equality.
        let mut t = AltSet::of(1);
        t.insert(3);
        t.insert(10);
        let u = [1, 3, 10].into_iter().collect::<AltSet>();
        assert_eq!(t, u);
        assert_ne!(s, t);
        assert!(AltSet::new().is_empty());
    }
}
