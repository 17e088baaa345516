use crate::{interval::IntervalSet, RIdx, StIdx, TOKEN_EOF};

/// The serialized type code of each kind of transition.
pub mod codes {
    pub const EPSILON: u16 = 1;
    pub const RANGE: u16 = 2;
    pub const RULE: u16 = 3;
    pub const PREDICATE: u16 = 4;
    pub const ATOM: u16 = 5;
    pub const ACTION: u16 = 6;
    pub const SET: u16 = 7;
    pub const NOT_SET: u16 = 8;
    pub const WILDCARD: u16 = 9;
    pub const PRECEDENCE: u16 = 10;
}

/// An edge in the ATN. Epsilon-like transitions (`Epsilon`, `Rule`, `Predicate`, `Action`,
/// `Precedence`) consume no input; the rest match a single symbol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transition {
    /// `outermost_precedence_return` is set on the return edges of a left-recursive rule which
    /// was invoked with precedence 0, i.e. the edges leaving the outermost invocation.
    Epsilon {
        target: StIdx,
        outermost_precedence_return: Option<RIdx>,
    },
    Range {
        target: StIdx,
        start: i32,
        stop: i32,
    },
    /// A call of `rule` (whose start state is `target`); on return, execution continues at
    /// `follow`.
    Rule {
        target: StIdx,
        rule: RIdx,
        precedence: i32,
        follow: StIdx,
    },
    Predicate {
        target: StIdx,
        rule: RIdx,
        pred: usize,
        ctx_dependent: bool,
    },
    Atom {
        target: StIdx,
        label: i32,
    },
    /// In a lexer ATN, `action` indexes [crate::Atn::lexer_actions]; parsers execute their
    /// actions outside the ATN so `action` is informational only.
    Action {
        target: StIdx,
        rule: RIdx,
        action: Option<usize>,
        ctx_dependent: bool,
    },
    Set {
        target: StIdx,
        set: IntervalSet,
    },
    NotSet {
        target: StIdx,
        set: IntervalSet,
    },
    Wildcard {
        target: StIdx,
    },
    Precedence {
        target: StIdx,
        precedence: i32,
    },
}

impl Transition {
    pub fn epsilon(target: StIdx) -> Self {
        Transition::Epsilon {
            target,
            outermost_precedence_return: None,
        }
    }

    pub fn target(&self) -> StIdx {
        match *self {
            Transition::Epsilon { target, .. }
            | Transition::Range { target, .. }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Action { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Precedence { target, .. } => target,
        }
    }

    pub(crate) fn set_target(&mut self, new: StIdx) {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Range { target, .. }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Action { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Precedence { target, .. } => *target = new,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Transition::Epsilon { .. } => codes::EPSILON,
            Transition::Range { .. } => codes::RANGE,
            Transition::Rule { .. } => codes::RULE,
            Transition::Predicate { .. } => codes::PREDICATE,
            Transition::Atom { .. } => codes::ATOM,
            Transition::Action { .. } => codes::ACTION,
            Transition::Set { .. } => codes::SET,
            Transition::NotSet { .. } => codes::NOT_SET,
            Transition::Wildcard { .. } => codes::WILDCARD,
            Transition::Precedence { .. } => codes::PRECEDENCE,
        }
    }

    /// Does this transition consume no input?
    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Action { .. }
                | Transition::Precedence { .. }
        )
    }

    /// Does this transition match `symbol`, given a vocabulary of `min..=max`?
    pub fn matches(&self, symbol: i32, min: i32, max: i32) -> bool {
        match self {
            Transition::Atom { label, .. } => *label == symbol,
            Transition::Range { start, stop, .. } => *start <= symbol && symbol <= *stop,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => {
                symbol >= min && symbol <= max && !set.contains(symbol)
            }
            Transition::Wildcard { .. } => symbol >= min && symbol <= max,
            _ => false,
        }
    }

    /// The set of symbols this transition matches, if that can be expressed without knowing the
    /// vocabulary. `NotSet` and `Wildcard` return `None`.
    pub fn label(&self) -> Option<IntervalSet> {
        match self {
            Transition::Atom { label, .. } => Some(IntervalSet::of(*label)),
            Transition::Range { start, stop, .. } => Some(IntervalSet::of_range(*start, *stop)),
            Transition::Set { set, .. } => Some(set.clone()),
            _ => None,
        }
    }

    /// Is this an atom/range matching EOF? Those are serialized with a flag rather than a value.
    pub(crate) fn matches_eof_only(&self) -> bool {
        match self {
            Transition::Atom { label, .. } => *label == TOKEN_EOF,
            Transition::Range { start, .. } => *start == TOKEN_EOF,
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_matches() {
        let t = Transition::Range {
            target: StIdx(1),
            start: 'a' as i32,
            stop: 'c' as i32,
        };
        assert!(t.matches('b' as i32, 0, 0x10FFFF));
        assert!(!t.matches('d' as i32, 0, 0x10FFFF));
        let ns = Transition::NotSet {
            target: StIdx(1),
            set: IntervalSet::of('x' as i32),
        };
        assert!(ns.matches('y' as i32, 0, 0x10FFFF));
        assert!(!ns.matches('x' as i32, 0, 0x10FFFF));
        assert!(!ns.matches(TOKEN_EOF, 0, 0x10FFFF));
        assert!(!Transition::epsilon(StIdx(0)).matches(0, 0, 10));
        assert!(Transition::epsilon(StIdx(0)).is_epsilon());
        assert!(!Transition::Wildcard { target: StIdx(0) }.is_epsilon());
    }
}
