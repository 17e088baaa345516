use std::sync::OnceLock;

use crate::{interval::IntervalSet, transition::Transition, DIdx, RIdx, StIdx};

/// A placeholder used for derived links (e.g. a block end's start state) before they have been
/// filled in. [crate::Atn::verify] rejects any ATN in which one survives.
pub(crate) const UNSET: StIdx = StIdx(u32::MAX);

/// The serialized type code of each kind of state.
pub mod codes {
    pub const INVALID: u16 = 0;
    pub const BASIC: u16 = 1;
    pub const RULE_START: u16 = 2;
    pub const BLOCK_START: u16 = 3;
    pub const PLUS_BLOCK_START: u16 = 4;
    pub const STAR_BLOCK_START: u16 = 5;
    pub const TOKEN_START: u16 = 6;
    pub const RULE_STOP: u16 = 7;
    pub const BLOCK_END: u16 = 8;
    pub const STAR_LOOP_BACK: u16 = 9;
    pub const STAR_LOOP_ENTRY: u16 = 10;
    pub const PLUS_LOOP_BACK: u16 = 11;
    pub const LOOP_END: u16 = 12;
}

/// What kind of state this is, along with the links to related states that the kind implies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateKind {
    /// A state number which was removed when the ATN was optimised. It has no transitions and is
    /// never reachable.
    Invalid,
    Basic,
    RuleStart {
        stop: StIdx,
        left_recursive: bool,
    },
    BlockStart {
        end: StIdx,
    },
    PlusBlockStart {
        end: StIdx,
        loop_back: StIdx,
    },
    StarBlockStart {
        end: StIdx,
    },
    TokensStart,
    RuleStop,
    BlockEnd {
        start: StIdx,
    },
    StarLoopBack,
    StarLoopEntry {
        loop_back: StIdx,
        precedence_decision: bool,
    },
    PlusLoopBack,
    LoopEnd {
        loop_back: StIdx,
    },
}

impl StateKind {
    /// Create a kind from its serialized code, with all links unset.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            codes::INVALID => StateKind::Invalid,
            codes::BASIC => StateKind::Basic,
            codes::RULE_START => StateKind::RuleStart {
                stop: UNSET,
                left_recursive: false,
            },
            codes::BLOCK_START => StateKind::BlockStart { end: UNSET },
            codes::PLUS_BLOCK_START => StateKind::PlusBlockStart {
                end: UNSET,
                loop_back: UNSET,
            },
            codes::STAR_BLOCK_START => StateKind::StarBlockStart { end: UNSET },
            codes::TOKEN_START => StateKind::TokensStart,
            codes::RULE_STOP => StateKind::RuleStop,
            codes::BLOCK_END => StateKind::BlockEnd { start: UNSET },
            codes::STAR_LOOP_BACK => StateKind::StarLoopBack,
            codes::STAR_LOOP_ENTRY => StateKind::StarLoopEntry {
                loop_back: UNSET,
                precedence_decision: false,
            },
            codes::PLUS_LOOP_BACK => StateKind::PlusLoopBack,
            codes::LOOP_END => StateKind::LoopEnd { loop_back: UNSET },
            _ => return None,
        })
    }

    pub fn code(&self) -> u16 {
        match self {
            StateKind::Invalid => codes::INVALID,
            StateKind::Basic => codes::BASIC,
            StateKind::RuleStart { .. } => codes::RULE_START,
            StateKind::BlockStart { .. } => codes::BLOCK_START,
            StateKind::PlusBlockStart { .. } => codes::PLUS_BLOCK_START,
            StateKind::StarBlockStart { .. } => codes::STAR_BLOCK_START,
            StateKind::TokensStart => codes::TOKEN_START,
            StateKind::RuleStop => codes::RULE_STOP,
            StateKind::BlockEnd { .. } => codes::BLOCK_END,
            StateKind::StarLoopBack => codes::STAR_LOOP_BACK,
            StateKind::StarLoopEntry { .. } => codes::STAR_LOOP_ENTRY,
            StateKind::PlusLoopBack => codes::PLUS_LOOP_BACK,
            StateKind::LoopEnd { .. } => codes::LOOP_END,
        }
    }

    /// The end state of a block start kind.
    pub fn block_end(&self) -> Option<StIdx> {
        match *self {
            StateKind::BlockStart { end }
            | StateKind::PlusBlockStart { end, .. }
            | StateKind::StarBlockStart { end } => Some(end),
            _ => None,
        }
    }

    pub fn is_block_start(&self) -> bool {
        self.block_end().is_some()
    }

    /// Kinds which may carry a decision number.
    pub fn is_decision_kind(&self) -> bool {
        matches!(
            self,
            StateKind::BlockStart { .. }
                | StateKind::PlusBlockStart { .. }
                | StateKind::StarBlockStart { .. }
                | StateKind::TokensStart
                | StateKind::StarLoopEntry { .. }
                | StateKind::PlusLoopBack
        )
    }
}

/// A state in an ATN.
#[derive(Clone, Debug)]
pub struct AtnState {
    pub(crate) stidx: StIdx,
    pub(crate) ridx: Option<RIdx>,
    pub(crate) kind: StateKind,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) epsilon_only: bool,
    pub(crate) decision: Option<DIdx>,
    pub(crate) non_greedy: bool,
    pub(crate) next_tokens: OnceLock<IntervalSet>,
}

impl AtnState {
    pub(crate) fn new(stidx: StIdx, ridx: Option<RIdx>, kind: StateKind) -> Self {
        AtnState {
            stidx,
            ridx,
            kind,
            transitions: Vec::new(),
            epsilon_only: false,
            decision: None,
            non_greedy: false,
            next_tokens: OnceLock::new(),
        }
    }

    pub fn stidx(&self) -> StIdx {
        self.stidx
    }

    /// The rule this state belongs to. Only [StateKind::TokensStart] and
    /// [StateKind::Invalid] states lack one.
    pub fn rule(&self) -> Option<RIdx> {
        self.ridx
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, i: usize) -> &Transition {
        &self.transitions[i]
    }

    /// Are all of this state's outgoing transitions epsilon-like? States never mix epsilon and
    /// non-epsilon transitions.
    pub fn epsilon_only(&self) -> bool {
        self.epsilon_only
    }

    pub fn decision(&self) -> Option<DIdx> {
        self.decision
    }

    pub fn non_greedy(&self) -> bool {
        self.non_greedy
    }

    pub fn is_rule_stop(&self) -> bool {
        self.kind == StateKind::RuleStop
    }

    pub(crate) fn add_transition(&mut self, t: Transition) {
        self.add_transition_at(self.transitions.len(), t);
    }

    pub(crate) fn add_transition_at(&mut self, i: usize, t: Transition) {
        if self.transitions.is_empty() {
            self.epsilon_only = t.is_epsilon();
        } else if self.epsilon_only != t.is_epsilon() {
            self.epsilon_only = false;
        }
        self.transitions.insert(i, t);
    }
}
