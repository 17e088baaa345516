use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    lexer_action::LexerAction,
    state::{AtnState, StateKind, UNSET},
    transition::Transition,
    DIdx, RIdx, StIdx,
};

/// Whether an ATN recognises characters (a lexer) or tokens (a parser).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GrammarType {
    Lexer,
    Parser,
}

impl GrammarType {
    pub(crate) fn code(self) -> u16 {
        match self {
            GrammarType::Lexer => 0,
            GrammarType::Parser => 1,
        }
    }
}

/// An ATN which failed its structural checks.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum AtnError {
    #[error("state {0}: {1}")]
    Verify(StIdx, &'static str),
    #[error("rule {0} has no stop state")]
    MissingRuleStop(RIdx),
    #[error("state {0} referenced but not defined")]
    UnknownState(u32),
}

/// An augmented transition network: the compiled form of a grammar, shared read-only by every
/// recogniser running it.
#[derive(Debug)]
pub struct Atn {
    pub(crate) grammar_type: GrammarType,
    pub(crate) max_token_type: i32,
    pub(crate) states: Vec<AtnState>,
    pub(crate) decision_to_state: Vec<StIdx>,
    pub(crate) rule_to_start: Vec<StIdx>,
    pub(crate) rule_to_stop: Vec<StIdx>,
    pub(crate) rule_to_token_type: Vec<i32>,
    pub(crate) mode_to_start: Vec<StIdx>,
    pub(crate) lexer_actions: Vec<LexerAction>,
}

impl Atn {
    pub(crate) fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
        Atn {
            grammar_type,
            max_token_type,
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start: Vec::new(),
            rule_to_stop: Vec::new(),
            rule_to_token_type: Vec::new(),
            mode_to_start: Vec::new(),
            lexer_actions: Vec::new(),
        }
    }

    pub fn grammar_type(&self) -> GrammarType {
        self.grammar_type
    }

    pub fn max_token_type(&self) -> i32 {
        self.max_token_type
    }

    pub fn states_len(&self) -> usize {
        self.states.len()
    }

    /// Return the state `stidx`.
    ///
    /// # Panics
    ///
    /// If `stidx` is out of bounds.
    pub fn state(&self, stidx: StIdx) -> &AtnState {
        &self.states[usize::from(stidx)]
    }

    pub fn states(&self) -> impl Iterator<Item = &AtnState> {
        self.states.iter()
    }

    pub fn decisions_len(&self) -> usize {
        self.decision_to_state.len()
    }

    pub fn decision_state(&self, didx: DIdx) -> StIdx {
        self.decision_to_state[usize::from(didx)]
    }

    pub fn rules_len(&self) -> usize {
        self.rule_to_start.len()
    }

    pub fn rule_start(&self, ridx: RIdx) -> StIdx {
        self.rule_to_start[usize::from(ridx)]
    }

    pub fn rule_stop(&self, ridx: RIdx) -> StIdx {
        self.rule_to_stop[usize::from(ridx)]
    }

    /// Is `ridx` a left-recursive rule rewritten to use precedence predicates?
    pub fn is_left_recursive(&self, ridx: RIdx) -> bool {
        matches!(
            self.state(self.rule_start(ridx)).kind,
            StateKind::RuleStart {
                left_recursive: true,
                ..
            }
        )
    }

    /// The token type a lexer rule produces (`0` for fragment rules). Always `None` for parsers.
    pub fn rule_token_type(&self, ridx: RIdx) -> Option<i32> {
        self.rule_to_token_type.get(usize::from(ridx)).copied()
    }

    pub fn modes_len(&self) -> usize {
        self.mode_to_start.len()
    }

    pub fn mode_start(&self, mode: usize) -> Option<StIdx> {
        self.mode_to_start.get(mode).copied()
    }

    pub fn lexer_actions(&self) -> &[LexerAction] {
        &self.lexer_actions
    }

    pub fn lexer_action(&self, i: usize) -> Option<&LexerAction> {
        self.lexer_actions.get(i)
    }

    /// If `invoking` is a state whose (only) transition calls a rule, return the state that
    /// the call returns to.
    pub fn follow_of(&self, invoking: StIdx) -> Option<StIdx> {
        match self.states.get(usize::from(invoking))?.transitions.first()? {
            Transition::Rule { follow, .. } => Some(*follow),
            _ => None,
        }
    }

    pub(crate) fn add_state(&mut self, ridx: Option<RIdx>, kind: StateKind) -> StIdx {
        let stidx = StIdx::from(self.states.len());
        self.states.push(AtnState::new(stidx, ridx, kind));
        stidx
    }

    pub(crate) fn state_mut(&mut self, stidx: StIdx) -> Result<&mut AtnState, AtnError> {
        self.states
            .get_mut(usize::from(stidx))
            .ok_or(AtnError::UnknownState(stidx.0))
    }

    pub(crate) fn define_decision(&mut self, stidx: StIdx) -> Result<DIdx, AtnError> {
        let didx = DIdx::from(self.decision_to_state.len());
        self.state_mut(stidx)?.decision = Some(didx);
        self.decision_to_state.push(stidx);
        Ok(didx)
    }

    /// Derive the links which the serialized form (and the builder) leave implicit, then check
    /// that the result is well formed. After this the ATN is never mutated again.
    pub(crate) fn finish(&mut self) -> Result<(), AtnError> {
        self.rule_to_stop = vec![UNSET; self.rule_to_start.len()];
        for i in 0..self.states.len() {
            if self.states[i].kind != StateKind::RuleStop {
                continue;
            }
            let stidx = self.states[i].stidx;
            let ridx = self.states[i]
                .ridx
                .ok_or(AtnError::Verify(stidx, "rule stop state without a rule"))?;
            let start = *self
                .rule_to_start
                .get(usize::from(ridx))
                .ok_or(AtnError::Verify(stidx, "rule stop state for unknown rule"))?;
            self.rule_to_stop[usize::from(ridx)] = stidx;
            if let StateKind::RuleStart { ref mut stop, .. } = self.state_mut(start)?.kind {
                *stop = stidx;
            }
        }
        for (i, stop) in self.rule_to_stop.iter().enumerate() {
            if *stop == UNSET {
                return Err(AtnError::MissingRuleStop(RIdx::from(i)));
            }
        }

        // Rule stop states return to every follow state of every call of the rule.
        let mut returns = Vec::new();
        for st in &self.states {
            for t in &st.transitions {
                if let Transition::Rule {
                    rule,
                    precedence,
                    follow,
                    ..
                } = *t
                {
                    let outermost = if self.is_left_recursive(rule) && precedence == 0 {
                        Some(rule)
                    } else {
                        None
                    };
                    returns.push((
                        self.rule_stop(rule),
                        Transition::Epsilon {
                            target: follow,
                            outermost_precedence_return: outermost,
                        },
                    ));
                }
            }
        }
        for (stop, t) in returns {
            self.state_mut(stop)?.add_transition(t);
        }

        for i in 0..self.states.len() {
            let stidx = StIdx::from(i);
            let kind = self.states[i].kind;
            match kind {
                kind if kind.is_block_start() => {
                    let end = kind.block_end().unwrap_or(UNSET);
                    match self
                        .states
                        .get_mut(usize::from(end))
                        .map(|s| &mut s.kind)
                    {
                        Some(StateKind::BlockEnd { start }) if *start == UNSET => *start = stidx,
                        Some(StateKind::BlockEnd { start }) if *start == stidx => (),
                        _ => return Err(AtnError::Verify(stidx, "block start has a bad end state")),
                    }
                }
                StateKind::PlusLoopBack | StateKind::StarLoopBack => {
                    let targets = self.states[i]
                        .transitions
                        .iter()
                        .map(|t| t.target())
                        .collect::<Vec<_>>();
                    for tgt in targets {
                        match &mut self.state_mut(tgt)?.kind {
                            StateKind::PlusBlockStart { loop_back, .. }
                            | StateKind::StarLoopEntry { loop_back, .. } => *loop_back = stidx,
                            _ => (),
                        }
                    }
                }
                _ => (),
            }
        }

        self.mark_precedence_decisions();
        self.verify()
    }

    /// A star loop entry is a precedence decision if it is the loop of a left-recursive rule
    /// whose exit branch leads straight to the rule's stop state.
    fn mark_precedence_decisions(&mut self) {
        for i in 0..self.states.len() {
            let st = &self.states[i];
            if !matches!(st.kind, StateKind::StarLoopEntry { .. }) {
                continue;
            }
            let Some(ridx) = st.ridx else { continue };
            if !self.is_left_recursive(ridx) {
                continue;
            }
            let Some(last) = st.transitions.last() else {
                continue;
            };
            let maybe_end = self.state(last.target());
            let is_prec = matches!(maybe_end.kind, StateKind::LoopEnd { .. })
                && maybe_end.epsilon_only
                && maybe_end
                    .transitions
                    .first()
                    .map(|t| self.state(t.target()).is_rule_stop())
                    .unwrap_or(false);
            if is_prec {
                if let StateKind::StarLoopEntry {
                    ref mut precedence_decision,
                    ..
                } = self.states[i].kind
                {
                    *precedence_decision = true;
                }
            }
        }
    }

    fn verify(&self) -> Result<(), AtnError> {
        let check = |b: bool, st: &AtnState, msg: &'static str| {
            if b {
                Ok(())
            } else {
                Err(AtnError::Verify(st.stidx, msg))
            }
        };
        for st in &self.states {
            for t in &st.transitions {
                if usize::from(t.target()) >= self.states.len() {
                    return Err(AtnError::UnknownState(t.target().0));
                }
            }
            check(
                st.epsilon_only || st.transitions.len() <= 1,
                st,
                "mixes epsilon and non-epsilon transitions",
            )?;
            match st.kind {
                StateKind::PlusBlockStart { loop_back, .. } => {
                    check(loop_back != UNSET, st, "plus block without loop back")?
                }
                StateKind::StarLoopEntry { loop_back, .. } => {
                    check(loop_back != UNSET, st, "star loop without loop back")?;
                    check(st.transitions.len() == 2, st, "star loop entry needs 2 transitions")?;
                    let k0 = self.state(st.transitions[0].target()).kind;
                    let k1 = self.state(st.transitions[1].target()).kind;
                    match (k0, k1) {
                        (StateKind::StarBlockStart { .. }, StateKind::LoopEnd { .. }) => {
                            check(!st.non_greedy, st, "greedy loop marked non-greedy")?
                        }
                        (StateKind::LoopEnd { .. }, StateKind::StarBlockStart { .. }) => {
                            check(st.non_greedy, st, "non-greedy loop not marked")?
                        }
                        _ => return Err(AtnError::Verify(st.stidx, "malformed star loop")),
                    }
                }
                StateKind::StarLoopBack => {
                    check(st.transitions.len() == 1, st, "star loop back needs 1 transition")?;
                    check(
                        matches!(
                            self.state(st.transitions[0].target()).kind,
                            StateKind::StarLoopEntry { .. }
                        ),
                        st,
                        "star loop back must target a loop entry",
                    )?;
                }
                StateKind::LoopEnd { loop_back } => {
                    check(loop_back != UNSET, st, "loop end without loop back")?
                }
                StateKind::RuleStart { stop, .. } => {
                    check(stop != UNSET, st, "rule start without stop state")?
                }
                StateKind::BlockStart { end } | StateKind::StarBlockStart { end } => {
                    check(end != UNSET, st, "block start without end state")?
                }
                StateKind::BlockEnd { start } => {
                    check(start != UNSET, st, "block end without start state")?
                }
                _ => (),
            }
            if st.kind.is_decision_kind() {
                check(
                    st.transitions.len() <= 1 || st.decision.is_some(),
                    st,
                    "decision state without a decision number",
                )?;
            } else {
                check(
                    st.transitions.len() <= 1 || st.is_rule_stop(),
                    st,
                    "non-decision state with several transitions",
                )?;
            }
        }
        Ok(())
    }
}
