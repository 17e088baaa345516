//! Lexer ATN simulation.
//!
//! Unlike parser prediction, which only needs to pick an alternative, a lexer must find the
//! longest prefix of the remaining input matched by any token rule of the current mode. All
//! rules are simulated in parallel; every time some rule can end, the position is remembered,
//! and when no rule can continue the lexer backs up to the last such position. Ties go to the
//! rule listed first. Results are memoized in one [Dfa] per mode, with edges for ASCII only.

use std::sync::Arc;

use atngrammar::{
    Atn, Interval, RIdx, StIdx, Transition, INVALID_TOKEN_TYPE, MAX_CHAR, MIN_CHAR, TOKEN_EOF,
};
use llpredict::{
    AtnConfig, AtnConfigSet, Dfa, DfaStIdx, DfaState, LexerActionExecutor, PredictionContext,
    PredictionContextCache, Target, EMPTY_RETURN_STATE,
};
use tracing::trace;

use crate::{char_stream::CharStream, lexer::LexerActions};

/// A position in the input as humans count it: `line` from 1, `column` (in code points) from 0.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinePos {
    pub line: usize,
    pub column: usize,
}

impl Default for LinePos {
    fn default() -> Self {
        LinePos { line: 1, column: 0 }
    }
}

/// What a lexer predicate can see of the token being matched.
#[derive(Clone, Debug)]
pub struct LexerPosition {
    /// The index of the token's first character.
    pub start_index: usize,
    /// The index of the character after the last one matched so far.
    pub index: usize,
    pub line: usize,
    pub column: usize,
    /// The text matched so far.
    pub text: String,
}

/// A successful match of one token rule.
#[derive(Clone, Debug)]
pub struct Match {
    /// The token type of the matched rule, or [TOKEN_EOF] at the end of the input.
    pub ttype: i32,
    /// The lexer actions the match passed through, to be executed in order.
    pub actions: Option<Arc<LexerActionExecutor>>,
}

/// Where the lexer last found a rule that could end, and what it would produce.
#[derive(Clone)]
struct SimState {
    index: usize,
    pos: LinePos,
    ttype: i32,
    actions: Option<Arc<LexerActionExecutor>>,
}

/// Simulates lexer ATNs. Clones share DFA caches, so a simulator can be cloned into every lexer
/// for a grammar, including lexers running on other threads.
#[derive(Clone)]
pub struct LexerAtnSimulator {
    atn: Arc<Atn>,
    dfas: Arc<Vec<Dfa>>,
    ctx_cache: Arc<PredictionContextCache>,
}

impl LexerAtnSimulator {
    pub fn new(atn: Arc<Atn>) -> Self {
        let dfas = (0..atn.modes_len())
            .filter_map(|m| atn.mode_start(m).map(|s| Dfa::new_lexer(s, m)))
            .collect();
        LexerAtnSimulator {
            atn,
            dfas: Arc::new(dfas),
            ctx_cache: Arc::new(PredictionContextCache::new()),
        }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    /// The DFA for `mode`.
    pub fn dfa(&self, mode: usize) -> Option<&Dfa> {
        self.dfas.get(mode)
    }

    /// Throw away every mode's DFA. Subsequent matches are unaffected other than in speed.
    pub fn clear_dfa(&self) {
        for d in self.dfas.iter() {
            d.clear();
        }
    }

    /// Match the longest token starting at `input`'s current position in mode `mode`. On success
    /// `input` is left after the token and `pos` updated to match. Returns `None` if no token
    /// matches, in which case `input` is left where matching failed.
    pub fn match_token<C, A>(
        &self,
        input: &mut C,
        mode: usize,
        pos: &mut LinePos,
        actions: &mut A,
    ) -> Option<Match>
    where
        C: CharStream + ?Sized,
        A: LexerActions + ?Sized,
    {
        let dfa = self.dfas.get(mode)?;
        let mark = input.mark();
        let start_index = input.index();
        let mut run = Run {
            sim: self,
            dfa,
            input: &mut *input,
            actions,
            start_index,
            pos: *pos,
            prev_accept: None,
        };
        let r = match dfa.s0() {
            Some(s0) => run.exec_atn(s0),
            None => run.match_atn(),
        };
        *pos = run.pos;
        input.release(mark);
        r
    }

    /// Consume one character of `input`, keeping `pos` up to date.
    pub fn consume<C: CharStream + ?Sized>(&self, input: &mut C, pos: &mut LinePos) {
        consume(input, pos)
    }
}

fn consume<C: CharStream + ?Sized>(input: &mut C, pos: &mut LinePos) {
    if input.la(1) == '\n' as i32 {
        pos.line += 1;
        pos.column = 0;
    } else {
        pos.column += 1;
    }
    input.consume();
}

/// The state of one call of [LexerAtnSimulator::match_token].
struct Run<'r, C: ?Sized, A: ?Sized> {
    sim: &'r LexerAtnSimulator,
    dfa: &'r Dfa,
    input: &'r mut C,
    actions: &'r mut A,
    start_index: usize,
    pos: LinePos,
    prev_accept: Option<SimState>,
}

impl<'r, C, A> Run<'r, C, A>
where
    C: CharStream + ?Sized,
    A: LexerActions + ?Sized,
{
    fn match_atn(&mut self) -> Option<Match> {
        let mut has_semantic = false;
        let s0_closure = self.compute_start_state(self.dfa.atn_start(), &mut has_semantic);
        let next = self.add_dfa_state(s0_closure);
        // A start state depending on predicates can't be cached.
        if !has_semantic {
            self.dfa.set_s0(next.0);
        }
        self.exec_atn(next)
    }

    fn exec_atn(&mut self, ds0: (DfaStIdx, DfaState)) -> Option<Match> {
        let (mut s, mut st) = ds0;
        if st.is_accept {
            self.capture(&st);
        }
        let mut t = self.input.la(1);
        loop {
            let next = match self.dfa.target(s, t) {
                Target::State(target, target_st) => Some((target, target_st)),
                Target::Error => None,
                Target::Unknown => self.compute_target_state(s, &st.configs, t),
            };
            let Some((target, target_st)) = next else {
                break;
            };
            if t != TOKEN_EOF {
                consume(self.input, &mut self.pos);
            }
            if target_st.is_accept {
                self.capture(&target_st);
                if t == TOKEN_EOF {
                    break;
                }
            }
            t = self.input.la(1);
            s = target;
            st = target_st;
        }
        self.fail_or_accept(t)
    }

    /// Compute (and, without predicates, cache) the state `t` leads to from `s`, whose config
    /// set is `closure`. Returns `None` if no config survives `t`.
    fn compute_target_state(
        &mut self,
        s: DfaStIdx,
        closure: &AtnConfigSet,
        t: i32,
    ) -> Option<(DfaStIdx, DfaState)> {
        trace!(mode = self.dfa.decision(), state = s.index(), symbol = t, "lexer DFA miss");
        let mut reach = AtnConfigSet::new_ordered();
        let mut has_semantic = false;
        self.reachable_config_set(closure, &mut reach, t, &mut has_semantic);
        if reach.is_empty() {
            if !has_semantic {
                self.dfa.set_edge(s, t, DfaStIdx::ERROR);
            }
            return None;
        }
        let to = self.add_dfa_state(reach);
        if !has_semantic {
            self.dfa.set_edge(s, t, to.0);
        }
        Some(to)
    }

    fn fail_or_accept(&mut self, t: i32) -> Option<Match> {
        if let Some(acc) = self.prev_accept.take() {
            self.input.seek(acc.index);
            self.pos = acc.pos;
            return Some(Match {
                ttype: acc.ttype,
                actions: acc.actions,
            });
        }
        if t == TOKEN_EOF && self.input.index() == self.start_index {
            return Some(Match {
                ttype: TOKEN_EOF,
                actions: None,
            });
        }
        None
    }

    fn capture(&mut self, st: &DfaState) {
        self.prev_accept = Some(SimState {
            index: self.input.index(),
            pos: self.pos,
            ttype: st.prediction,
            actions: st.lexer_actions.clone(),
        });
    }

    /// Advance every config in `closure` over `t`. Once a config of some alternative has reached
    /// the end of its rule, that alternative's lower priority (later) configs are dropped.
    fn reachable_config_set(
        &mut self,
        closure: &AtnConfigSet,
        reach: &mut AtnConfigSet,
        t: i32,
        has_semantic: &mut bool,
    ) {
        let atn: &'r Atn = &self.sim.atn;
        let mut skip_alt = None;
        for c in closure.iter() {
            let reached_accept = skip_alt == Some(c.alt);
            if reached_accept && c.passed_through_non_greedy {
                continue;
            }
            for tr in atn.state(c.state).transitions() {
                if !tr.matches(t, MIN_CHAR, MAX_CHAR) {
                    continue;
                }
                let mut next = self.moved(c, tr.target());
                if let Some(e) = &c.lexer_actions {
                    let offset = self.input.index() - self.start_index;
                    if let Some(fixed) = e.fix_offset_before_match(offset) {
                        next.lexer_actions = Some(fixed);
                    }
                }
                if self.closure(next, reach, reached_accept, true, t == TOKEN_EOF, has_semantic) {
                    skip_alt = Some(c.alt);
                    break;
                }
            }
        }
    }

    fn compute_start_state(&mut self, p: StIdx, has_semantic: &mut bool) -> AtnConfigSet {
        let atn: &'r Atn = &self.sim.atn;
        let mut configs = AtnConfigSet::new_ordered();
        for (i, t) in atn.state(p).transitions().iter().enumerate() {
            let c = AtnConfig::new(t.target(), i as u32 + 1, PredictionContext::empty());
            self.closure(c, &mut configs, false, false, false, has_semantic);
        }
        configs
    }

    /// Add the closure of `config` to `configs`. Returns true if the closure reached the end of
    /// the token rule, in which case the rule's later alternatives needn't be explored.
    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut reached_accept: bool,
        speculative: bool,
        treat_eof_as_epsilon: bool,
        has_semantic: &mut bool,
    ) -> bool {
        let atn: &'r Atn = &self.sim.atn;
        let st = atn.state(config.state);
        if st.is_rule_stop() {
            if config.context.is_empty() || config.context.has_empty_path() {
                if config.context.is_empty() {
                    configs.add(config, None);
                    return true;
                }
                configs.add(
                    config.with_state_context(config.state, PredictionContext::empty()),
                    None,
                );
                reached_accept = true;
            }
            if !config.context.is_empty() {
                for i in 0..config.context.len() {
                    let rs = config.context.return_state(i);
                    if rs == EMPTY_RETURN_STATE {
                        continue;
                    }
                    let parent = config
                        .context
                        .parent(i)
                        .cloned()
                        .unwrap_or_else(PredictionContext::empty);
                    let mut c = self.moved(&config, StIdx(rs as u32));
                    c.context = parent;
                    reached_accept = self.closure(
                        c,
                        configs,
                        reached_accept,
                        speculative,
                        treat_eof_as_epsilon,
                        has_semantic,
                    );
                }
            }
            return reached_accept;
        }

        if !st.epsilon_only() && (!reached_accept || !config.passed_through_non_greedy) {
            configs.add(config.clone(), None);
        }
        for t in st.transitions() {
            if let Some(c) =
                self.epsilon_target(&config, t, speculative, treat_eof_as_epsilon, has_semantic)
            {
                reached_accept = self.closure(
                    c,
                    configs,
                    reached_accept,
                    speculative,
                    treat_eof_as_epsilon,
                    has_semantic,
                );
            }
        }
        reached_accept
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        t: &Transition,
        speculative: bool,
        treat_eof_as_epsilon: bool,
        has_semantic: &mut bool,
    ) -> Option<AtnConfig> {
        let atn: &'r Atn = &self.sim.atn;
        match t {
            Transition::Rule { target, follow, .. } => {
                let mut c = self.moved(config, *target);
                c.context = PredictionContext::singleton(config.context.clone(), follow.0 as i32);
                Some(c)
            }
            // Rejected when lexer ATNs are built or deserialized.
            Transition::Precedence { .. } => None,
            Transition::Predicate {
                target, rule, pred, ..
            } => {
                *has_semantic = true;
                if self.eval_predicate(*rule, *pred, speculative) {
                    Some(self.moved(config, *target))
                } else {
                    None
                }
            }
            Transition::Action { target, action, .. } => {
                let mut c = self.moved(config, *target);
                // Actions are only executed for the token rule itself, not for rules it calls.
                if config.context.is_empty() || config.context.has_empty_path() {
                    if let Some(la) = action.and_then(|i| atn.lexer_action(i)) {
                        c.lexer_actions =
                            Some(LexerActionExecutor::append(config.lexer_actions.as_ref(), *la));
                    }
                }
                Some(c)
            }
            Transition::Epsilon { target, .. } => Some(self.moved(config, *target)),
            Transition::Atom { .. } | Transition::Range { .. } | Transition::Set { .. } => {
                if treat_eof_as_epsilon && t.matches(TOKEN_EOF, MIN_CHAR, MAX_CHAR) {
                    Some(self.moved(config, t.target()))
                } else {
                    None
                }
            }
            Transition::NotSet { .. } | Transition::Wildcard { .. } => None,
        }
    }

    /// Evaluate predicate `pred` of `rule`. Predicates met while computing the configs reached
    /// over a character are `speculative`: they are evaluated as if that character had already
    /// been consumed.
    fn eval_predicate(&mut self, rule: RIdx, pred: usize, speculative: bool) -> bool {
        if !speculative {
            let p = self.position();
            return self.actions.sempred(rule, pred, &p);
        }
        let index = self.input.index();
        let saved = self.pos;
        let mark = self.input.mark();
        consume(self.input, &mut self.pos);
        let p = self.position();
        let r = self.actions.sempred(rule, pred, &p);
        self.pos = saved;
        self.input.seek(index);
        self.input.release(mark);
        r
    }

    fn position(&self) -> LexerPosition {
        let index = self.input.index();
        LexerPosition {
            start_index: self.start_index,
            index,
            line: self.pos.line,
            column: self.pos.column,
            text: self
                .input
                .text(Interval::new(self.start_index as i32, index as i32 - 1)),
        }
    }

    /// `config` moved to `target`, noting whether it has entered a non-greedy decision.
    fn moved(&self, config: &AtnConfig, target: StIdx) -> AtnConfig {
        let st = self.sim.atn.state(target);
        let mut c = config.with_state(target);
        c.passed_through_non_greedy =
            config.passed_through_non_greedy || (st.kind().is_decision_kind() && st.non_greedy());
        c
    }

    /// Add a DFA state for `configs`. If some config has reached the end of its token rule the
    /// state accepts that rule's token type; configs are in priority order so the first such
    /// config wins.
    fn add_dfa_state(&mut self, configs: AtnConfigSet) -> (DfaStIdx, DfaState) {
        let atn: &'r Atn = &self.sim.atn;
        let mut st = DfaState::new(configs);
        let accept = st
            .configs
            .iter()
            .find(|c| atn.state(c.state).is_rule_stop())
            .map(|c| (c.lexer_actions.clone(), atn.state(c.state).rule()));
        if let Some((lexer_actions, rule)) = accept {
            st.is_accept = true;
            st.lexer_actions = lexer_actions;
            st.prediction = rule
                .and_then(|r| atn.rule_token_type(r))
                .unwrap_or(INVALID_TOKEN_TYPE);
        }
        self.dfa.add_state(st, Some(&self.sim.ctx_cache))
    }
}
