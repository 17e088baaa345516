//! Per-decision DFA caches.
//!
//! A DFA memoizes the results of ATN simulation: each DFA state is identified by the config set
//! it was computed from, and edges record which state a given input symbol leads to. DFAs are
//! shared between all recognizers using the same ATN. States live in an append-only arena behind
//! a read-write lock; insertion is compute-or-fetch, so if two threads compute the same state
//! concurrently, the second insertion finds and returns the first.
//!
//! Clearing a DFA starts a new generation of the arena. State indices carry the generation they
//! were issued in, so indices held across a clear no longer resolve: lookups through them miss
//! and edges from them are not recorded.

use std::{fmt, sync::Arc};

use atngrammar::{Atn, DIdx, StIdx, StateKind, Vocabulary};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::{
    configset::AtnConfigSet, context::PredictionContextCache,
    lexer_executor::LexerActionExecutor, semantic::SemanticContext,
};

/// The largest symbol lexer DFAs keep edges for.
pub const MAX_DFA_EDGE: i32 = 127;

/// The index of a state in one generation of a [Dfa].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DfaStIdx {
    index: u32,
    generation: u32,
}

impl DfaStIdx {
    /// The target of edges known to lead nowhere.
    pub const ERROR: DfaStIdx = DfaStIdx {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub fn index(self) -> u32 {
        self.index
    }
}

impl From<DfaStIdx> for usize {
    fn from(s: DfaStIdx) -> Self {
        s.index as usize
    }
}

impl fmt::Display for DfaStIdx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "s{}", self.index)
    }
}

/// What a DFA has recorded for a symbol leaving a state.
#[derive(Clone, Debug)]
pub enum Target {
    /// Nothing yet: the target must be computed from the ATN.
    Unknown,
    /// The symbol leads nowhere.
    Error,
    State(DfaStIdx, DfaState),
}

/// An alternative guarded by a predicate, as recorded in accept states whose prediction depends
/// on predicates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PredPrediction {
    pub pred: SemanticContext,
    pub alt: u32,
}

impl fmt::Display for PredPrediction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.pred, self.alt)
    }
}

#[derive(Clone, Debug)]
pub struct DfaState {
    pub configs: Arc<AtnConfigSet>,
    pub is_accept: bool,
    /// For parsers, the predicted alternative (`0` if none); for lexers the token type.
    pub prediction: i32,
    pub lexer_actions: Option<Arc<LexerActionExecutor>>,
    /// Was this state reached by an SLL conflict which full-context prediction must resolve?
    pub requires_full_context: bool,
    /// If the prediction depends on predicates, the alternatives and their guards in order.
    pub predicates: Option<Vec<PredPrediction>>,
}

impl DfaState {
    pub fn new(configs: AtnConfigSet) -> Self {
        DfaState {
            configs: Arc::new(configs),
            is_accept: false,
            prediction: 0,
            lexer_actions: None,
            requires_full_context: false,
            predicates: None,
        }
    }
}

struct Inner {
    generation: u32,
    states: Vec<DfaState>,
    edges: Vec<Vec<Option<DfaStIdx>>>,
    lookup: FnvHashMap<Arc<AtnConfigSet>, DfaStIdx>,
    s0: Option<DfaStIdx>,
    precedence_s0: FnvHashMap<i32, DfaStIdx>,
}

impl Inner {
    fn new(generation: u32) -> Self {
        Inner {
            generation,
            states: Vec::new(),
            edges: Vec::new(),
            lookup: FnvHashMap::default(),
            s0: None,
            precedence_s0: FnvHashMap::default(),
        }
    }

    /// The position of `s` in `states`, if `s` belongs to this generation.
    fn slot(&self, s: DfaStIdx) -> Option<usize> {
        if s.generation == self.generation && usize::from(s) < self.states.len() {
            Some(usize::from(s))
        } else {
            None
        }
    }

    fn idx(&self, i: usize) -> DfaStIdx {
        DfaStIdx {
            index: i as u32,
            generation: self.generation,
        }
    }

    fn with_state(&self, s: DfaStIdx) -> Option<(DfaStIdx, DfaState)> {
        self.slot(s).map(|i| (s, self.states[i].clone()))
    }

    fn find(&self, configs: &AtnConfigSet) -> Option<(DfaStIdx, DfaState)> {
        self.lookup.get(configs).and_then(|s| self.with_state(*s))
    }
}

pub struct Dfa {
    atn_start: StIdx,
    decision: usize,
    precedence_dfa: bool,
    edge_min: i32,
    edge_max: i32,
    inner: RwLock<Inner>,
}

impl Dfa {
    /// The DFA for parser decision `didx`. Edges are kept for every token type, and EOF.
    pub fn new(atn: &Atn, didx: DIdx) -> Self {
        let atn_start = atn.decision_state(didx);
        let precedence_dfa = matches!(
            atn.state(atn_start).kind(),
            StateKind::StarLoopEntry {
                precedence_decision: true,
                ..
            }
        );
        Dfa {
            atn_start,
            decision: usize::from(didx),
            precedence_dfa,
            edge_min: atngrammar::TOKEN_EOF,
            edge_max: atn.max_token_type(),
            inner: RwLock::new(Inner::new(0)),
        }
    }

    /// The DFA for lexer mode `mode`, starting at `mode_start`. Edges are only kept for ASCII.
    pub fn new_lexer(mode_start: StIdx, mode: usize) -> Self {
        Dfa {
            atn_start: mode_start,
            decision: mode,
            precedence_dfa: false,
            edge_min: 0,
            edge_max: MAX_DFA_EDGE,
            inner: RwLock::new(Inner::new(0)),
        }
    }

    pub fn atn_start(&self) -> StIdx {
        self.atn_start
    }

    /// The decision (parsers) or mode (lexers) this DFA belongs to.
    pub fn decision(&self) -> usize {
        self.decision
    }

    /// Is this the DFA of a left-recursive rule's loop, whose start state depends on the
    /// precedence of the current rule invocation?
    pub fn is_precedence_dfa(&self) -> bool {
        self.precedence_dfa
    }

    /// The start state, with a copy of it.
    pub fn s0(&self) -> Option<(DfaStIdx, DfaState)> {
        let inner = self.inner.read();
        inner.s0.and_then(|s| inner.with_state(s))
    }

    pub fn set_s0(&self, s: DfaStIdx) {
        let mut inner = self.inner.write();
        if inner.slot(s).is_some() {
            inner.s0 = Some(s);
        }
    }

    /// The start state of a precedence DFA for `precedence`, with a copy of it.
    pub fn precedence_start(&self, precedence: i32) -> Option<(DfaStIdx, DfaState)> {
        let inner = self.inner.read();
        inner
            .precedence_s0
            .get(&precedence)
            .and_then(|s| inner.with_state(*s))
    }

    pub fn set_precedence_start(&self, precedence: i32, s: DfaStIdx) {
        let mut inner = self.inner.write();
        if inner.slot(s).is_some() {
            inner.precedence_s0.insert(precedence, s);
        }
    }

    /// The state `symbol` leads to from `from`, if that has been computed. A result of
    /// [DfaStIdx::ERROR] means no state is reachable.
    pub fn edge(&self, from: DfaStIdx, symbol: i32) -> Option<DfaStIdx> {
        if symbol < self.edge_min || symbol > self.edge_max {
            return None;
        }
        let inner = self.inner.read();
        inner
            .edges
            .get(inner.slot(from)?)?
            .get((symbol - self.edge_min) as usize)
            .copied()
            .flatten()
    }

    /// As [Dfa::edge], but also return a copy of the target state, read under the same lock.
    pub fn target(&self, from: DfaStIdx, symbol: i32) -> Target {
        if symbol < self.edge_min || symbol > self.edge_max {
            return Target::Unknown;
        }
        let inner = self.inner.read();
        let to = inner
            .slot(from)
            .and_then(|i| inner.edges[i].get((symbol - self.edge_min) as usize))
            .copied()
            .flatten();
        match to {
            None => Target::Unknown,
            Some(DfaStIdx::ERROR) => Target::Error,
            Some(to) => match inner.with_state(to) {
                Some((to, st)) => Target::State(to, st),
                None => Target::Unknown,
            },
        }
    }

    /// Record that `symbol` leads from `from` to `to`. Symbols outside the DFA's edge range, and
    /// states from before the last [Dfa::clear], are not recorded.
    pub fn set_edge(&self, from: DfaStIdx, symbol: i32, to: DfaStIdx) {
        if symbol < self.edge_min || symbol > self.edge_max {
            return;
        }
        let width = (self.edge_max - self.edge_min + 1) as usize;
        let mut inner = self.inner.write();
        if to != DfaStIdx::ERROR && inner.slot(to).is_none() {
            return;
        }
        let Some(i) = inner.slot(from) else {
            return;
        };
        let edges = &mut inner.edges[i];
        if edges.is_empty() {
            edges.resize(width, None);
        }
        edges[(symbol - self.edge_min) as usize] = Some(to);
    }

    /// Add `state` to the DFA unless a state with an equal config set already exists, in which
    /// case `state` is discarded. Either way, return the index of the state in the DFA and a
    /// copy of it. The state's config set is frozen, and its contexts interned in `ctx_cache`
    /// if given.
    pub fn add_state(
        &self,
        mut state: DfaState,
        ctx_cache: Option<&PredictionContextCache>,
    ) -> (DfaStIdx, DfaState) {
        if let Some(found) = self.inner.read().find(&state.configs) {
            return found;
        }
        if let Some(cache) = ctx_cache {
            Arc::make_mut(&mut state.configs).optimize(cache);
        }
        let mut inner = self.inner.write();
        if let Some(found) = inner.find(&state.configs) {
            return found;
        }
        let s = inner.idx(inner.states.len());
        trace!(decision = self.decision, state = s.index, "new DFA state");
        inner.lookup.insert(Arc::clone(&state.configs), s);
        inner.states.push(state.clone());
        inner.edges.push(Vec::new());
        (s, state)
    }

    /// Return a copy of the state `s`, or `None` if `s` was discarded by [Dfa::clear].
    pub fn state(&self, s: DfaStIdx) -> Option<DfaState> {
        self.inner.read().with_state(s).map(|(_, st)| st)
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every state and edge. Indices handed out before the clear stop resolving.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let generation = inner.generation.wrapping_add(1) % u32::MAX;
        *inner = Inner::new(generation);
    }

    /// Render the DFA's edges using `vocab`'s display names for token types, one edge per line
    /// in the form `s0-ID->:s1=>2`.
    pub fn to_string_with_vocab(&self, vocab: &Vocabulary) -> String {
        self.render(&|t| vocab.display_name(t))
    }

    /// Render a lexer DFA, labelling edges with the characters they match.
    pub fn to_lexer_string(&self) -> String {
        self.render(&|c| match char::from_u32(c as u32) {
            Some(ch) => format!("'{}'", ch),
            None => c.to_string(),
        })
    }

    fn render(&self, label: &dyn Fn(i32) -> String) -> String {
        let inner = self.inner.read();
        let mut out = String::new();
        for (i, edges) in inner.edges.iter().enumerate() {
            for (j, t) in edges.iter().enumerate() {
                let t = match t {
                    Some(t) if *t != DfaStIdx::ERROR => *t,
                    _ => continue,
                };
                out.push_str(&state_string(&inner.states, inner.idx(i)));
                out.push('-');
                out.push_str(&label(j as i32 + self.edge_min));
                out.push_str("->");
                out.push_str(&state_string(&inner.states, t));
                out.push('\n');
            }
        }
        out
    }
}

fn state_string(states: &[DfaState], s: DfaStIdx) -> String {
    let st = &states[usize::from(s)];
    let base = format!(
        "{}{}{}",
        if st.is_accept { ":" } else { "" },
        s,
        if st.requires_full_context { "^" } else { "" }
    );
    if !st.is_accept {
        return base;
    }
    match &st.predicates {
        Some(preds) => {
            let ps = preds.iter().map(|p| p.to_string()).collect::<Vec<_>>();
            format!("{}=>[{}]", base, ps.join(", "))
        }
        None => format!("{}=>{}", base, st.prediction),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::AtnConfig, context::PredictionContext};
    use std::thread;

    fn configs(state: u32, alt: u32) -> AtnConfigSet {
        let mut s = AtnConfigSet::new(false);
        s.add(AtnConfig::new(StIdx(state), alt, PredictionContext::empty()), None);
        s
    }

    #[test]
    fn test_compute_or_fetch() {
        let dfa = Dfa::new_lexer(StIdx(0), 0);
        let (a, _) = dfa.add_state(DfaState::new(configs(1, 1)), None);
        let (b, _) = dfa.add_state(DfaState::new(configs(2, 1)), None);
        let (a2, _) = dfa.add_state(DfaState::new(configs(1, 1)), None);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(dfa.len(), 2);
    }

    #[test]
    fn test_edges_and_render() {
        let dfa = Dfa::new_lexer(StIdx(0), 0);
        let (s0, _) = dfa.add_state(DfaState::new(configs(1, 1)), None);
        let mut acc = DfaState::new(configs(2, 1));
        acc.is_accept = true;
        acc.prediction = 3;
        let (s1, acc) = dfa.add_state(acc, Some(&PredictionContextCache::new()));
        assert!(acc.configs.is_readonly());
        dfa.set_s0(s0);
        dfa.set_edge(s0, 'a' as i32, s1);
        dfa.set_edge(s0, 'b' as i32, DfaStIdx::ERROR);
        // Outside the edge range: silently not cached.
        dfa.set_edge(s0, 0x3b1, s1);
        assert_eq!(dfa.edge(s0, 'a' as i32), Some(s1));
        assert_eq!(dfa.edge(s0, 'b' as i32), Some(DfaStIdx::ERROR));
        assert_eq!(dfa.edge(s0, 'c' as i32), None);
        assert_eq!(dfa.edge(s0, 0x3b1), None);
        assert_eq!(dfa.edge(s1, 'a' as i32), None);
        assert!(matches!(dfa.target(s0, 'a' as i32), Target::State(s, _) if s == s1));
        assert!(matches!(dfa.target(s0, 'b' as i32), Target::Error));
        assert!(matches!(dfa.target(s0, 'c' as i32), Target::Unknown));
        assert!(dfa.state(s1).unwrap().configs.is_readonly());
        assert_eq!(dfa.s0().map(|(s, _)| s), Some(s0));
        assert_eq!(dfa.to_lexer_string(), "s0-'a'->:s1=>3\n");
        dfa.clear();
        assert!(dfa.is_empty());
        assert!(dfa.s0().is_none());
    }

    #[test]
    fn test_indices_from_before_clear() {
        let dfa = Dfa::new_lexer(StIdx(0), 0);
        let (old0, _) = dfa.add_state(DfaState::new(configs(1, 1)), None);
        let (old1, _) = dfa.add_state(DfaState::new(configs(2, 1)), None);
        dfa.set_edge(old0, 'a' as i32, old1);
        dfa.clear();
        assert!(dfa.state(old1).is_none());
        assert_eq!(dfa.edge(old0, 'a' as i32), None);
        // The new arena reuses slot numbers, but not the old indices' meaning.
        let (new0, st) = dfa.add_state(DfaState::new(configs(3, 1)), None);
        let (new1, _) = dfa.add_state(DfaState::new(configs(4, 1)), None);
        assert_eq!(usize::from(new0), usize::from(old0));
        assert_ne!(new0, old0);
        assert_eq!(st.configs.configs()[0].state, StIdx(3));
        dfa.set_edge(old0, 'a' as i32, new1);
        dfa.set_edge(new0, 'b' as i32, old1);
        dfa.set_s0(old0);
        assert_eq!(dfa.edge(new0, 'a' as i32), None);
        assert_eq!(dfa.edge(new0, 'b' as i32), None);
        assert!(dfa.s0().is_none());
        assert!(dfa.state(old0).is_none());
        assert_eq!(dfa.len(), 2);
    }

    #[test]
    fn test_clear_while_in_use() {
        let dfa = Arc::new(Dfa::new_lexer(StIdx(0), 0));
        let user = {
            let dfa = Arc::clone(&dfa);
            thread::spawn(move || {
                for i in 0..2000 {
                    let (a, _) = dfa.add_state(DfaState::new(configs(i % 7, 1)), None);
                    let (b, _) = dfa.add_state(DfaState::new(configs(i % 7 + 1, 1)), None);
                    dfa.set_edge(a, 'x' as i32, b);
                    if let Target::State(to, st) = dfa.target(a, 'x' as i32) {
                        assert_eq!(to, b);
                        assert_eq!(st.configs.configs()[0].state, StIdx(i % 7 + 1));
                    }
                    let _ = dfa.state(a);
                }
            })
        };
        for _ in 0..200 {
            dfa.clear();
        }
        user.join().unwrap();
    }

    #[test]
    fn test_concurrent_insertion() {
        let dfa = Arc::new(Dfa::new_lexer(StIdx(0), 0));
        let hs = (0..8)
            .map(|_| {
                let dfa = Arc::clone(&dfa);
                thread::spawn(move || {
                    (1..50)
                        .map(|i| dfa.add_state(DfaState::new(configs(i, 1)), None).0)
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let results = hs.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>();
        assert!(results.iter().all(|r| *r == results[0]));
        assert_eq!(dfa.len(), 49);
    }
}
